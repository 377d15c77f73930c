//! Map editor: routes input to the viewport, selection, boundary editor and store.

use crate::action::{CreateObjects, DeleteObjects, MapAction};
use crate::boundary::{BoundaryEditMode, BoundaryEditor, MapGeometry, VertexHandle};
use crate::config::{ConfigError, EditorConfig};
use crate::input::{InputState, KeyEvent, Modifiers, MouseButton, PointerEvent};
use crate::keybindings::{shortcut_from_key, EditorCommand, KeyBindings};
use crate::selection::{SelectionEngine, TransformGesture};
use crate::state::{LayerName, ObjectId, ObjectState};
use crate::store::{MapStore, PendingSync, StoreError};
use crate::viewport::Viewport;
use kurbo::{Point, Rect, Size};

/// What lies under a screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Canvas,
    Object(ObjectId),
    BoundaryVertex(usize),
}

/// Pointer gesture in progress.
#[derive(Debug, Clone, Default)]
enum Gesture {
    #[default]
    None,
    Pan,
    Selecting,
    Moving(TransformGesture),
    VertexDrag,
}

/// Interactive editor for one open map.
pub struct MapEditor {
    store: MapStore,
    viewport: Viewport,
    viewport_size: Size,
    selection: SelectionEngine,
    boundary: BoundaryEditor,
    keybindings: KeyBindings,
    input: InputState,
    gesture: Gesture,
}

impl MapEditor {
    /// Create an editor with default settings and the built-in key bindings.
    pub fn new(store: MapStore) -> Self {
        let mut editor = Self {
            store,
            viewport: Viewport::new(),
            viewport_size: Size::new(800.0, 600.0),
            selection: SelectionEngine::new(),
            boundary: BoundaryEditor::default(),
            keybindings: KeyBindings::default(),
            input: InputState::new(),
            gesture: Gesture::None,
        };
        editor.sync_editor_bounds();
        editor
    }

    pub fn with_config(store: MapStore, config: &EditorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut editor = Self::new(store);
        editor.viewport = config.viewport();
        editor.boundary = BoundaryEditor::new(config.handle_radius_divisor);
        editor.keybindings = config.keybindings()?;
        editor.sync_editor_bounds();
        Ok(editor)
    }

    pub fn store(&self) -> &MapStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MapStore {
        &mut self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn keybindings(&self) -> &KeyBindings {
        &self.keybindings
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport_size = Size::new(width, height);
        self.sync_editor_bounds();
    }

    /// Show the whole map boundary, if there is one.
    pub fn fit_to_boundary(&mut self, padding: f64) {
        if let Some(bounds) = self.store.tracked().boundary.as_ref().and_then(MapGeometry::bounds) {
            self.viewport.fit_to_bounds(bounds, self.viewport_size, padding);
            self.sync_editor_bounds();
        }
    }

    fn sync_editor_bounds(&mut self) {
        let bounds = self.viewport.visible_world_rect(self.viewport_size);
        self.store.set_editor_bounds(bounds);
    }

    /// Rubber-band rectangle to draw, in world coordinates.
    pub fn selection_rect(&self) -> Option<Rect> {
        self.selection.visible_rect()
    }

    /// Objects as they would land if the current drag ended now.
    pub fn transform_preview(&self) -> Vec<ObjectState> {
        match &self.gesture {
            Gesture::Moving(gesture) => gesture.preview(),
            _ => Vec::new(),
        }
    }

    /// Boundary as it would look if the current vertex drag ended now.
    pub fn boundary_preview(&self) -> Option<MapGeometry> {
        self.boundary.drag_preview(self.store.tracked().boundary.as_ref()?)
    }

    /// Vertex handles to draw in move and remove mode.
    pub fn vertex_handles(&self) -> Vec<VertexHandle> {
        let untracked = self.store.untracked();
        if !matches!(
            untracked.boundary_edit_mode,
            BoundaryEditMode::Move | BoundaryEditMode::Remove
        ) {
            return Vec::new();
        }
        match &self.store.tracked().boundary {
            Some(geometry) => self.boundary.vertex_handles(geometry, untracked.editor_bounds),
            None => Vec::new(),
        }
    }

    /// Boundary vertices first (move/remove mode), then objects front to back
    /// on visible layers.
    pub fn hit_test(&self, screen: Point) -> HitTarget {
        let world = self.viewport.screen_to_world(screen);
        let tracked = self.store.tracked();
        let untracked = self.store.untracked();

        if matches!(
            untracked.boundary_edit_mode,
            BoundaryEditMode::Move | BoundaryEditMode::Remove
        ) {
            if let Some(geometry) = &tracked.boundary {
                if let Some(index) =
                    self.boundary
                        .hit_test_vertex(geometry, untracked.editor_bounds, world)
                {
                    return HitTarget::BoundaryVertex(index);
                }
            }
        }

        LayerName::ALL
            .iter()
            .rev()
            .filter(|name| untracked.is_layer_visible(**name))
            .filter_map(|name| tracked.layer(*name))
            .flat_map(|layer| layer.objects.iter().rev())
            .find(|object| object.bounds().contains(world))
            .map(|object| HitTarget::Object(object.id))
            .unwrap_or(HitTarget::Canvas)
    }

    /// Route a pointer event. Returns the sync of any action it committed.
    pub fn handle_pointer_event(&mut self, event: PointerEvent, modifiers: Modifiers) -> Option<PendingSync> {
        self.input.handle_pointer_event(&event);
        match event {
            PointerEvent::Wheel { position, delta } => {
                self.viewport.handle_wheel(position, delta, modifiers);
                self.sync_editor_bounds();
                None
            }
            PointerEvent::Down { position, button } => self.pointer_down(position, button, modifiers),
            PointerEvent::Move { position } => {
                self.pointer_move(position);
                None
            }
            PointerEvent::Up { button, .. } => self.pointer_up(button),
        }
    }

    fn pointer_down(&mut self, screen: Point, button: MouseButton, modifiers: Modifiers) -> Option<PendingSync> {
        // One gesture at a time; a second button never interrupts the first.
        if !matches!(self.gesture, Gesture::None) {
            return None;
        }
        if self.viewport.drag_allowed(button) {
            self.gesture = Gesture::Pan;
            return None;
        }
        if button != MouseButton::Left {
            return None;
        }

        let world = self.viewport.screen_to_world(screen);
        if self.store.untracked().boundary_edit_mode == BoundaryEditMode::Add {
            return self.boundary.handle_surface_click(&mut self.store, world).into_sync();
        }

        match self.hit_test(screen) {
            HitTarget::BoundaryVertex(index) => match self.store.untracked().boundary_edit_mode {
                BoundaryEditMode::Move => {
                    if self.boundary.begin_vertex_drag(&mut self.store, index, world) {
                        self.gesture = Gesture::VertexDrag;
                    }
                    None
                }
                _ => self.boundary.handle_vertex_select(&mut self.store, index).into_sync(),
            },
            HitTarget::Object(id) => {
                if modifiers.shift {
                    self.store.add_nodes_to_transformer([id]);
                } else if !self.store.untracked().selection.contains(id) {
                    self.selection.click_node(&mut self.store, id);
                }
                if let Some(gesture) = TransformGesture::begin(&self.store, world) {
                    self.selection.suspend();
                    self.gesture = Gesture::Moving(gesture);
                }
                None
            }
            HitTarget::Canvas => {
                if self.selection.begin(world) {
                    self.gesture = Gesture::Selecting;
                }
                None
            }
        }
    }

    fn pointer_move(&mut self, screen: Point) {
        let world = self.viewport.screen_to_world(screen);
        match &mut self.gesture {
            Gesture::Pan => {
                self.viewport.pan(self.input.pointer_delta());
                let bounds = self.viewport.visible_world_rect(self.viewport_size);
                self.store.set_editor_bounds(bounds);
            }
            Gesture::Selecting => self.selection.update(world, &mut self.store),
            Gesture::Moving(gesture) => gesture.update(world),
            Gesture::VertexDrag => self.boundary.update_vertex_drag(world),
            Gesture::None => {}
        }
    }

    /// Ends the current gesture only on the release of the button that started it.
    fn pointer_up(&mut self, button: MouseButton) -> Option<PendingSync> {
        match (std::mem::take(&mut self.gesture), button) {
            (Gesture::Pan, MouseButton::Middle) => None,
            (Gesture::Selecting, MouseButton::Left) => {
                // A click without drag on empty canvas deselects.
                if let Some(rect) = self.selection.end() {
                    if rect.is_click() {
                        self.selection.click_canvas(&mut self.store);
                    }
                }
                None
            }
            (Gesture::Moving(gesture), MouseButton::Left) => {
                self.selection.resume();
                let action = gesture.finish()?;
                self.execute(action)
            }
            (Gesture::VertexDrag, MouseButton::Left) => {
                self.boundary.finish_vertex_drag(&mut self.store).into_sync()
            }
            (other, _) => {
                self.gesture = other;
                None
            }
        }
    }

    /// Route a key event through the key bindings.
    pub fn handle_key_event(&mut self, event: KeyEvent, modifiers: Modifiers) -> Option<PendingSync> {
        let KeyEvent::Pressed(key) = event else {
            return None;
        };
        let shortcut = shortcut_from_key(&key, modifiers);
        let command = self
            .keybindings
            .resolve(self.store.untracked().selected_layer, &shortcut)?;
        log::debug!("Shortcut {} -> {:?}", shortcut, command);
        self.execute_command(command)
    }

    pub fn execute_command(&mut self, command: EditorCommand) -> Option<PendingSync> {
        match command {
            EditorCommand::Undo => match self.store.undo() {
                Ok(sync) => sync,
                Err(e) => {
                    log::error!("Undo failed: {}", e);
                    None
                }
            },
            EditorCommand::Redo => self.store.redo(),
            EditorCommand::Deselect => {
                self.store.reset_selection();
                self.boundary.clear_vertex_selection();
                None
            }
            EditorCommand::DeleteSelection => self.delete_selection(),
            EditorCommand::BoundaryModeAdd => self.set_boundary_mode(BoundaryEditMode::Add),
            EditorCommand::BoundaryModeMove => self.set_boundary_mode(BoundaryEditMode::Move),
            EditorCommand::BoundaryModeRemove => self.set_boundary_mode(BoundaryEditMode::Remove),
            EditorCommand::BoundaryModeNone => self.set_boundary_mode(BoundaryEditMode::None),
        }
    }

    fn set_boundary_mode(&mut self, mode: BoundaryEditMode) -> Option<PendingSync> {
        self.boundary.cancel_vertex_drag();
        self.boundary.clear_vertex_selection();
        self.store.set_boundary_edit_mode(mode);
        None
    }

    /// Place a new object on the active layer at a world position.
    pub fn create_object(&mut self, kind: &str, position: Point, size: Size) -> Result<(ObjectId, PendingSync), StoreError> {
        let layer = self.store.untracked().selected_layer;
        let object = ObjectState::new(layer, kind, position.x, position.y, size.width, size.height);
        let id = object.id;
        let sync = self.store.execute_action(CreateObjects::single(object))?;
        Ok((id, sync))
    }

    /// Delete the selected objects of the active layer as one action.
    pub fn delete_selection(&mut self) -> Option<PendingSync> {
        let layer = self.store.untracked().selected_layer;
        let ids: Vec<ObjectId> = self
            .store
            .selected_objects()
            .into_iter()
            .filter(|o| o.layer == layer)
            .map(|o| o.id)
            .collect();
        if ids.is_empty() {
            return None;
        }
        self.execute(DeleteObjects::new(layer, ids))
    }

    fn execute(&mut self, action: impl Into<MapAction>) -> Option<PendingSync> {
        match self.store.execute_action(action) {
            Ok(sync) => Some(sync),
            Err(e) => {
                log::error!("Action rejected: {}", e);
                None
            }
        }
    }
}
