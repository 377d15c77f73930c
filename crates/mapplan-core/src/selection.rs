//! Rectangle selection and batched move/transform of the selection.

use crate::action::{MapAction, MoveObjects, MoveUpdate, TransformObjects, TransformUpdate};
use crate::state::{LayerName, ObjectId, ObjectState, TrackedMapState, UntrackedMapState};
use crate::store::MapStore;
use kurbo::{Point, Rect, Vec2};
use std::collections::HashSet;

/// Ordered set of objects attached to the transform handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionHandleSet {
    ids: Vec<ObjectId>,
}

impl SelectionHandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids.contains(&id)
    }

    pub fn set_single(&mut self, id: ObjectId) {
        self.ids.clear();
        self.ids.push(id);
    }

    /// Replace the set, dropping duplicate ids.
    pub fn replace(&mut self, ids: Vec<ObjectId>) {
        let mut seen = HashSet::with_capacity(ids.len());
        self.ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
    }

    /// Append ids not already in the set.
    pub fn extend(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        let mut seen: HashSet<ObjectId> = self.ids.iter().copied().collect();
        self.ids.extend(ids.into_iter().filter(|id| seen.insert(*id)));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop ids that no longer exist in the document.
    pub fn retain_existing(&mut self, tracked: &TrackedMapState) {
        if self.ids.is_empty() {
            return;
        }
        let existing: HashSet<ObjectId> = tracked.object_ids().collect();
        self.ids.retain(|id| existing.contains(id));
    }

    /// Selected objects, in selection order.
    pub fn selected_nodes<'a>(&self, tracked: &'a TrackedMapState) -> Vec<&'a ObjectState> {
        self.ids.iter().filter_map(|id| tracked.find_object(*id)).collect()
    }
}

/// Rubber-band rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    /// Anchor of the drag.
    pub start: Point,
    pub current: Point,
}

impl SelectionRect {
    /// Normalized rectangle, whatever the drag direction.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.start.x.min(self.current.x),
            self.start.y.min(self.current.y),
            self.start.x.max(self.current.x),
            self.start.y.max(self.current.y),
        )
    }

    /// The pointer never moved from the anchor. A flat drag along one axis
    /// is not a click.
    pub fn is_click(&self) -> bool {
        self.start == self.current
    }
}

/// Non-strict overlap test: touching edges count as intersecting.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Ids of all objects on visible layers whose bounds overlap `rect`.
///
/// Ordered by layer, then back to front within a layer.
pub fn intersecting_objects(
    rect: Rect,
    tracked: &TrackedMapState,
    untracked: &UntrackedMapState,
) -> Vec<ObjectId> {
    LayerName::ALL
        .iter()
        .filter(|name| untracked.is_layer_visible(**name))
        .filter_map(|name| tracked.layer(*name))
        .flat_map(|layer| layer.objects.iter())
        .filter(|object| rects_overlap(object.bounds(), rect))
        .map(|object| object.id)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Selecting(SelectionRect),
}

/// Drives rectangle selection from pointer gestures.
#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    state: SelectionState,
    suspended: bool,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_selecting(&self) -> bool {
        matches!(self.state, SelectionState::Selecting(_))
    }

    /// Rectangle to draw, if a selection is in progress.
    pub fn visible_rect(&self) -> Option<Rect> {
        match self.state {
            SelectionState::Selecting(rect) => Some(rect.to_rect()),
            SelectionState::Idle => None,
        }
    }

    /// Stop reacting to gestures (e.g. while a transform is running).
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.state = SelectionState::Idle;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Anchor a new rectangle at `world`. Returns false when suspended.
    pub fn begin(&mut self, world: Point) -> bool {
        if self.suspended {
            return false;
        }
        self.state = SelectionState::Selecting(SelectionRect {
            start: world,
            current: world,
        });
        true
    }

    /// Grow the rectangle to `world` and replace the selection with every
    /// visible object it touches.
    pub fn update(&mut self, world: Point, store: &mut MapStore) {
        let SelectionState::Selecting(rect) = &mut self.state else {
            return;
        };
        rect.current = world;
        let ids = intersecting_objects(rect.to_rect(), store.tracked(), store.untracked());
        store.install_selection(ids);
    }

    /// Hide the rectangle and return it. The selection stays.
    pub fn end(&mut self) -> Option<SelectionRect> {
        match std::mem::take(&mut self.state) {
            SelectionState::Selecting(rect) => Some(rect),
            SelectionState::Idle => None,
        }
    }

    /// A click on empty canvas deselects.
    pub fn click_canvas(&mut self, store: &mut MapStore) {
        if self.suspended {
            return;
        }
        if !store.untracked().selection.is_empty() {
            store.reset_selection();
        }
    }

    /// A click on a node makes it the only selected one.
    pub fn click_node(&mut self, store: &mut MapStore, id: ObjectId) {
        if self.suspended {
            return;
        }
        store.set_single_node_in_transformer(id);
    }
}

/// Drag of the current selection, committed as one batched move.
///
/// Only the selected objects on the active layer take part.
#[derive(Debug, Clone)]
pub struct TransformGesture {
    layer: LayerName,
    start_point: Point,
    current_point: Point,
    originals: Vec<ObjectState>,
}

impl TransformGesture {
    /// Capture the selection at drag start. `None` when nothing is selected
    /// on the active layer.
    pub fn begin(store: &MapStore, world: Point) -> Option<Self> {
        let layer = store.untracked().selected_layer;
        let originals: Vec<ObjectState> = store
            .selected_objects()
            .into_iter()
            .filter(|o| o.layer == layer)
            .cloned()
            .collect();
        if originals.is_empty() {
            return None;
        }
        Some(Self {
            layer,
            start_point: world,
            current_point: world,
            originals,
        })
    }

    pub fn update(&mut self, world: Point) {
        self.current_point = world;
    }

    pub fn delta(&self) -> Vec2 {
        self.current_point - self.start_point
    }

    pub fn layer(&self) -> LayerName {
        self.layer
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.originals.iter().map(|o| o.id).collect()
    }

    /// Moved copies of the captured objects, for drawing during the drag.
    pub fn preview(&self) -> Vec<ObjectState> {
        let delta = self.delta();
        self.originals
            .iter()
            .map(|o| ObjectState {
                x: o.x + delta.x,
                y: o.y + delta.y,
                ..o.clone()
            })
            .collect()
    }

    /// One action moving every captured object. `None` for a zero-length drag.
    pub fn finish(self) -> Option<MapAction> {
        let delta = self.delta();
        if delta == Vec2::ZERO {
            return None;
        }
        let updates = self
            .originals
            .iter()
            .map(|o| MoveUpdate::new(o.id, o.x + delta.x, o.y + delta.y))
            .collect();
        Some(MoveObjects::new(self.layer, updates).into())
    }
}

/// One batched transform action for a handle gesture. `None` if `updates` is empty.
pub fn transform_action(layer: LayerName, updates: Vec<TransformUpdate>) -> Option<MapAction> {
    if updates.is_empty() {
        return None;
    }
    Some(TransformObjects::new(layer, updates).into())
}
