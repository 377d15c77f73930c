//! Gesture handlers that turn pointer input into boundary actions.

use super::ring::{insert_point_least_distance, remove_point_at_index, set_point_at_index};
use super::{BoundaryEditMode, BoundaryError, MapGeometry};
use crate::action::{MapAction, UpdateMapGeometry};
use crate::store::{EditorWarning, MapStore, PendingSync, StoreError};
use kurbo::{Point, Rect};

/// Vertex handle radius is the longest editor side divided by this.
pub const HANDLE_RADIUS_DIVISOR: f64 = 200.0;

/// A draggable handle for one distinct boundary vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexHandle {
    /// Index of the vertex in the boundary ring.
    pub index: usize,
    /// Position in world coordinates.
    pub position: Point,
    /// Hit radius in world units.
    pub radius: f64,
}

impl VertexHandle {
    pub fn hit_test(&self, point: Point) -> bool {
        self.position.distance(point) <= self.radius
    }
}

/// Result of a boundary gesture.
#[derive(Debug)]
pub enum EditOutcome {
    /// A new geometry was applied; the sync must be driven by the host.
    Applied(PendingSync),
    /// The edit was refused and a warning was queued. State is unchanged.
    Refused(EditorWarning),
    /// A vertex was attached to the transform handles (move mode).
    VertexSelected(usize),
    /// The gesture does not apply in the current mode or addressed a stale vertex.
    Ignored,
    /// The store refused the action.
    Rejected(StoreError),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }

    /// Take the pending sync out of an applied outcome.
    pub fn into_sync(self) -> Option<PendingSync> {
        match self {
            EditOutcome::Applied(sync) => Some(sync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct VertexDrag {
    index: usize,
    current: Point,
}

/// Boundary polygon editor driven by the store's [`BoundaryEditMode`].
#[derive(Debug, Clone)]
pub struct BoundaryEditor {
    radius_divisor: f64,
    selected_vertex: Option<usize>,
    drag: Option<VertexDrag>,
}

impl Default for BoundaryEditor {
    fn default() -> Self {
        Self::new(HANDLE_RADIUS_DIVISOR)
    }
}

impl BoundaryEditor {
    pub fn new(radius_divisor: f64) -> Self {
        Self {
            radius_divisor: radius_divisor.max(1.0),
            selected_vertex: None,
            drag: None,
        }
    }

    /// Handle radius for the given visible editor area.
    pub fn handle_radius(&self, editor_bounds: Rect) -> f64 {
        editor_bounds.width().max(editor_bounds.height()) / self.radius_divisor
    }

    /// One handle per distinct vertex. The closing duplicate gets none.
    pub fn vertex_handles(&self, geometry: &MapGeometry, editor_bounds: Rect) -> Vec<VertexHandle> {
        let radius = self.handle_radius(editor_bounds);
        geometry
            .outer_ring()
            .iter()
            .take(geometry.distinct_vertex_count())
            .enumerate()
            .map(|(index, &position)| VertexHandle {
                index,
                position,
                radius,
            })
            .collect()
    }

    /// Nearest vertex handle under `point`, if any.
    pub fn hit_test_vertex(&self, geometry: &MapGeometry, editor_bounds: Rect, point: Point) -> Option<usize> {
        self.vertex_handles(geometry, editor_bounds)
            .into_iter()
            .filter(|h| h.hit_test(point))
            .min_by(|a, b| {
                a.position
                    .distance(point)
                    .total_cmp(&b.position.distance(point))
            })
            .map(|h| h.index)
    }

    /// Vertex currently attached to the transform handles.
    pub fn selected_vertex(&self) -> Option<usize> {
        self.selected_vertex
    }

    pub fn clear_vertex_selection(&mut self) {
        self.selected_vertex = None;
    }

    /// Add mode: insert a vertex where the click adds the least perimeter.
    pub fn handle_surface_click(&mut self, store: &mut MapStore, point: Point) -> EditOutcome {
        if store.untracked().boundary_edit_mode != BoundaryEditMode::Add {
            return EditOutcome::Ignored;
        }
        let Some(geometry) = store.tracked().boundary.as_ref() else {
            return EditOutcome::Ignored;
        };
        match insert_point_least_distance(geometry, point) {
            Ok(new_geometry) => commit(store, new_geometry),
            Err(e) => {
                log::debug!("Boundary insert ignored: {}", e);
                EditOutcome::Ignored
            }
        }
    }

    /// Move mode selects the vertex; remove mode deletes it.
    pub fn handle_vertex_select(&mut self, store: &mut MapStore, index: usize) -> EditOutcome {
        match store.untracked().boundary_edit_mode {
            BoundaryEditMode::Move => {
                if index >= store.tracked().boundary.as_ref().map_or(0, |g| g.distinct_vertex_count()) {
                    return EditOutcome::Ignored;
                }
                store.reset_selection();
                self.selected_vertex = Some(index);
                EditOutcome::VertexSelected(index)
            }
            BoundaryEditMode::Remove => {
                let Some(geometry) = store.tracked().boundary.as_ref() else {
                    return EditOutcome::Ignored;
                };
                match remove_point_at_index(geometry, index) {
                    Ok(new_geometry) => {
                        self.selected_vertex = None;
                        commit(store, new_geometry)
                    }
                    Err(BoundaryError::TooFewVertices { distinct }) => {
                        log::warn!("Refusing to remove vertex {} from ring with {} vertices", index, distinct);
                        store.warn(EditorWarning::VertexRemovalForbidden);
                        EditOutcome::Refused(EditorWarning::VertexRemovalForbidden)
                    }
                    Err(e) => {
                        log::debug!("Boundary removal ignored: {}", e);
                        EditOutcome::Ignored
                    }
                }
            }
            BoundaryEditMode::Add | BoundaryEditMode::None => EditOutcome::Ignored,
        }
    }

    /// Move mode: commit a dragged vertex at its final position.
    pub fn handle_vertex_drag_end(&mut self, store: &mut MapStore, index: usize, point: Point) -> EditOutcome {
        self.drag = None;
        if store.untracked().boundary_edit_mode != BoundaryEditMode::Move {
            return EditOutcome::Ignored;
        }
        let Some(geometry) = store.tracked().boundary.as_ref() else {
            return EditOutcome::Ignored;
        };
        match set_point_at_index(geometry, point, index) {
            Ok(new_geometry) => commit(store, new_geometry),
            Err(e) => {
                log::debug!("Boundary move ignored: {}", e);
                EditOutcome::Ignored
            }
        }
    }

    /// Start dragging a vertex (move mode only).
    pub fn begin_vertex_drag(&mut self, store: &mut MapStore, index: usize, point: Point) -> bool {
        if !matches!(self.handle_vertex_select(store, index), EditOutcome::VertexSelected(_)) {
            return false;
        }
        self.drag = Some(VertexDrag {
            index,
            current: point,
        });
        true
    }

    pub fn update_vertex_drag(&mut self, point: Point) {
        if let Some(drag) = &mut self.drag {
            drag.current = point;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Geometry to draw while a vertex is being dragged.
    pub fn drag_preview(&self, geometry: &MapGeometry) -> Option<MapGeometry> {
        let drag = self.drag?;
        set_point_at_index(geometry, drag.current, drag.index).ok()
    }

    /// Finish the current vertex drag, committing its last position.
    pub fn finish_vertex_drag(&mut self, store: &mut MapStore) -> EditOutcome {
        match self.drag.take() {
            Some(drag) => self.handle_vertex_drag_end(store, drag.index, drag.current),
            None => EditOutcome::Ignored,
        }
    }

    pub fn cancel_vertex_drag(&mut self) {
        self.drag = None;
    }
}

fn commit(store: &mut MapStore, geometry: MapGeometry) -> EditOutcome {
    match store.execute_action(MapAction::UpdateMapGeometry(UpdateMapGeometry::new(geometry))) {
        Ok(sync) => EditOutcome::Applied(sync),
        Err(e) => {
            log::error!("Boundary edit rejected by store: {}", e);
            EditOutcome::Rejected(e)
        }
    }
}
