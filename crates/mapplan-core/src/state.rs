//! Document state: the history-tracked and untracked halves of an open map.

use crate::boundary::{BoundaryEditMode, MapGeometry};
use crate::selection::SelectionHandleSet;
use kurbo::{Affine, Rect};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Unique identifier for map objects (generated client-side).
pub type ObjectId = Uuid;

/// Identifier of a map on the remote authority.
pub type MapId = i32;

/// The layers of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LayerName {
    Base,
    #[default]
    Plant,
    Drawing,
    Dimension,
    Fertilization,
    Habitats,
    Hydrology,
    Infrastructure,
    Labels,
    Landscape,
    Paths,
    Shade,
    Soil,
    Terrain,
    Trees,
    Warnings,
    Winds,
    Zones,
}

impl LayerName {
    /// All layers in display order.
    pub const ALL: [LayerName; 18] = [
        LayerName::Base,
        LayerName::Plant,
        LayerName::Drawing,
        LayerName::Dimension,
        LayerName::Fertilization,
        LayerName::Habitats,
        LayerName::Hydrology,
        LayerName::Infrastructure,
        LayerName::Labels,
        LayerName::Landscape,
        LayerName::Paths,
        LayerName::Shade,
        LayerName::Soil,
        LayerName::Terrain,
        LayerName::Trees,
        LayerName::Warnings,
        LayerName::Winds,
        LayerName::Zones,
    ];
}

/// Geometry and identity of a single object placed on a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub id: ObjectId,
    /// Layer the object lives on.
    pub layer: LayerName,
    /// Free-form type tag (e.g. `"plant"`).
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees around `(x, y)`.
    pub rotation: f64,
    #[serde(rename = "scaleX")]
    pub scale_x: f64,
    #[serde(rename = "scaleY")]
    pub scale_y: f64,
}

impl ObjectState {
    /// Create an unrotated, unscaled object with a fresh id.
    pub fn new(layer: LayerName, kind: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            layer,
            kind: kind.into(),
            x,
            y,
            width,
            height,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Local-to-world transform: translate, then rotate, then scale.
    pub fn transform(&self) -> Affine {
        Affine::translate((self.x, self.y))
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }

    /// Axis-aligned bounding box in world coordinates.
    pub fn bounds(&self) -> Rect {
        self.transform()
            .transform_rect_bbox(Rect::new(0.0, 0.0, self.width, self.height))
    }
}

/// Objects of one layer, back to front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedLayerState {
    pub index: LayerName,
    pub objects: Vec<ObjectState>,
}

impl TrackedLayerState {
    /// Create an empty layer.
    pub fn new(index: LayerName) -> Self {
        Self {
            index,
            objects: Vec::new(),
        }
    }

    /// Position of an object in the layer's list.
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectState> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectState> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.position(id).is_some()
    }
}

/// The part of the document subject to undo/redo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedMapState {
    pub layers: HashMap<LayerName, TrackedLayerState>,
    /// Map outline, if one has been set.
    #[serde(default)]
    pub boundary: Option<MapGeometry>,
}

impl Default for TrackedMapState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedMapState {
    /// Create a document with every layer present and empty.
    pub fn new() -> Self {
        Self {
            layers: LayerName::ALL
                .iter()
                .map(|&name| (name, TrackedLayerState::new(name)))
                .collect(),
            boundary: None,
        }
    }

    /// Create a document with the given boundary.
    pub fn with_boundary(boundary: MapGeometry) -> Self {
        Self {
            boundary: Some(boundary),
            ..Self::new()
        }
    }

    pub fn layer(&self, name: LayerName) -> Option<&TrackedLayerState> {
        self.layers.get(&name)
    }

    /// Mutable access to a layer, creating it if a loaded document lacked it.
    pub fn layer_mut(&mut self, name: LayerName) -> &mut TrackedLayerState {
        self.layers
            .entry(name)
            .or_insert_with(|| TrackedLayerState::new(name))
    }

    /// Find an object on a specific layer.
    pub fn object(&self, layer: LayerName, id: ObjectId) -> Option<&ObjectState> {
        self.layer(layer).and_then(|l| l.get(id))
    }

    /// Find an object on any layer.
    pub fn find_object(&self, id: ObjectId) -> Option<&ObjectState> {
        LayerName::ALL
            .iter()
            .filter_map(|name| self.layers.get(name))
            .find_map(|l| l.get(id))
    }

    /// Ids of every object, layer by layer.
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.layers.values().flat_map(|l| l.objects.iter().map(|o| o.id))
    }

    /// Whether an object with this id exists on any layer.
    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.find_object(id).is_some()
    }

    /// Total number of objects across all layers.
    pub fn object_count(&self) -> usize {
        self.layers.values().map(|l| l.objects.len()).sum()
    }

    /// Check the document-level invariants of a loaded state.
    pub fn validate(&self) -> Result<(), String> {
        for (name, layer) in &self.layers {
            if layer.index != *name {
                return Err(format!("layer {:?} is stored under {:?}", layer.index, name));
            }
            let mut seen = HashSet::new();
            for object in &layer.objects {
                if object.layer != *name {
                    return Err(format!("object {} claims layer {:?} but lives on {:?}", object.id, object.layer, name));
                }
                if !seen.insert(object.id) {
                    return Err(format!("duplicate object id {} on layer {:?}", object.id, name));
                }
            }
        }
        if let Some(boundary) = &self.boundary {
            boundary.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Display state of a layer (not part of history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntrackedLayerState {
    pub index: LayerName,
    pub visible: bool,
    pub opacity: f64,
}

impl UntrackedLayerState {
    pub fn new(index: LayerName) -> Self {
        Self {
            index,
            visible: true,
            opacity: 1.0,
        }
    }
}

/// UI/session state excluded from undo/redo.
#[derive(Debug, Clone)]
pub struct UntrackedMapState {
    /// Layer that receives new objects and keyboard commands.
    pub selected_layer: LayerName,
    pub layers: HashMap<LayerName, UntrackedLayerState>,
    /// Visible part of the map in world coordinates.
    pub editor_bounds: Rect,
    /// Which boundary gesture handler is active.
    pub boundary_edit_mode: BoundaryEditMode,
    /// Objects currently attached to the transform handles.
    pub selection: SelectionHandleSet,
}

impl Default for UntrackedMapState {
    fn default() -> Self {
        Self::new()
    }
}

impl UntrackedMapState {
    pub fn new() -> Self {
        Self {
            selected_layer: LayerName::default(),
            layers: LayerName::ALL
                .iter()
                .map(|&name| (name, UntrackedLayerState::new(name)))
                .collect(),
            editor_bounds: Rect::new(0.0, 0.0, 800.0, 600.0),
            boundary_edit_mode: BoundaryEditMode::default(),
            selection: SelectionHandleSet::new(),
        }
    }

    /// Whether a layer is shown. Unknown layers count as visible.
    pub fn is_layer_visible(&self, name: LayerName) -> bool {
        self.layers.get(&name).map(|l| l.visible).unwrap_or(true)
    }

    pub fn layer_mut(&mut self, name: LayerName) -> &mut UntrackedLayerState {
        self.layers
            .entry(name)
            .or_insert_with(|| UntrackedLayerState::new(name))
    }

    /// Longest side of the visible editor area.
    pub fn editor_longest_side(&self) -> f64 {
        self.editor_bounds.width().max(self.editor_bounds.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::MapGeometry;
    use kurbo::Point;

    #[test]
    fn test_new_document_has_all_layers() {
        let state = TrackedMapState::new();
        assert_eq!(state.layers.len(), LayerName::ALL.len());
        assert_eq!(state.object_count(), 0);
        assert!(state.boundary.is_none());
    }

    #[test]
    fn test_object_bounds_unrotated() {
        let mut object = ObjectState::new(LayerName::Plant, "plant", 10.0, 20.0, 100.0, 50.0);
        object.scale_x = 2.0;
        let bounds = object.bounds();
        assert!((bounds.x0 - 10.0).abs() < 1e-9);
        assert!((bounds.y0 - 20.0).abs() < 1e-9);
        assert!((bounds.x1 - 210.0).abs() < 1e-9);
        assert!((bounds.y1 - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_object_bounds_rotated() {
        let mut object = ObjectState::new(LayerName::Plant, "plant", 0.0, 0.0, 10.0, 10.0);
        object.rotation = 90.0;
        let bounds = object.bounds();
        // Rotating a square 90° about its origin swings it to negative x.
        assert!((bounds.x0 + 10.0).abs() < 1e-9);
        assert!((bounds.x1).abs() < 1e-9);
        assert!((bounds.y0).abs() < 1e-9);
        assert!((bounds.y1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_object_across_layers() {
        let mut state = TrackedMapState::new();
        let object = ObjectState::new(LayerName::Trees, "tree", 0.0, 0.0, 1.0, 1.0);
        let id = object.id;
        state.layer_mut(LayerName::Trees).objects.push(object);

        assert!(state.contains_object(id));
        assert!(state.object(LayerName::Plant, id).is_none());
        assert_eq!(state.find_object(id).map(|o| o.layer), Some(LayerName::Trees));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut state = TrackedMapState::new();
        let object = ObjectState::new(LayerName::Plant, "plant", 0.0, 0.0, 1.0, 1.0);
        state.layer_mut(LayerName::Plant).objects.push(object.clone());
        assert!(state.validate().is_ok());
        state.layer_mut(LayerName::Plant).objects.push(object);
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_checks_boundary() {
        let open = MapGeometry::from_ring(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        let state = TrackedMapState::with_boundary(open);
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip_uses_original_field_names() {
        let object = ObjectState::new(LayerName::Plant, "plant", 1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["type"], "plant");
        assert_eq!(json["scaleX"], 1.0);
        let back: ObjectState = serde_json::from_value(json).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_untracked_defaults() {
        let untracked = UntrackedMapState::new();
        assert_eq!(untracked.selected_layer, LayerName::Plant);
        assert!(untracked.is_layer_visible(LayerName::Base));
        assert_eq!(untracked.boundary_edit_mode, BoundaryEditMode::None);
        assert!(untracked.selection.is_empty());
        assert!((untracked.editor_longest_side() - 800.0).abs() < f64::EPSILON);
    }
}
