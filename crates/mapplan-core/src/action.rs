//! Actions: the only way tracked state changes.
//!
//! An action is applied locally and synchronously with [`Action::apply`], and
//! persisted remotely with [`Action::execute`]. Its inverse is computed
//! eagerly from the state *before* it is applied, so undo never has to
//! re-derive prior geometry.

use crate::boundary::MapGeometry;
use crate::remote::{BoxFuture, ObjectUpdate, RemoteAuthority, RemoteResult};
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// An invertible, replayable unit of change.
pub trait Action {
    /// What the remote authority returns on success.
    type Output;
    /// Type of the action that undoes this one.
    type Reverse: Action;

    /// Apply the change to a tracked state. Never fails; ids that are not
    /// present are skipped.
    fn apply(&self, state: TrackedMapState) -> TrackedMapState;

    /// Build the inverse from the state this action is about to be applied
    /// to. `None` when the action cannot be undone.
    fn reverse(&self, state: &TrackedMapState) -> Option<Self::Reverse>;

    /// Persist the change on the remote authority. Has no local side effect.
    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<Self::Output>>;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// New position of one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveUpdate {
    pub id: ObjectId,
    pub x: f64,
    pub y: f64,
}

impl MoveUpdate {
    pub fn new(id: ObjectId, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    pub fn apply_to(&self, object: &mut ObjectState) {
        object.x = self.x;
        object.y = self.y;
    }

    fn capture(object: &ObjectState) -> Self {
        Self::new(object.id, object.x, object.y)
    }
}

/// New position, rotation and scale of one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    pub id: ObjectId,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    #[serde(rename = "scaleX")]
    pub scale_x: f64,
    #[serde(rename = "scaleY")]
    pub scale_y: f64,
}

impl TransformUpdate {
    pub fn apply_to(&self, object: &mut ObjectState) {
        object.x = self.x;
        object.y = self.y;
        object.rotation = self.rotation;
        object.scale_x = self.scale_x;
        object.scale_y = self.scale_y;
    }

    /// Capture the current transform of an object.
    pub fn capture(object: &ObjectState) -> Self {
        Self {
            id: object.id,
            x: object.x,
            y: object.y,
            rotation: object.rotation,
            scale_x: object.scale_x,
            scale_y: object.scale_y,
        }
    }
}

/// An object to insert, optionally at a fixed position in its layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObject {
    /// Position in the layer's list; `None` appends.
    pub index: Option<usize>,
    pub object: ObjectState,
}

/// Insert objects into a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateObjects {
    pub layer: LayerName,
    pub objects: Vec<PlacedObject>,
}

impl CreateObjects {
    /// Append the given objects to `layer`.
    pub fn new(layer: LayerName, objects: Vec<ObjectState>) -> Self {
        Self {
            layer,
            objects: objects
                .into_iter()
                .map(|object| PlacedObject {
                    index: None,
                    object,
                })
                .collect(),
        }
    }

    pub fn single(object: ObjectState) -> Self {
        Self::new(object.layer, vec![object])
    }
}

impl Action for CreateObjects {
    type Output = Vec<ObjectState>;
    type Reverse = DeleteObjects;

    fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        let layer = state.layer_mut(self.layer);
        for placed in &self.objects {
            if layer.contains(placed.object.id) {
                continue;
            }
            let mut object = placed.object.clone();
            object.layer = self.layer;
            match placed.index {
                Some(index) => {
                    let index = index.min(layer.objects.len());
                    layer.objects.insert(index, object);
                }
                None => layer.objects.push(object),
            }
        }
        state
    }

    fn reverse(&self, state: &TrackedMapState) -> Option<DeleteObjects> {
        // Ids already present are skipped by apply, so they must survive the undo.
        let existing = state.layer(self.layer);
        let ids = self
            .objects
            .iter()
            .map(|p| p.object.id)
            .filter(|id| !existing.is_some_and(|l| l.contains(*id)))
            .collect();
        Some(DeleteObjects::new(self.layer, ids))
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<Vec<ObjectState>>> {
        let layer = self.layer;
        let objects: Vec<ObjectState> = self
            .objects
            .iter()
            .map(|p| ObjectState {
                layer,
                ..p.object.clone()
            })
            .collect();
        Box::pin(async move { remote.create_objects(map_id, layer, &objects).await })
    }

    fn name(&self) -> &'static str {
        "CreateObjects"
    }
}

/// Remove objects from a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteObjects {
    pub layer: LayerName,
    pub ids: Vec<ObjectId>,
}

impl DeleteObjects {
    pub fn new(layer: LayerName, ids: Vec<ObjectId>) -> Self {
        Self { layer, ids }
    }
}

impl Action for DeleteObjects {
    type Output = Vec<ObjectId>;
    type Reverse = CreateObjects;

    fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        let ids: HashSet<ObjectId> = self.ids.iter().copied().collect();
        state
            .layer_mut(self.layer)
            .objects
            .retain(|o| !ids.contains(&o.id));
        state
    }

    fn reverse(&self, state: &TrackedMapState) -> Option<CreateObjects> {
        let layer = state.layer(self.layer)?;
        let mut restored = Vec::with_capacity(self.ids.len());
        let mut seen = HashSet::new();
        for id in &self.ids {
            if !seen.insert(*id) {
                continue;
            }
            let index = layer.position(*id)?;
            restored.push(PlacedObject {
                index: Some(index),
                object: layer.objects[index].clone(),
            });
        }
        // Reinserting in ascending order puts every object back at its old index.
        restored.sort_by_key(|p| p.index);
        Some(CreateObjects {
            layer: self.layer,
            objects: restored,
        })
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<Vec<ObjectId>>> {
        let layer = self.layer;
        let ids = self.ids.clone();
        Box::pin(async move { remote.delete_objects(map_id, layer, &ids).await })
    }

    fn name(&self) -> &'static str {
        "DeleteObjects"
    }
}

/// Move several objects of one layer in a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveObjects {
    pub layer: LayerName,
    pub updates: Vec<MoveUpdate>,
}

impl MoveObjects {
    pub fn new(layer: LayerName, updates: Vec<MoveUpdate>) -> Self {
        Self { layer, updates }
    }
}

impl Action for MoveObjects {
    type Output = Vec<ObjectState>;
    type Reverse = MoveObjects;

    fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        let layer = state.layer_mut(self.layer);
        for update in &self.updates {
            if let Some(object) = layer.get_mut(update.id) {
                update.apply_to(object);
            }
        }
        state
    }

    fn reverse(&self, state: &TrackedMapState) -> Option<MoveObjects> {
        let layer = state.layer(self.layer)?;
        let updates = self
            .updates
            .iter()
            .map(|u| layer.get(u.id).map(MoveUpdate::capture))
            .collect::<Option<Vec<_>>>()?;
        Some(MoveObjects::new(self.layer, updates))
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<Vec<ObjectState>>> {
        let layer = self.layer;
        let updates: Vec<ObjectUpdate> = self.updates.iter().copied().map(ObjectUpdate::Move).collect();
        Box::pin(async move { remote.update_objects(map_id, layer, &updates).await })
    }

    fn name(&self) -> &'static str {
        "MoveObjects"
    }
}

/// Move, rotate and scale several objects of one layer in a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformObjects {
    pub layer: LayerName,
    pub updates: Vec<TransformUpdate>,
}

impl TransformObjects {
    pub fn new(layer: LayerName, updates: Vec<TransformUpdate>) -> Self {
        Self { layer, updates }
    }
}

impl Action for TransformObjects {
    type Output = Vec<ObjectState>;
    type Reverse = TransformObjects;

    fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        let layer = state.layer_mut(self.layer);
        for update in &self.updates {
            if let Some(object) = layer.get_mut(update.id) {
                update.apply_to(object);
            }
        }
        state
    }

    fn reverse(&self, state: &TrackedMapState) -> Option<TransformObjects> {
        let layer = state.layer(self.layer)?;
        let updates = self
            .updates
            .iter()
            .map(|u| layer.get(u.id).map(TransformUpdate::capture))
            .collect::<Option<Vec<_>>>()?;
        Some(TransformObjects::new(self.layer, updates))
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<Vec<ObjectState>>> {
        let layer = self.layer;
        let updates: Vec<ObjectUpdate> = self
            .updates
            .iter()
            .copied()
            .map(ObjectUpdate::Transform)
            .collect();
        Box::pin(async move { remote.update_objects(map_id, layer, &updates).await })
    }

    fn name(&self) -> &'static str {
        "TransformObjects"
    }
}

/// Replace the map boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMapGeometry {
    pub geometry: MapGeometry,
}

impl UpdateMapGeometry {
    pub fn new(geometry: MapGeometry) -> Self {
        Self { geometry }
    }
}

impl Action for UpdateMapGeometry {
    type Output = MapGeometry;
    type Reverse = UpdateMapGeometry;

    fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        state.boundary = Some(self.geometry.clone());
        state
    }

    /// The authority cannot remove a boundary, so setting the first one is
    /// irreversible.
    fn reverse(&self, state: &TrackedMapState) -> Option<UpdateMapGeometry> {
        state.boundary.clone().map(UpdateMapGeometry::new)
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<MapGeometry>> {
        let geometry = self.geometry.clone();
        Box::pin(async move { remote.update_map_geometry(map_id, &geometry).await })
    }

    fn name(&self) -> &'static str {
        "UpdateMapGeometry"
    }
}

/// What the authority returned for an executed [`MapAction`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionReceipt {
    Objects(Vec<ObjectState>),
    Deleted(Vec<ObjectId>),
    Geometry(MapGeometry),
}

/// Every action the editor can record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum MapAction {
    CreateObjects(CreateObjects),
    DeleteObjects(DeleteObjects),
    MoveObjects(MoveObjects),
    TransformObjects(TransformObjects),
    UpdateMapGeometry(UpdateMapGeometry),
}

impl Action for MapAction {
    type Output = ActionReceipt;
    type Reverse = MapAction;

    fn apply(&self, state: TrackedMapState) -> TrackedMapState {
        match self {
            MapAction::CreateObjects(a) => a.apply(state),
            MapAction::DeleteObjects(a) => a.apply(state),
            MapAction::MoveObjects(a) => a.apply(state),
            MapAction::TransformObjects(a) => a.apply(state),
            MapAction::UpdateMapGeometry(a) => a.apply(state),
        }
    }

    fn reverse(&self, state: &TrackedMapState) -> Option<MapAction> {
        match self {
            MapAction::CreateObjects(a) => a.reverse(state).map(MapAction::from),
            MapAction::DeleteObjects(a) => a.reverse(state).map(MapAction::from),
            MapAction::MoveObjects(a) => a.reverse(state).map(MapAction::from),
            MapAction::TransformObjects(a) => a.reverse(state).map(MapAction::from),
            MapAction::UpdateMapGeometry(a) => a.reverse(state).map(MapAction::from),
        }
    }

    fn execute(
        &self,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
    ) -> BoxFuture<'static, RemoteResult<ActionReceipt>> {
        match self {
            MapAction::CreateObjects(a) => {
                let fut = a.execute(remote, map_id);
                Box::pin(async move { fut.await.map(ActionReceipt::Objects) })
            }
            MapAction::DeleteObjects(a) => {
                let fut = a.execute(remote, map_id);
                Box::pin(async move { fut.await.map(ActionReceipt::Deleted) })
            }
            MapAction::MoveObjects(a) => {
                let fut = a.execute(remote, map_id);
                Box::pin(async move { fut.await.map(ActionReceipt::Objects) })
            }
            MapAction::TransformObjects(a) => {
                let fut = a.execute(remote, map_id);
                Box::pin(async move { fut.await.map(ActionReceipt::Objects) })
            }
            MapAction::UpdateMapGeometry(a) => {
                let fut = a.execute(remote, map_id);
                Box::pin(async move { fut.await.map(ActionReceipt::Geometry) })
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MapAction::CreateObjects(a) => a.name(),
            MapAction::DeleteObjects(a) => a.name(),
            MapAction::MoveObjects(a) => a.name(),
            MapAction::TransformObjects(a) => a.name(),
            MapAction::UpdateMapGeometry(a) => a.name(),
        }
    }
}

impl From<CreateObjects> for MapAction {
    fn from(action: CreateObjects) -> Self {
        MapAction::CreateObjects(action)
    }
}

impl From<DeleteObjects> for MapAction {
    fn from(action: DeleteObjects) -> Self {
        MapAction::DeleteObjects(action)
    }
}

impl From<MoveObjects> for MapAction {
    fn from(action: MoveObjects) -> Self {
        MapAction::MoveObjects(action)
    }
}

impl From<TransformObjects> for MapAction {
    fn from(action: TransformObjects) -> Self {
        MapAction::TransformObjects(action)
    }
}

impl From<UpdateMapGeometry> for MapAction {
    fn from(action: UpdateMapGeometry) -> Self {
        MapAction::UpdateMapGeometry(action)
    }
}
