//! Remote authority abstraction: where executed actions are persisted.

mod file;
mod http;
mod memory;

pub use file::FileAuthority;
pub use http::HttpAuthority;
pub use memory::MemoryAuthority;

use crate::action::{MoveUpdate, TransformUpdate};
use crate::boundary::MapGeometry;
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors reported by a remote authority.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by authority calls. `Send` so hosts can spawn it.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Partial update of one object, tagged like the backend's update DTO.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum ObjectUpdate {
    Move(MoveUpdate),
    Transform(TransformUpdate),
}

impl ObjectUpdate {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectUpdate::Move(u) => u.id,
            ObjectUpdate::Transform(u) => u.id,
        }
    }

    pub fn apply_to(&self, object: &mut ObjectState) {
        match self {
            ObjectUpdate::Move(u) => u.apply_to(object),
            ObjectUpdate::Transform(u) => u.apply_to(object),
        }
    }
}

/// The source of truth that actions are persisted to.
pub trait RemoteAuthority: Send + Sync {
    /// Fetch the tracked state of a map.
    fn load_map(&self, map_id: MapId) -> BoxFuture<'_, RemoteResult<TrackedMapState>>;

    /// Create objects on a layer. Re-creating an identical object succeeds.
    fn create_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        objects: &[ObjectState],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>>;

    /// Apply move/transform updates. Every id must exist.
    fn update_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        updates: &[ObjectUpdate],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>>;

    /// Delete objects, returning the ids that were removed.
    fn delete_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        ids: &[ObjectId],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectId>>>;

    /// Replace the map boundary.
    fn update_map_geometry(
        &self,
        map_id: MapId,
        geometry: &MapGeometry,
    ) -> BoxFuture<'_, RemoteResult<MapGeometry>>;
}

// Shared by the in-memory and file-backed authorities. Each operation validates
// the whole batch before touching the map.

pub(crate) fn create_in(
    map: &mut TrackedMapState,
    layer: LayerName,
    objects: &[ObjectState],
) -> RemoteResult<Vec<ObjectState>> {
    let target = map.layer_mut(layer);
    let mut fresh = Vec::new();
    let mut batch_ids = HashSet::new();
    for object in objects {
        if object.layer != layer {
            return Err(RemoteError::Validation(format!(
                "object {} belongs to {:?}, not {:?}",
                object.id, object.layer, layer
            )));
        }
        if !batch_ids.insert(object.id) {
            return Err(RemoteError::Validation(format!("duplicate id {} in request", object.id)));
        }
        match target.get(object.id) {
            Some(existing) if existing == object => {}
            Some(_) => {
                return Err(RemoteError::Conflict(format!(
                    "object {} already exists with different content",
                    object.id
                )))
            }
            None => fresh.push(object.clone()),
        }
    }
    target.objects.extend(fresh);
    Ok(objects.to_vec())
}

pub(crate) fn update_in(
    map: &mut TrackedMapState,
    layer: LayerName,
    updates: &[ObjectUpdate],
) -> RemoteResult<Vec<ObjectState>> {
    let target = map.layer_mut(layer);
    if let Some(missing) = updates.iter().find(|u| !target.contains(u.id())) {
        return Err(RemoteError::NotFound(format!(
            "object {} on layer {:?}",
            missing.id(),
            layer
        )));
    }
    let mut updated = Vec::with_capacity(updates.len());
    for update in updates {
        if let Some(object) = target.get_mut(update.id()) {
            update.apply_to(object);
            updated.push(object.clone());
        }
    }
    Ok(updated)
}

pub(crate) fn delete_in(map: &mut TrackedMapState, layer: LayerName, ids: &[ObjectId]) -> Vec<ObjectId> {
    let requested: HashSet<ObjectId> = ids.iter().copied().collect();
    let target = map.layer_mut(layer);
    let mut removed = Vec::new();
    target.objects.retain(|o| {
        let hit = requested.contains(&o.id);
        if hit {
            removed.push(o.id);
        }
        !hit
    });
    removed
}

pub(crate) fn set_geometry_in(map: &mut TrackedMapState, geometry: &MapGeometry) -> RemoteResult<MapGeometry> {
    geometry
        .validate()
        .map_err(|e| RemoteError::Validation(e.to_string()))?;
    map.boundary = Some(geometry.clone());
    Ok(geometry.clone())
}

/// Minimal executor for driving futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
