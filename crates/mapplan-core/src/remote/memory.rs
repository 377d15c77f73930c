//! In-memory remote authority.

use super::{
    create_in, delete_in, set_geometry_in, update_in, BoxFuture, ObjectUpdate, RemoteAuthority,
    RemoteError, RemoteResult,
};
use crate::boundary::MapGeometry;
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState};
use std::collections::HashMap;
use std::future::ready;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// In-memory authority for tests, demos and the HTTP server.
///
/// Switching it offline makes every call fail with
/// [`RemoteError::Unavailable`] without touching stored maps.
#[derive(Default)]
pub struct MemoryAuthority {
    maps: RwLock<HashMap<MapId, TrackedMapState>>,
    offline: AtomicBool,
}

impl MemoryAuthority {
    /// Create a new authority with no maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a map.
    pub fn insert_map(&self, map_id: MapId, state: TrackedMapState) {
        match self.maps.write() {
            Ok(mut maps) => {
                maps.insert(map_id, state);
            }
            Err(e) => log::error!("Lock error inserting map {}: {}", map_id, e),
        }
    }

    /// Current stored state of a map.
    pub fn snapshot(&self, map_id: MapId) -> Option<TrackedMapState> {
        self.maps.read().ok()?.get(&map_id).cloned()
    }

    /// Ids of all stored maps, ascending.
    pub fn map_ids(&self) -> Vec<MapId> {
        let mut ids: Vec<MapId> = self
            .maps
            .read()
            .map(|maps| maps.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn read<T>(&self, map_id: MapId, f: impl FnOnce(&TrackedMapState) -> T) -> RemoteResult<T> {
        self.check_online()?;
        let maps = self
            .maps
            .read()
            .map_err(|e| RemoteError::Unavailable(format!("Lock error: {}", e)))?;
        maps.get(&map_id)
            .map(f)
            .ok_or_else(|| RemoteError::NotFound(format!("map {}", map_id)))
    }

    fn write<T>(
        &self,
        map_id: MapId,
        f: impl FnOnce(&mut TrackedMapState) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        self.check_online()?;
        let mut maps = self
            .maps
            .write()
            .map_err(|e| RemoteError::Unavailable(format!("Lock error: {}", e)))?;
        let map = maps
            .get_mut(&map_id)
            .ok_or_else(|| RemoteError::NotFound(format!("map {}", map_id)))?;
        // Work on a copy so a failed batch leaves the stored map untouched.
        let mut draft = map.clone();
        let result = f(&mut draft)?;
        *map = draft;
        Ok(result)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.is_offline() {
            return Err(RemoteError::Unavailable("authority is offline".to_string()));
        }
        Ok(())
    }
}

impl RemoteAuthority for MemoryAuthority {
    fn load_map(&self, map_id: MapId) -> BoxFuture<'_, RemoteResult<TrackedMapState>> {
        Box::pin(ready(self.read(map_id, TrackedMapState::clone)))
    }

    fn create_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        objects: &[ObjectState],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        Box::pin(ready(self.write(map_id, |map| create_in(map, layer, objects))))
    }

    fn update_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        updates: &[ObjectUpdate],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        Box::pin(ready(self.write(map_id, |map| update_in(map, layer, updates))))
    }

    fn delete_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        ids: &[ObjectId],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectId>>> {
        Box::pin(ready(self.write(map_id, |map| Ok(delete_in(map, layer, ids)))))
    }

    fn update_map_geometry(
        &self,
        map_id: MapId,
        geometry: &MapGeometry,
    ) -> BoxFuture<'_, RemoteResult<MapGeometry>> {
        Box::pin(ready(self.write(map_id, |map| set_geometry_in(map, geometry))))
    }
}
