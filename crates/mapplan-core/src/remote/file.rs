//! File-backed remote authority for offline use.

use super::{
    create_in, delete_in, set_geometry_in, update_in, BoxFuture, ObjectUpdate, RemoteAuthority,
    RemoteError, RemoteResult,
};
use crate::boundary::MapGeometry;
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState};
use std::fs;
use std::future::ready;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Stores each map as a JSON file named `map-<id>.json`.
pub struct FileAuthority {
    /// Base directory for map files.
    base_path: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileAuthority {
    /// Create an authority rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> RemoteResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                RemoteError::Io(format!("Failed to create map directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Create an authority in the user's local data directory.
    ///
    /// On Linux: `~/.local/share/mapplan/maps/`
    pub fn default_location() -> RemoteResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RemoteError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("mapplan").join("maps"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn map_path(&self, map_id: MapId) -> PathBuf {
        self.base_path.join(format!("map-{}.json", map_id))
    }

    /// Create or replace a map file.
    pub fn insert_map(&self, map_id: MapId, state: &TrackedMapState) -> RemoteResult<()> {
        let _guard = self.lock()?;
        self.save(map_id, state)
    }

    fn lock(&self) -> RemoteResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| RemoteError::Unavailable(format!("Lock error: {}", e)))
    }

    fn load(&self, map_id: MapId) -> RemoteResult<TrackedMapState> {
        let path = self.map_path(map_id);
        if !path.exists() {
            return Err(RemoteError::NotFound(format!("map {}", map_id)));
        }
        let json = fs::read_to_string(&path).map_err(|e| {
            RemoteError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            RemoteError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn save(&self, map_id: MapId, state: &TrackedMapState) -> RemoteResult<()> {
        let path = self.map_path(map_id);
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        fs::write(&path, json).map_err(|e| {
            RemoteError::Io(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    fn modify<T>(
        &self,
        map_id: MapId,
        f: impl FnOnce(&mut TrackedMapState) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let _guard = self.lock()?;
        let mut map = self.load(map_id)?;
        let result = f(&mut map)?;
        self.save(map_id, &map)?;
        log::debug!("Saved map {} to {}", map_id, self.map_path(map_id).display());
        Ok(result)
    }
}

impl RemoteAuthority for FileAuthority {
    fn load_map(&self, map_id: MapId) -> BoxFuture<'_, RemoteResult<TrackedMapState>> {
        Box::pin(ready(self.load(map_id)))
    }

    fn create_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        objects: &[ObjectState],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        Box::pin(ready(self.modify(map_id, |map| create_in(map, layer, objects))))
    }

    fn update_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        updates: &[ObjectUpdate],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectState>>> {
        Box::pin(ready(self.modify(map_id, |map| update_in(map, layer, updates))))
    }

    fn delete_objects(
        &self,
        map_id: MapId,
        layer: LayerName,
        ids: &[ObjectId],
    ) -> BoxFuture<'_, RemoteResult<Vec<ObjectId>>> {
        Box::pin(ready(self.modify(map_id, |map| Ok(delete_in(map, layer, ids)))))
    }

    fn update_map_geometry(
        &self,
        map_id: MapId,
        geometry: &MapGeometry,
    ) -> BoxFuture<'_, RemoteResult<MapGeometry>> {
        Box::pin(ready(self.modify(map_id, |map| set_geometry_in(map, geometry))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::square;
    use crate::remote::block_on;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let authority = FileAuthority::new(dir.path().to_path_buf()).unwrap();
        authority
            .insert_map(5, &TrackedMapState::with_boundary(square()))
            .unwrap();

        let object = ObjectState::new(LayerName::Trees, "tree", 1.0, 1.0, 2.0, 2.0);
        block_on(authority.create_objects(5, LayerName::Trees, &[object.clone()])).unwrap();

        // A second authority on the same directory sees the change.
        let reopened = FileAuthority::new(dir.path().to_path_buf()).unwrap();
        let loaded = block_on(reopened.load_map(5)).unwrap();
        assert_eq!(loaded.find_object(object.id), Some(&object));
        assert_eq!(loaded.boundary, Some(square()));
    }

    #[test]
    fn test_missing_map() {
        let dir = tempdir().unwrap();
        let authority = FileAuthority::new(dir.path().to_path_buf()).unwrap();
        let result = block_on(authority.load_map(9));
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let authority = FileAuthority::new(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join("map-2.json"), "not json").unwrap();
        let result = block_on(authority.load_map(2));
        assert!(matches!(result, Err(RemoteError::Serialization(_))));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let authority = FileAuthority::new(nested.clone()).unwrap();
        assert!(nested.exists());
        assert_eq!(authority.base_path(), nested.as_path());
    }

    #[test]
    fn test_rejected_update_not_saved() {
        let dir = tempdir().unwrap();
        let authority = FileAuthority::new(dir.path().to_path_buf()).unwrap();
        authority.insert_map(1, &TrackedMapState::with_boundary(square())).unwrap();

        let mut open = square();
        open.rings[0].pop();
        let result = block_on(authority.update_map_geometry(1, &open));
        assert!(matches!(result, Err(RemoteError::Validation(_))));
        assert_eq!(block_on(authority.load_map(1)).unwrap().boundary, Some(square()));
    }
}
