//! The document store: single mutation entry point for an open map.

use crate::action::{Action, ActionReceipt, MapAction};
use crate::boundary::BoundaryEditMode;
use crate::config::EditorConfig;
use crate::history::{History, HistoryError};
use crate::remote::{BoxFuture, RemoteAuthority, RemoteError, RemoteResult};
use crate::state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState, UntrackedMapState};
use kurbo::Rect;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// User-facing warnings, surfaced as translation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorWarning {
    /// A boundary vertex removal would leave fewer than four vertices.
    VertexRemovalForbidden,
}

impl EditorWarning {
    pub fn translation_key(&self) -> &'static str {
        match self {
            EditorWarning::VertexRemovalForbidden => "polygon_delete_point_forbidden",
        }
    }
}

/// Events the host should show to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Warning(EditorWarning),
    /// The remote authority rejected an action that is already applied locally.
    SyncFailed {
        action: &'static str,
        error: RemoteError,
    },
}

/// Remote persistence of an applied action.
///
/// Local state is already updated when this is returned; driving it to
/// completion performs the remote call. Failures are logged and reported as
/// [`Notification::SyncFailed`]; local state is never rolled back.
#[must_use = "the action is only persisted when the sync is driven"]
pub struct PendingSync {
    action: &'static str,
    inner: BoxFuture<'static, RemoteResult<ActionReceipt>>,
    finished: bool,
}

impl PendingSync {
    fn new(
        action: &MapAction,
        remote: Arc<dyn RemoteAuthority>,
        map_id: MapId,
        notifier: Sender<Notification>,
        failures: Arc<AtomicUsize>,
    ) -> Self {
        let name = action.name();
        let execute = action.execute(remote, map_id);
        let inner = Box::pin(async move {
            let result = execute.await;
            match &result {
                Ok(_) => log::debug!("Synced {} for map {}", name, map_id),
                Err(e) => {
                    log::warn!("Failed to sync {} for map {}: {}", name, map_id, e);
                    failures.fetch_add(1, Ordering::SeqCst);
                    // The receiver lives in the store; if it is gone nobody is listening.
                    let _ = notifier.send(Notification::SyncFailed {
                        action: name,
                        error: e.clone(),
                    });
                }
            }
            result
        });
        Self {
            action: name,
            inner,
            finished: false,
        }
    }

    /// Name of the action being persisted.
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Whether the remote call has completed, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Future for PendingSync {
    type Output = RemoteResult<ActionReceipt>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let poll = self.inner.as_mut().poll(cx);
        if poll.is_ready() {
            self.finished = true;
        }
        poll
    }
}

impl Drop for PendingSync {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Sync of {} dropped before completion; the authority never saw it",
                self.action
            );
        }
    }
}

impl fmt::Debug for PendingSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSync")
            .field("action", &self.action)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Tracked state, untracked state and history of one open map.
pub struct MapStore {
    map_id: MapId,
    remote: Arc<dyn RemoteAuthority>,
    tracked: TrackedMapState,
    untracked: UntrackedMapState,
    history: History<MapAction>,
    notify_tx: Sender<Notification>,
    notify_rx: Receiver<Notification>,
    sync_failures: Arc<AtomicUsize>,
}

impl MapStore {
    /// Create an empty store for `map_id` with default settings.
    pub fn new(map_id: MapId, remote: Arc<dyn RemoteAuthority>) -> Self {
        Self::with_config(map_id, remote, &EditorConfig::default())
    }

    pub fn with_config(map_id: MapId, remote: Arc<dyn RemoteAuthority>, config: &EditorConfig) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel();
        Self {
            map_id,
            remote,
            tracked: TrackedMapState::new(),
            untracked: UntrackedMapState::new(),
            history: History::new()
                .with_limit(config.history_limit)
                .with_require_reversible(config.require_reversible),
            notify_tx,
            notify_rx,
            sync_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn remote(&self) -> Arc<dyn RemoteAuthority> {
        Arc::clone(&self.remote)
    }

    pub fn tracked(&self) -> &TrackedMapState {
        &self.tracked
    }

    pub fn untracked(&self) -> &UntrackedMapState {
        &self.untracked
    }

    pub fn history(&self) -> &History<MapAction> {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn step(&self) -> usize {
        self.history.step()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Apply an action locally, record it and return its remote sync.
    ///
    /// The reverse is computed from the state before the action applies. When
    /// history refuses the action nothing is applied.
    pub fn execute_action(&mut self, action: impl Into<MapAction>) -> Result<PendingSync, StoreError> {
        let action = action.into();
        let reverse = action.reverse(&self.tracked);
        self.history.record(action.clone(), reverse)?;
        self.apply(&action);
        log::debug!("Executed {} (step {})", action.name(), self.history.step());
        Ok(self.sync(&action))
    }

    /// Undo the last applied action. `Ok(None)` when there is nothing to undo.
    ///
    /// The reverse action is persisted like any other action.
    pub fn undo(&mut self) -> Result<Option<PendingSync>, StoreError> {
        let Some(reverse) = self.history.undo()? else {
            return Ok(None);
        };
        self.apply(&reverse);
        log::debug!("Undo {} (step {})", reverse.name(), self.history.step());
        Ok(Some(self.sync(&reverse)))
    }

    /// Re-apply the next action of the redo tail. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<PendingSync> {
        let action = self.history.redo()?;
        self.apply(&action);
        log::debug!("Redo {} (step {})", action.name(), self.history.step());
        Some(self.sync(&action))
    }

    fn apply(&mut self, action: &MapAction) {
        let tracked = std::mem::take(&mut self.tracked);
        self.tracked = action.apply(tracked);
        self.untracked.selection.retain_existing(&self.tracked);
    }

    fn sync(&self, action: &MapAction) -> PendingSync {
        PendingSync::new(
            action,
            self.remote(),
            self.map_id,
            self.notify_tx.clone(),
            Arc::clone(&self.sync_failures),
        )
    }

    /// Install a document, resetting history and session state.
    ///
    /// The editor bounds are kept since they follow the host window.
    pub fn load(&mut self, tracked: TrackedMapState) -> Result<(), StoreError> {
        tracked.validate().map_err(StoreError::InvalidDocument)?;
        let editor_bounds = self.untracked.editor_bounds;
        self.tracked = tracked;
        self.untracked = UntrackedMapState {
            editor_bounds,
            ..UntrackedMapState::new()
        };
        self.history.clear();
        log::info!(
            "Loaded map {} with {} objects",
            self.map_id,
            self.tracked.object_count()
        );
        Ok(())
    }

    /// Fetch the map from the remote authority and load it.
    pub async fn load_from_remote(&mut self) -> Result<(), StoreError> {
        let remote = self.remote();
        let tracked = remote.load_map(self.map_id).await?;
        self.load(tracked)
    }

    /// Drop the open document.
    pub fn unload(&mut self) {
        self.tracked = TrackedMapState::new();
        self.untracked = UntrackedMapState {
            editor_bounds: self.untracked.editor_bounds,
            ..UntrackedMapState::new()
        };
        self.history.clear();
        log::info!("Unloaded map {}", self.map_id);
    }

    pub fn update_selected_layer(&mut self, layer: LayerName) {
        self.untracked.selected_layer = layer;
    }

    pub fn update_layer_visible(&mut self, layer: LayerName, visible: bool) {
        self.untracked.layer_mut(layer).visible = visible;
    }

    /// Set a layer's opacity, clamped to `0.0..=1.0`.
    pub fn update_layer_opacity(&mut self, layer: LayerName, opacity: f64) {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        self.untracked.layer_mut(layer).opacity = opacity;
    }

    pub fn set_boundary_edit_mode(&mut self, mode: BoundaryEditMode) {
        if self.untracked.boundary_edit_mode != mode {
            log::debug!("Boundary edit mode {:?} -> {:?}", self.untracked.boundary_edit_mode, mode);
        }
        self.untracked.boundary_edit_mode = mode;
    }

    pub fn set_editor_bounds(&mut self, bounds: Rect) {
        self.untracked.editor_bounds = bounds;
    }

    /// Detach every object from the transform handles.
    pub fn reset_selection(&mut self) {
        self.untracked.selection.clear();
    }

    /// Make `id` the only selected object. Unknown ids clear the selection.
    pub fn set_single_node_in_transformer(&mut self, id: ObjectId) {
        if self.tracked.contains_object(id) {
            self.untracked.selection.set_single(id);
        } else {
            self.untracked.selection.clear();
        }
    }

    /// Add objects to the selection, skipping unknown ids.
    pub fn add_nodes_to_transformer(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        let tracked = &self.tracked;
        self.untracked
            .selection
            .extend(ids.into_iter().filter(|id| tracked.contains_object(*id)));
    }

    /// Replace the selection with `ids`, in order.
    pub fn replace_selection(&mut self, ids: Vec<ObjectId>) {
        self.untracked.selection.replace(ids);
        self.untracked.selection.retain_existing(&self.tracked);
    }

    /// Install ids just collected from the tracked state, skipping the
    /// existence check. Runs on every rectangle-selection pointer move.
    pub(crate) fn install_selection(&mut self, ids: Vec<ObjectId>) {
        self.untracked.selection.replace(ids);
    }

    /// Currently selected objects, in selection order.
    pub fn selected_objects(&self) -> Vec<&ObjectState> {
        self.untracked.selection.selected_nodes(&self.tracked)
    }

    /// Queue a warning for the host.
    pub fn warn(&self, warning: EditorWarning) {
        log::warn!("Editor warning: {}", warning.translation_key());
        let _ = self.notify_tx.send(Notification::Warning(warning));
    }

    /// Take all pending notifications.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notify_rx.try_iter().collect()
    }

    /// Number of failed syncs since the last acknowledgement. Non-zero means
    /// local state may have diverged from the authority.
    pub fn unsynced_failures(&self) -> usize {
        self.sync_failures.load(Ordering::SeqCst)
    }

    /// Reset the failure count, returning its previous value.
    pub fn acknowledge_sync_failures(&self) -> usize {
        self.sync_failures.swap(0, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{
        CreateObjects, DeleteObjects, MoveObjects, MoveUpdate, TransformObjects, TransformUpdate,
        UpdateMapGeometry,
    };
    use crate::boundary::{square, MapGeometry};
    use crate::remote::{block_on, MemoryAuthority};

    const MAP: MapId = 1;

    fn setup() -> (MapStore, Arc<MemoryAuthority>) {
        let remote = Arc::new(MemoryAuthority::new());
        let initial = TrackedMapState::with_boundary(square());
        remote.insert_map(MAP, initial.clone());
        let mut store = MapStore::new(MAP, remote.clone());
        store.load(initial).unwrap();
        (store, remote)
    }

    fn plant(x: f64, y: f64) -> ObjectState {
        ObjectState::new(LayerName::Plant, "plant", x, y, 10.0, 10.0)
    }

    fn run(sync: PendingSync) {
        block_on(sync).unwrap();
    }

    fn add(store: &mut MapStore, object: &ObjectState) {
        run(store.execute_action(CreateObjects::single(object.clone())).unwrap());
    }

    #[test]
    fn test_fresh_store_cannot_undo_or_redo() {
        let remote = Arc::new(MemoryAuthority::new());
        let store = MapStore::new(MAP, remote);
        assert!(!store.can_undo());
        assert!(!store.can_redo());
    }

    #[test]
    fn test_execute_applies_and_persists() {
        let (mut store, remote) = setup();
        let object = plant(0.0, 0.0);
        add(&mut store, &object);

        assert!(store.tracked().contains_object(object.id));
        assert!(remote.snapshot(MAP).unwrap().contains_object(object.id));
        assert_eq!(store.step(), 1);
        assert!(store.can_undo());
    }

    #[test]
    fn test_n_actions_then_n_undos_restores_initial() {
        let (mut store, _) = setup();
        let initial = store.tracked().clone();
        let a = plant(0.0, 0.0);
        let b = plant(50.0, 0.0);

        add(&mut store, &a);
        add(&mut store, &b);
        run(store
            .execute_action(MoveObjects::new(
                LayerName::Plant,
                vec![MoveUpdate::new(a.id, 5.0, 5.0)],
            ))
            .unwrap());
        run(store
            .execute_action(DeleteObjects::new(LayerName::Plant, vec![b.id]))
            .unwrap());

        for _ in 0..4 {
            run(store.undo().unwrap().unwrap());
        }
        assert_eq!(store.tracked(), &initial);
        assert!(!store.can_undo());
        assert!(store.can_redo());
    }

    #[test]
    fn test_undo_then_redo_is_noop() {
        let (mut store, _) = setup();
        add(&mut store, &plant(0.0, 0.0));
        add(&mut store, &plant(1.0, 1.0));
        let before = store.tracked().clone();

        run(store.undo().unwrap().unwrap());
        run(store.redo().unwrap());
        assert_eq!(store.tracked(), &before);
        assert_eq!(store.step(), 2);
    }

    #[test]
    fn test_undo_redo_noop_at_every_position() {
        let (mut store, remote) = setup();
        let initial = store.tracked().clone();
        let a = plant(0.0, 0.0);
        let b = plant(30.0, 0.0);

        run(store
            .execute_action(CreateObjects::new(LayerName::Plant, vec![a.clone(), b.clone()]))
            .unwrap());
        run(store
            .execute_action(MoveObjects::new(
                LayerName::Plant,
                vec![MoveUpdate::new(a.id, 5.0, 5.0)],
            ))
            .unwrap());
        let turned = TransformUpdate {
            rotation: 45.0,
            scale_x: 2.0,
            ..TransformUpdate::capture(&b)
        };
        run(store
            .execute_action(TransformObjects::new(LayerName::Plant, vec![turned]))
            .unwrap());
        run(store
            .execute_action(DeleteObjects::new(LayerName::Plant, vec![a.id]))
            .unwrap());
        let grown = MapGeometry::rectangle(Rect::new(0.0, 0.0, 20.0, 20.0));
        run(store.execute_action(UpdateMapGeometry::new(grown)).unwrap());
        assert_eq!(store.history_len(), 5);

        for step in (1..=5).rev() {
            assert_eq!(store.step(), step);
            let before = store.tracked().clone();

            run(store.undo().unwrap().unwrap());
            run(store.redo().unwrap());
            assert_eq!(store.tracked(), &before, "undo then redo changed the map at step {}", step);
            assert_eq!(store.step(), step);
            assert_eq!(
                remote.snapshot(MAP).unwrap().object_count(),
                before.object_count()
            );

            run(store.undo().unwrap().unwrap());
        }
        assert!(!store.can_undo());
        assert_eq!(store.tracked(), &initial);
    }

    #[test]
    fn test_batched_move_is_one_entry() {
        let (mut store, _) = setup();
        let objects: Vec<_> = (0..3).map(|i| plant(i as f64 * 20.0, 0.0)).collect();
        run(store
            .execute_action(CreateObjects::new(LayerName::Plant, objects.clone()))
            .unwrap());
        let before = store.tracked().clone();

        let updates = objects
            .iter()
            .map(|o| MoveUpdate::new(o.id, o.x + 10.0, o.y + 10.0))
            .collect();
        run(store.execute_action(MoveObjects::new(LayerName::Plant, updates)).unwrap());
        assert_eq!(store.history_len(), 2);

        run(store.undo().unwrap().unwrap());
        assert_eq!(store.tracked(), &before);
    }

    #[test]
    fn test_irreversible_action_not_applied() {
        let remote = Arc::new(MemoryAuthority::new());
        let mut store = MapStore::new(MAP, remote);

        // No boundary yet, so setting one has no inverse.
        let result = store.execute_action(UpdateMapGeometry::new(square()));
        assert!(matches!(
            result,
            Err(StoreError::History(HistoryError::NotReversible { .. }))
        ));
        assert!(store.tracked().boundary.is_none());
        assert!(!store.can_undo());
    }

    #[test]
    fn test_sync_failure_keeps_local_state() {
        let (mut store, remote) = setup();
        remote.set_offline(true);
        let object = plant(0.0, 0.0);

        let sync = store.execute_action(CreateObjects::single(object.clone())).unwrap();
        assert!(matches!(block_on(sync), Err(RemoteError::Unavailable(_))));

        assert!(store.tracked().contains_object(object.id));
        assert_eq!(store.unsynced_failures(), 1);
        let notifications = store.drain_notifications();
        assert!(matches!(
            notifications.as_slice(),
            [Notification::SyncFailed {
                action: "CreateObjects",
                ..
            }]
        ));
        assert_eq!(store.acknowledge_sync_failures(), 1);
        assert_eq!(store.unsynced_failures(), 0);
    }

    #[test]
    fn test_undo_persists_remotely() {
        let (mut store, remote) = setup();
        let object = plant(0.0, 0.0);
        add(&mut store, &object);

        let sync = store.undo().unwrap().unwrap();
        block_on(sync).unwrap();
        assert!(!remote.snapshot(MAP).unwrap().contains_object(object.id));
    }

    #[test]
    fn test_delete_prunes_selection() {
        let (mut store, _) = setup();
        let a = plant(0.0, 0.0);
        let b = plant(20.0, 0.0);
        add(&mut store, &a);
        add(&mut store, &b);
        store.add_nodes_to_transformer([a.id, b.id]);
        assert_eq!(store.selected_objects().len(), 2);

        run(store
            .execute_action(DeleteObjects::new(LayerName::Plant, vec![a.id]))
            .unwrap());
        assert_eq!(store.untracked().selection.ids(), &[b.id]);
    }

    #[test]
    fn test_sync_reports_finished() {
        let (mut store, remote) = setup();
        let object = plant(0.0, 0.0);
        let mut sync = store.execute_action(CreateObjects::single(object.clone())).unwrap();
        assert_eq!(sync.action(), "CreateObjects");
        assert!(!sync.is_finished());

        block_on(&mut sync).unwrap();
        assert!(sync.is_finished());
        assert!(remote.snapshot(MAP).unwrap().contains_object(object.id));
    }

    #[test]
    fn test_dropped_sync_never_reaches_authority() {
        let (mut store, remote) = setup();
        let object = plant(0.0, 0.0);
        drop(store.execute_action(CreateObjects::single(object.clone())).unwrap());

        assert!(store.tracked().contains_object(object.id));
        assert!(!remote.snapshot(MAP).unwrap().contains_object(object.id));
        assert_eq!(store.unsynced_failures(), 0);
    }

    #[test]
    fn test_selection_ignores_unknown_ids() {
        let (mut store, _) = setup();
        store.set_single_node_in_transformer(ObjectId::new_v4());
        assert!(store.untracked().selection.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_document() {
        let (mut store, _) = setup();
        let mut open = square();
        open.rings[0].pop();
        let result = store.load(TrackedMapState::with_boundary(open));
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[test]
    fn test_load_from_remote_resets_history() {
        let (mut store, remote) = setup();
        add(&mut store, &plant(0.0, 0.0));
        store.set_boundary_edit_mode(BoundaryEditMode::Add);

        block_on(store.load_from_remote()).unwrap();
        assert_eq!(store.tracked(), &remote.snapshot(MAP).unwrap());
        assert!(!store.can_undo());
        assert_eq!(store.untracked().boundary_edit_mode, BoundaryEditMode::None);
    }

    #[test]
    fn test_layer_opacity_clamped() {
        let (mut store, _) = setup();
        store.update_layer_opacity(LayerName::Base, 1.7);
        assert_eq!(store.untracked().layers[&LayerName::Base].opacity, 1.0);
        store.update_layer_opacity(LayerName::Base, -0.5);
        assert_eq!(store.untracked().layers[&LayerName::Base].opacity, 0.0);
    }

    #[test]
    fn test_warning_notification() {
        let (mut store, _) = setup();
        store.warn(EditorWarning::VertexRemovalForbidden);
        assert_eq!(
            store.drain_notifications(),
            vec![Notification::Warning(EditorWarning::VertexRemovalForbidden)]
        );
        assert!(store.drain_notifications().is_empty());
    }

    #[test]
    fn test_unload() {
        let (mut store, _) = setup();
        add(&mut store, &plant(0.0, 0.0));
        store.unload();
        assert_eq!(store.tracked().object_count(), 0);
        assert!(store.tracked().boundary.is_none());
        assert!(!store.can_undo());
    }
}
