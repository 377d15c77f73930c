//! Map planning editor core.
//!
//! Document state, invertible actions, undo/redo history and the interactive
//! editors (boundary polygon, rectangle selection, viewport) of a layered map.

pub mod action;
pub mod boundary;
pub mod config;
pub mod editor;
pub mod history;
pub mod input;
pub mod keybindings;
pub mod remote;
pub mod selection;
pub mod state;
pub mod store;
pub mod viewport;

pub use action::{Action, ActionReceipt, MapAction};
pub use boundary::{BoundaryEditMode, BoundaryEditor, BoundaryError, MapGeometry};
pub use config::{ConfigError, EditorConfig};
pub use editor::{HitTarget, MapEditor};
pub use history::{History, HistoryError};
pub use input::{InputState, KeyEvent, Modifiers, MouseButton, PointerEvent};
pub use keybindings::{EditorCommand, KeyBindingScope, KeyBindings};
pub use remote::{FileAuthority, HttpAuthority, MemoryAuthority, ObjectUpdate, RemoteAuthority, RemoteError, RemoteResult};
pub use selection::{SelectionEngine, SelectionHandleSet, TransformGesture};
pub use state::{LayerName, MapId, ObjectId, ObjectState, TrackedMapState, UntrackedMapState};
pub use store::{EditorWarning, MapStore, Notification, PendingSync, StoreError};
pub use viewport::Viewport;
