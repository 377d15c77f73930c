//! Scoped keyboard shortcuts.
//!
//! Shortcuts are lowercase strings with modifiers first, e.g. `ctrl+shift+z`.

use crate::input::Modifiers;
use crate::state::LayerName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

/// Built-in key binding table.
pub const DEFAULT_KEYBINDINGS_JSON: &str = include_str!("keybindings.json");

#[derive(Debug, Error)]
pub enum KeyBindingError {
    #[error("Failed to parse key bindings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read key bindings: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a binding applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBindingScope {
    Global,
    PlantsLayer,
    BaseLayer,
}

impl KeyBindingScope {
    /// Layer-specific scope for the active layer, if it has one.
    pub fn for_layer(layer: LayerName) -> Option<Self> {
        match layer {
            LayerName::Plant => Some(KeyBindingScope::PlantsLayer),
            LayerName::Base => Some(KeyBindingScope::BaseLayer),
            _ => None,
        }
    }
}

/// Commands a shortcut can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorCommand {
    Undo,
    Redo,
    Deselect,
    DeleteSelection,
    BoundaryModeAdd,
    BoundaryModeMove,
    BoundaryModeRemove,
    BoundaryModeNone,
}

/// Shortcut table: scope -> command -> shortcuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyBindings {
    scopes: HashMap<KeyBindingScope, BTreeMap<EditorCommand, Vec<String>>>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        match Self::from_json(DEFAULT_KEYBINDINGS_JSON) {
            Ok(bindings) => bindings,
            Err(e) => {
                log::error!("Built-in key bindings are invalid: {}", e);
                Self {
                    scopes: HashMap::new(),
                }
            }
        }
    }
}

impl KeyBindings {
    pub fn from_json(json: &str) -> Result<Self, KeyBindingError> {
        let mut bindings: Self = serde_json::from_str(json)?;
        for commands in bindings.scopes.values_mut() {
            for shortcuts in commands.values_mut() {
                for shortcut in shortcuts.iter_mut() {
                    *shortcut = normalize_shortcut(shortcut);
                }
            }
        }
        Ok(bindings)
    }

    pub fn from_file(path: &Path) -> Result<Self, KeyBindingError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, KeyBindingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Command bound to `shortcut` in `scope`.
    pub fn action_for_shortcut(&self, scope: KeyBindingScope, shortcut: &str) -> Option<EditorCommand> {
        self.scopes.get(&scope)?.iter().find_map(|(command, shortcuts)| {
            shortcuts
                .iter()
                .any(|s| s == shortcut)
                .then_some(*command)
        })
    }

    /// Shortcuts bound to `command` in `scope`.
    pub fn shortcuts_for_action(&self, scope: KeyBindingScope, command: EditorCommand) -> &[String] {
        self.scopes
            .get(&scope)
            .and_then(|commands| commands.get(&command))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up `shortcut` in the active layer's scope, then in the global scope.
    pub fn resolve(&self, layer: LayerName, shortcut: &str) -> Option<EditorCommand> {
        KeyBindingScope::for_layer(layer)
            .and_then(|scope| self.action_for_shortcut(scope, shortcut))
            .or_else(|| self.action_for_shortcut(KeyBindingScope::Global, shortcut))
    }
}

/// Build a shortcut string such as `ctrl+shift+z` from a key and modifiers.
pub fn shortcut_from_key(key: &str, modifiers: Modifiers) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(5);
    if modifiers.ctrl {
        parts.push("ctrl");
    }
    if modifiers.alt {
        parts.push("alt");
    }
    if modifiers.shift {
        parts.push("shift");
    }
    if modifiers.meta {
        parts.push("meta");
    }
    let key = key.to_lowercase();
    if !key.is_empty() {
        parts.push(&key);
    }
    parts.join("+")
}

/// Canonical form of a written shortcut: `Shift+Ctrl+Z` becomes `ctrl+shift+z`.
pub fn normalize_shortcut(shortcut: &str) -> String {
    let mut modifiers = Modifiers::none();
    let mut key = String::new();
    for part in shortcut.split('+').map(str::trim).filter(|p| !p.is_empty()) {
        match part.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "alt" | "option" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "meta" | "cmd" | "super" => modifiers.meta = true,
            other => key = other.to_string(),
        }
    }
    shortcut_from_key(&key, modifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings_parse() {
        let bindings = KeyBindings::default();
        assert_eq!(
            bindings.action_for_shortcut(KeyBindingScope::Global, "ctrl+z"),
            Some(EditorCommand::Undo)
        );
        assert_eq!(
            bindings.shortcuts_for_action(KeyBindingScope::Global, EditorCommand::Redo),
            &["ctrl+y".to_string(), "ctrl+shift+z".to_string()]
        );
    }

    #[test]
    fn test_unknown_shortcut() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.action_for_shortcut(KeyBindingScope::Global, "ctrl+q"), None);
        assert!(bindings
            .shortcuts_for_action(KeyBindingScope::PlantsLayer, EditorCommand::Undo)
            .is_empty());
    }

    #[test]
    fn test_layer_scope_wins_over_global() {
        let bindings = KeyBindings::default();
        assert_eq!(
            bindings.resolve(LayerName::Base, "escape"),
            Some(EditorCommand::BoundaryModeNone)
        );
        assert_eq!(bindings.resolve(LayerName::Plant, "escape"), Some(EditorCommand::Deselect));
        assert_eq!(bindings.resolve(LayerName::Trees, "escape"), Some(EditorCommand::Deselect));
        assert_eq!(bindings.resolve(LayerName::Trees, "ctrl+z"), Some(EditorCommand::Undo));
    }

    #[test]
    fn test_shortcut_from_key() {
        let modifiers = Modifiers {
            ctrl: true,
            shift: true,
            ..Modifiers::default()
        };
        assert_eq!(shortcut_from_key("Z", modifiers), "ctrl+shift+z");
        assert_eq!(shortcut_from_key("Escape", Modifiers::none()), "escape");
    }

    #[test]
    fn test_custom_bindings_are_normalized() {
        let json = r#"{ "global": { "undo": ["Ctrl+U"] } }"#;
        let bindings = KeyBindings::from_json(json).unwrap();
        assert_eq!(
            bindings.action_for_shortcut(KeyBindingScope::Global, "ctrl+u"),
            Some(EditorCommand::Undo)
        );
    }

    #[test]
    fn test_out_of_order_modifiers_are_normalized() {
        let json = r#"{ "global": { "redo": ["Shift+Ctrl+Z", "cmd + y"] } }"#;
        let bindings = KeyBindings::from_json(json).unwrap();
        assert_eq!(bindings.resolve(LayerName::Trees, "ctrl+shift+z"), Some(EditorCommand::Redo));
        assert_eq!(bindings.resolve(LayerName::Trees, "meta+y"), Some(EditorCommand::Redo));
    }

    #[test]
    fn test_normalize_shortcut() {
        assert_eq!(normalize_shortcut("Alt+Meta+Shift+Ctrl+K"), "ctrl+alt+shift+meta+k");
        assert_eq!(normalize_shortcut("Delete"), "delete");
        assert_eq!(normalize_shortcut("Shift"), "shift");
    }

    #[test]
    fn test_invalid_bindings() {
        let result = KeyBindings::from_json(r#"{ "global": { "fly": ["f"] } }"#);
        assert!(matches!(result, Err(KeyBindingError::Parse(_))));
    }
}
