//! Linear undo/redo history over recorded actions.

use crate::action::Action;
use thiserror::Error;

/// History consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The entry below the cursor has no inverse. This is a programming error:
    /// such an entry should never have been recorded.
    #[error("History entry {step} has no reverse action")]
    Irreversible { step: usize },
    #[error("Refusing to record irreversible action {action}")]
    NotReversible { action: &'static str },
}

/// A recorded action with its eagerly computed inverse.
#[derive(Debug, Clone)]
pub struct HistoryEntry<A> {
    pub action: A,
    pub reverse: Option<A>,
}

/// Ordered action log with a cursor.
///
/// Entries `0..step` are applied; `step..len` form the redo tail.
#[derive(Debug, Clone)]
pub struct History<A> {
    entries: Vec<HistoryEntry<A>>,
    step: usize,
    limit: Option<usize>,
    require_reversible: bool,
}

impl<A> Default for History<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> History<A> {
    /// Unbounded history that only accepts reversible actions.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            step: 0,
            limit: None,
            require_reversible: true,
        }
    }

    /// Keep at most `limit` entries, dropping the oldest.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.map(|l| l.max(1));
        self
    }

    /// Whether `record` refuses actions without an inverse.
    pub fn with_require_reversible(mut self, require: bool) -> Self {
        self.require_reversible = require;
        self
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.step > 0
    }

    pub fn can_redo(&self) -> bool {
        self.step < self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry<A>] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.step = 0;
    }
}

impl<A: Action + Clone> History<A> {
    /// Record an action after the cursor, discarding the redo tail.
    pub fn record(&mut self, action: A, reverse: Option<A>) -> Result<(), HistoryError> {
        if reverse.is_none() && self.require_reversible {
            return Err(HistoryError::NotReversible {
                action: action.name(),
            });
        }

        self.entries.truncate(self.step);
        self.entries.push(HistoryEntry { action, reverse });
        self.step = self.entries.len();

        if let Some(limit) = self.limit {
            if self.entries.len() > limit {
                let excess = self.entries.len() - limit;
                self.entries.drain(..excess);
                self.step = self.step.saturating_sub(excess);
            }
        }
        Ok(())
    }

    /// Step back, returning the action that undoes the last applied entry.
    ///
    /// `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<A>, HistoryError> {
        if self.step == 0 {
            return Ok(None);
        }
        let entry = &self.entries[self.step - 1];
        match &entry.reverse {
            Some(reverse) => {
                let reverse = reverse.clone();
                self.step -= 1;
                Ok(Some(reverse))
            }
            None => {
                log::error!(
                    "Cannot undo {} at step {}: no reverse action was recorded",
                    entry.action.name(),
                    self.step
                );
                Err(HistoryError::Irreversible { step: self.step })
            }
        }
    }

    /// Step forward, returning the action to re-apply.
    ///
    /// `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<A> {
        let entry = self.entries.get(self.step)?;
        let action = entry.action.clone();
        self.step += 1;
        Some(action)
    }
}
