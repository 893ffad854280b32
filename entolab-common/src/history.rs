//! Bounded undo/redo history for annotation editing
//!
//! Command-history container used by annotation sessions: a snapshot of the
//! detection set is recorded before each mutating operation, and undo/redo
//! step between snapshots. The past stack is capped; recording while full
//! drops the oldest snapshot. Any new recording discards the redo stack.

use std::collections::VecDeque;

/// Default snapshot cap for annotation sessions
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// Bounded history of prior snapshots with a redo stack.
///
/// # Examples
///
/// ```
/// use entolab_common::History;
///
/// let mut history: History<Vec<u32>> = History::new(10);
/// let mut current = vec![1];
///
/// // Mutate: record the previous state first
/// history.record(current.clone());
/// current = vec![1, 2];
///
/// // Undo restores the prior snapshot and remembers the current one
/// current = history.undo(current).unwrap();
/// assert_eq!(current, vec![1]);
///
/// // Redo steps forward again
/// current = history.redo(current).unwrap();
/// assert_eq!(current, vec![1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct History<T> {
    past: VecDeque<T>,
    future: Vec<T>,
    cap: usize,
}

impl<T> History<T> {
    /// Create a history bounded to `cap` past snapshots
    pub fn new(cap: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(cap.min(64)),
            future: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Record the state as it was before a mutating operation.
    ///
    /// Discards the redo stack; when the past stack is full, the oldest
    /// snapshot is dropped.
    pub fn record(&mut self, prev: T) {
        if self.past.len() == self.cap {
            self.past.pop_front();
        }
        self.past.push_back(prev);
        self.future.clear();
    }

    /// Step back one snapshot, remembering `current` for redo.
    ///
    /// Returns `None` (leaving `current` untouched conceptually — the caller
    /// keeps it) when there is nothing to undo.
    pub fn undo(&mut self, current: T) -> Option<T> {
        match self.past.pop_back() {
            Some(snapshot) => {
                self.future.push(current);
                Some(snapshot)
            }
            None => None,
        }
    }

    /// Step forward one snapshot, remembering `current` for undo.
    pub fn redo(&mut self, current: T) -> Option<T> {
        match self.future.pop() {
            Some(snapshot) => {
                self.past.push_back(current);
                Some(snapshot)
            }
            None => None,
        }
    }

    /// Whether an undo step is available
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Whether a redo step is available
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of past snapshots currently held
    pub fn depth(&self) -> usize {
        self.past.len()
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_restores_prior_snapshot() {
        let mut history: History<i32> = History::new(10);
        history.record(1);
        history.record(2);

        assert_eq!(history.undo(3), Some(2));
        assert_eq!(history.undo(2), Some(1));
        assert_eq!(history.undo(1), None);
    }

    #[test]
    fn test_redo_inverts_undo() {
        let mut history: History<i32> = History::new(10);
        history.record(1);
        history.record(2);

        let back = history.undo(3).unwrap();
        assert_eq!(back, 2);
        assert_eq!(history.redo(back), Some(3));

        // Redo stack exhausted
        assert_eq!(history.redo(3), None);
    }

    #[test]
    fn test_record_discards_redo_stack() {
        let mut history: History<i32> = History::new(10);
        history.record(1);
        history.record(2);

        let back = history.undo(3).unwrap();
        assert!(history.can_redo());

        // New mutation after an undo: the future is gone
        history.record(back);
        assert!(!history.can_redo());
        assert_eq!(history.redo(99), None);
    }

    #[test]
    fn test_cap_drops_oldest_snapshot() {
        let mut history: History<i32> = History::new(3);
        for i in 0..5 {
            history.record(i);
        }
        assert_eq!(history.depth(), 3);

        // Oldest snapshots (0, 1) were dropped; undo bottoms out at 2
        assert_eq!(history.undo(5), Some(4));
        assert_eq!(history.undo(4), Some(3));
        assert_eq!(history.undo(3), Some(2));
        assert_eq!(history.undo(2), None);
    }

    #[test]
    fn test_undo_redo_interleaving() {
        let mut history: History<&str> = History::new(10);
        history.record("a");
        history.record("b");

        let cur = history.undo("c").unwrap(); // back to "b"
        let cur = history.undo(cur).unwrap(); // back to "a"
        assert_eq!(cur, "a");

        let cur = history.redo(cur).unwrap(); // forward to "b"
        assert_eq!(cur, "b");
        let cur = history.redo(cur).unwrap(); // forward to "c"
        assert_eq!(cur, "c");
        assert!(!history.can_redo());
        assert_eq!(history.depth(), 2);
    }

    #[test]
    fn test_zero_cap_clamped_to_one() {
        let mut history: History<i32> = History::new(0);
        history.record(1);
        history.record(2);
        assert_eq!(history.depth(), 1);
        assert_eq!(history.undo(3), Some(2));
    }
}
