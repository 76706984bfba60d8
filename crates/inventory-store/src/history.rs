use std::collections::VecDeque;

use crate::state::{Action, DeviceCollection, Effect, StateCore};

pub const DEFAULT_HISTORY_LIMIT: usize = 30;

/// Undo/redo over full collection snapshots, wrapping any [`StateCore`].
///
/// Every dispatch that changes state is a checkpoint. At most `limit` checkpoints are kept; the
/// oldest is evicted first. A new checkpoint clears the redo stack.
pub struct History<S> {
    inner: S,
    past: VecDeque<DeviceCollection>,
    future: Vec<DeviceCollection>,
    limit: usize,
}

impl<S: StateCore> History<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self {
            inner,
            past: VecDeque::new(),
            future: Vec::new(),
            limit,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    /// Restore the previous snapshot. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = self.inner.state().clone();
        self.future.push(current);
        self.inner.replace(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = self.inner.state().clone();
        self.past.push_back(current);
        self.inner.replace(next);
        true
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

impl<S: StateCore> StateCore for History<S> {
    fn state(&self) -> &DeviceCollection {
        self.inner.state()
    }

    fn dispatch(&mut self, action: Action) -> Option<Effect> {
        let before = self.inner.state().clone();
        let effect = self.inner.dispatch(action)?;
        if self.limit > 0 {
            self.past.push_back(before);
            while self.past.len() > self.limit {
                self.past.pop_front();
            }
        }
        self.future.clear();
        Some(effect)
    }

    /// Replacing from outside (rehydration) starts a fresh history.
    fn replace(&mut self, state: DeviceCollection) {
        self.inner.replace(state);
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_default(names: &[&str]) -> Action {
        Action::SetDefaultVisibleSheets(names.iter().map(|s| s.to_string()).collect())
    }

    fn defaults(history: &History<DeviceCollection>) -> Vec<String> {
        history.state().default_visible_sheets.clone()
    }

    #[test]
    fn undo_and_redo_walk_snapshots() {
        let mut history = History::new(DeviceCollection::default(), 30);
        history.dispatch(set_default(&["a"]));
        history.dispatch(set_default(&["b"]));

        assert!(history.undo());
        assert_eq!(defaults(&history), vec!["a"]);
        assert!(history.undo());
        assert!(defaults(&history).is_empty());
        assert!(!history.undo());
        assert!(defaults(&history).is_empty());

        assert!(history.redo());
        assert!(history.redo());
        assert_eq!(defaults(&history), vec!["b"]);
        assert!(!history.redo());
    }

    #[test]
    fn oldest_checkpoint_is_evicted() {
        let mut history = History::new(DeviceCollection::default(), 2);
        for name in ["a", "b", "c"] {
            history.dispatch(set_default(&[name]));
        }
        assert_eq!(history.undo_depth(), 2);
        assert!(history.undo());
        assert!(history.undo());
        assert!(!history.undo());
        assert_eq!(defaults(&history), vec!["a"]);
    }

    #[test]
    fn new_checkpoint_clears_redo_and_no_ops_are_not_recorded() {
        let mut history = History::new(DeviceCollection::default(), 30);
        history.dispatch(set_default(&["a"]));
        history.undo();
        assert!(history.can_redo());

        assert_eq!(history.dispatch(Action::Remove("missing".into())), None);
        assert!(history.can_redo());
        assert!(!history.can_undo());

        history.dispatch(set_default(&["b"]));
        assert!(!history.can_redo());
    }
}
