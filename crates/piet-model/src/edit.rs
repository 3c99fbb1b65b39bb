//! Checkpoint / cancel protocol shared by every edit-tracked entity.
//!
//! An entity is either *clean* (no snapshot held) or *dirty* (holding the value it had before
//! its first edit since the last checkpoint). The transition into the dirty state is the only
//! moment a snapshot is captured; `checkpoint` accepts the current value as the new baseline and
//! `cancel` hands the snapshot back so the owner can restore it. Both are no-ops while clean.

use crate::error::PietResult;
use crate::events::{EditListener, SubscriptionId};

/// Entities taking part in the checkpoint protocol.
pub trait Editable {
    fn is_dirty(&self) -> bool;

    /// Accept the current state as the new baseline. Fires `EditNotice::Checkpoint` when dirty.
    fn checkpoint_edits(&mut self) -> PietResult<()>;

    /// Restore the state held at the first edit. Fires `EditNotice::Cancel` when dirty.
    fn cancel_edits(&mut self) -> PietResult<()>;

    fn subscribe_edits(&mut self, listener: Box<EditListener>) -> SubscriptionId;

    fn unsubscribe_edits(&mut self, id: SubscriptionId) -> bool;
}

#[derive(Clone, Debug)]
pub struct EditTracker<S> {
    checkpoint: Option<S>,
}

impl<S> EditTracker<S> {
    pub fn new() -> Self {
        Self { checkpoint: None }
    }

    pub fn is_dirty(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub fn snapshot(&self) -> Option<&S> {
        self.checkpoint.as_ref()
    }

    /// Record an edit. `snapshot` is only evaluated on the clean -> dirty transition.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn begin_with(&mut self, snapshot: impl FnOnce() -> S) -> bool {
        if self.checkpoint.is_some() {
            return false;
        }
        self.checkpoint = Some(snapshot());
        true
    }

    /// Returns `true` when a snapshot was discarded.
    pub fn checkpoint(&mut self) -> bool {
        self.checkpoint.take().is_some()
    }

    pub fn cancel(&mut self) -> Option<S> {
        self.checkpoint.take()
    }

    /// Undo a `begin_with` whose edit was subsequently aborted.
    pub(crate) fn abandon(&mut self) {
        self.checkpoint = None;
    }
}

impl<S> Default for EditTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_edit_captures_snapshot_once() {
        let mut tracker = EditTracker::new();
        assert!(!tracker.is_dirty());

        assert!(tracker.begin_with(|| 1));
        assert!(tracker.is_dirty());
        assert!(!tracker.begin_with(|| panic!("snapshot must not be re-captured")));
        assert_eq!(tracker.snapshot(), Some(&1));
    }

    #[test]
    fn cancel_returns_snapshot_and_cleans() {
        let mut tracker = EditTracker::new();
        tracker.begin_with(|| "before".to_string());
        assert_eq!(tracker.cancel().as_deref(), Some("before"));
        assert!(!tracker.is_dirty());
        assert_eq!(tracker.cancel(), None);
    }

    #[test]
    fn checkpoint_is_noop_when_clean() {
        let mut tracker: EditTracker<u8> = EditTracker::new();
        assert!(!tracker.checkpoint());
        tracker.begin_with(|| 3);
        assert!(tracker.checkpoint());
        assert!(!tracker.is_dirty());
    }
}
