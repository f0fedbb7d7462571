//! One migratable repository and its lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`WorkItem`].
///
/// Allowed transitions:
/// `Pending → InProgress → {Migrated | Pending (retry) | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Migrated,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Migrated | ItemStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::InProgress)
                | (ItemStatus::InProgress, ItemStatus::Migrated)
                | (ItemStatus::InProgress, ItemStatus::Pending)
                | (ItemStatus::InProgress, ItemStatus::Failed)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Migrated => "migrated",
            ItemStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A repository to move from the source platform to the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub source_ref: String,
    pub target_ref: String,
    pub status: ItemStatus,
    pub last_error: Option<String>,
    pub attempt_count: u32,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        source_ref: impl Into<String>,
        target_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
            status: ItemStatus::Pending,
            last_error: None,
            attempt_count: 0,
        }
    }

    /// Start an attempt. Returns `false` (and leaves the item untouched) if
    /// the item is not `Pending`.
    pub(crate) fn begin_attempt(&mut self) -> bool {
        if !self.status.can_transition_to(ItemStatus::InProgress) {
            return false;
        }
        self.status = ItemStatus::InProgress;
        self.attempt_count += 1;
        true
    }

    /// Put an item left `Failed` or `InProgress` by an earlier run back in
    /// the queue. `Migrated` items stay as they are.
    pub(crate) fn requeue(&mut self) {
        if matches!(self.status, ItemStatus::Failed | ItemStatus::InProgress) {
            self.status = ItemStatus::Pending;
        }
    }

    pub(crate) fn mark_migrated(&mut self) {
        self.status = ItemStatus::Migrated;
        self.last_error = None;
    }

    /// Record a failed attempt. `exhausted` selects between the terminal
    /// `Failed` state and going back to `Pending` for the next retry round.
    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>, exhausted: bool) {
        self.last_error = Some(reason.into());
        self.status = if exhausted {
            ItemStatus::Failed
        } else {
            ItemStatus::Pending
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use ItemStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Migrated));
        assert!(InProgress.can_transition_to(Pending));
        assert!(InProgress.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Migrated));
        assert!(!Migrated.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_attempt_bookkeeping() {
        let mut item = WorkItem::new("1", "proj/repo", "org/repo");
        assert!(item.begin_attempt());
        assert!(!item.begin_attempt(), "already in progress");
        item.mark_failed("exit status 1", false);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempt_count, 1);

        assert!(item.begin_attempt());
        item.mark_migrated();
        assert_eq!(item.status, ItemStatus::Migrated);
        assert_eq!(item.attempt_count, 2);
        assert!(item.last_error.is_none());
        assert!(!item.begin_attempt(), "migrated is terminal");
    }
}
