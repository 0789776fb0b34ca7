//! Progress event stream consumed by the UI collaborator (`spec.md` §6).

use serde::{Deserialize, Serialize};

/// Stage of the run a [`ProgressEvent`] was emitted from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Scanning source and destination trees.
    Scanning,
    /// Diffing trees into an operation list.
    Planning,
    /// Executing copy/move/delete operations.
    Copying,
    /// Re-hashing a destination file to confirm a copy.
    Verifying,
    /// Writing snapshot/index/summary artifacts.
    Finalizing,
    /// Reversing committed journal entries.
    RollingBack,
}

/// One progress update, rate-limited by the executor to at most 10/s
/// (`spec.md` §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Name of the job this event belongs to.
    pub job: String,
    /// Operations completed so far.
    pub done: u64,
    /// Total operations planned for this run.
    pub total: u64,
    /// Bytes transferred so far.
    pub bytes_done: u64,
    /// Total bytes expected to be transferred.
    pub bytes_total: u64,
    /// Relative path of the entry most recently completed.
    pub current_rel: String,
    /// Stage the run is currently in.
    pub phase: Phase,
}

impl ProgressEvent {
    /// Reports whether this event represents the terminal state of a
    /// successful run (`done == total`, `spec.md` §8 property 9).
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_complete_when_done_reaches_total() {
        let event = ProgressEvent {
            job: "demo".into(),
            done: 5,
            total: 5,
            bytes_done: 0,
            bytes_total: 0,
            current_rel: "a.txt".into(),
            phase: Phase::Copying,
        };
        assert!(event.is_complete());
    }

    #[test]
    fn is_not_complete_before_done_reaches_total() {
        let event = ProgressEvent {
            job: "demo".into(),
            done: 4,
            total: 5,
            bytes_done: 0,
            bytes_total: 0,
            current_rel: "a.txt".into(),
            phase: Phase::Copying,
        };
        assert!(!event.is_complete());
    }
}
