//! Durable journal record shape, written and read by `dsp-journal`.

use serde::{Deserialize, Serialize};

use crate::operation::OpId;

/// Lifecycle state of one [`JournalEntry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The planner emitted this operation but execution has not started.
    Planned,
    /// A worker has begun executing the operation.
    Started,
    /// The operation completed and its effect is visible in the destination.
    Committed,
    /// The operation failed after exhausting retries.
    Failed,
    /// The operation was not attempted (e.g. cancellation) or abandoned after failure.
    Skipped,
}

/// Information recorded alongside a committed destructive operation so it
/// can be reversed (`spec.md` §3 invariant: "sufficient information to
/// reverse it").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoInfo {
    /// No reversal information is needed (non-destructive operation).
    None,
    /// A pre-existing file was moved aside to this backup path before the
    /// new content replaced it.
    BackupPath(String),
    /// The entry was relocated to this SafetyNet path.
    SafetyNetPath(String),
}

/// One append-only record describing the lifecycle of an [`crate::operation::Operation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Identity of the operation this entry describes.
    pub op_id: OpId,
    /// Operation tag (`"copy"`, `"update"`, `"mkdir"`, `"safety_net"`, `"delete"`, `"symlink"`).
    pub kind: String,
    /// Relative path the operation applies to.
    pub rel: String,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Milliseconds since the Unix epoch when this entry was appended.
    pub timestamp_ms: i64,
    /// Reversal information for committed destructive operations.
    #[serde(default)]
    pub undo: UndoInfo,
    /// Reason recorded when `phase == Phase::Skipped` or `Phase::Failed`.
    #[serde(default)]
    pub reason: Option<String>,
    /// Set once [`crate::journal_entry::JournalEntry`] has been replayed by rollback, so a
    /// partially-rolled-back journal can be replayed again idempotently.
    #[serde(default)]
    pub rolled_back: bool,
}

impl JournalEntry {
    /// Builds a `planned` entry for `op_id`/`kind`/`rel` at `timestamp_ms`.
    #[must_use]
    pub fn planned(op_id: OpId, kind: &str, rel: &str, timestamp_ms: i64) -> Self {
        Self {
            op_id,
            kind: kind.to_string(),
            rel: rel.to_string(),
            phase: Phase::Planned,
            timestamp_ms,
            undo: UndoInfo::None,
            reason: None,
            rolled_back: false,
        }
    }

    /// Returns a copy of this entry advanced to `phase` at `timestamp_ms`.
    #[must_use]
    pub fn with_phase(&self, phase: Phase, timestamp_ms: i64) -> Self {
        Self {
            phase,
            timestamp_ms,
            ..self.clone()
        }
    }

    /// Returns a copy of this entry carrying `undo` reversal information.
    #[must_use]
    pub fn with_undo(&self, undo: UndoInfo) -> Self {
        Self {
            undo,
            ..self.clone()
        }
    }

    /// Returns a copy of this entry annotated with a skip/failure `reason`.
    #[must_use]
    pub fn with_reason(&self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planned_entry_starts_without_undo_or_reason() {
        let entry = JournalEntry::planned(OpId(1), "copy", "a.txt", 0);
        assert_eq!(entry.phase, Phase::Planned);
        assert_eq!(entry.undo, UndoInfo::None);
        assert!(entry.reason.is_none());
        assert!(!entry.rolled_back);
    }

    #[test]
    fn with_phase_preserves_other_fields() {
        let entry = JournalEntry::planned(OpId(1), "copy", "a.txt", 0).with_phase(Phase::Started, 5);
        assert_eq!(entry.phase, Phase::Started);
        assert_eq!(entry.timestamp_ms, 5);
        assert_eq!(entry.rel, "a.txt");
    }
}
