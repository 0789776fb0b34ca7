//! End-of-run counters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters accumulated over one run, emitted as part of the [`crate::snapshot::Snapshot`]
/// metadata and as a standalone `summary_<job>_<timestamp>.json` artifact.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Summary {
    /// Count of source-only entries copied.
    pub copied: u64,
    /// Count of changed entries overwritten.
    pub updated: u64,
    /// Count of entries left untouched because they were already up to date.
    pub skipped_noop: u64,
    /// Count of operations abandoned after exhausting retries.
    pub failed: u64,
    /// Count of entries relocated under SafetyNet.
    pub moved_to_safety_net: u64,
    /// Count of destination-only entries deleted outright (clone mode).
    pub deleted: u64,
    /// Count of per-entry scan failures that were recorded and skipped.
    pub scan_warnings: u64,
    /// Total bytes transferred by `copy`/`update` operations.
    pub bytes_transferred: u64,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: u64,
}

impl Summary {
    /// Creates a zeroed summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of per-operation outcomes recorded (everything except
    /// no-ops and scan warnings), used to compute `done`/`total` progress.
    #[must_use]
    pub const fn mutating_ops(&self) -> u64 {
        self.copied + self.updated + self.failed + self.moved_to_safety_net + self.deleted
    }

    /// Sets the duration from a [`Duration`], saturating at `u64::MAX` milliseconds.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    }

    /// Exit-code-relevant outcome: `true` when any operation was skipped/failed
    /// or any entry produced a scan warning (`spec.md` §6: exit code 1, "partial").
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.failed > 0 || self.scan_warnings > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_ops_excludes_noop_and_warnings() {
        let mut summary = Summary::new();
        summary.copied = 2;
        summary.updated = 1;
        summary.skipped_noop = 10;
        summary.scan_warnings = 3;
        assert_eq!(summary.mutating_ops(), 3);
    }

    #[test]
    fn is_partial_true_only_with_failures_or_warnings() {
        let mut summary = Summary::new();
        assert!(!summary.is_partial());
        summary.failed = 1;
        assert!(summary.is_partial());

        let mut summary = Summary::new();
        summary.scan_warnings = 1;
        assert!(summary.is_partial());
    }

    #[test]
    fn set_duration_converts_to_milliseconds() {
        let mut summary = Summary::new();
        summary.set_duration(Duration::from_secs(2));
        assert_eq!(summary.duration_ms, 2000);
    }
}
