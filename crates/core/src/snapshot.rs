//! End-of-run snapshot and index artifacts.

use serde::{Deserialize, Serialize};

use crate::summary::Summary;
use crate::tree::Tree;

/// Schema version stamped into every on-disk artifact (`spec.md` §6).
pub const SCHEMA_VERSION: u32 = 1;

/// Serialized destination tree plus run metadata, written at successful completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// On-disk schema version.
    pub schema: u32,
    /// Name of the job this snapshot belongs to.
    pub job_name: String,
    /// Milliseconds since the Unix epoch when the run started.
    pub started_at_ms: i64,
    /// Milliseconds since the Unix epoch when the run finished.
    pub finished_at_ms: i64,
    /// Counters accumulated over the run.
    pub summary: Summary,
    /// Full destination tree after the run completed.
    pub tree: Tree,
}

impl Snapshot {
    /// Builds a snapshot with [`SCHEMA_VERSION`] already stamped.
    #[must_use]
    pub fn new(
        job_name: impl Into<String>,
        started_at_ms: i64,
        finished_at_ms: i64,
        summary: Summary,
        tree: Tree,
    ) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            job_name: job_name.into(),
            started_at_ms,
            finished_at_ms,
            summary,
            tree,
        }
    }
}

/// One row of the snapshot index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Identifier of the snapshot, typically its filename stem.
    pub snapshot_id: String,
    /// Path to the snapshot file, relative to the index's own directory.
    pub path: String,
    /// Milliseconds since the Unix epoch when the snapshot was written.
    pub timestamp_ms: i64,
    /// Counters recorded for this snapshot's run.
    pub summary: Summary,
}

/// Append-then-atomic-replace index mapping `snapshot_id` to [`IndexEntry`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Index {
    /// On-disk schema version.
    #[serde(default = "default_schema")]
    pub schema: u32,
    /// Rows, ordered by insertion (oldest first).
    pub entries: Vec<IndexEntry>,
}

const fn default_schema() -> u32 {
    SCHEMA_VERSION
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }

    /// Appends a new row.
    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_carries_current_schema() {
        let snapshot = Snapshot::new("demo", 0, 1, Summary::new(), Tree::new());
        assert_eq!(snapshot.schema, SCHEMA_VERSION);
    }

    #[test]
    fn index_push_appends_in_order() {
        let mut index = Index::new();
        index.push(IndexEntry {
            snapshot_id: "a".into(),
            path: "snapshots/a.json".into(),
            timestamp_ms: 1,
            summary: Summary::new(),
        });
        index.push(IndexEntry {
            snapshot_id: "b".into(),
            path: "snapshots/b.json".into(),
            timestamp_ms: 2,
            summary: Summary::new(),
        });
        assert_eq!(index.entries[0].snapshot_id, "a");
        assert_eq!(index.entries[1].snapshot_id, "b");
    }
}
