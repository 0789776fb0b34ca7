//! Snapshot, index, and summary artifact emission at successful completion
//! (`spec.md` §4.7): all three written to both the project log directory
//! and `<dest_root>/.DiskSyncPro/`, each via write-temp-then-rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dsp_core::{Index, IndexEntry, Snapshot, Summary, Tree};
use thiserror::Error;

/// Failure writing one of the end-of-run metadata artifacts.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// An underlying I/O failure occurred.
    #[error("metadata I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The artifact could not be serialized or a prior index could not be parsed.
    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

const DEST_SINK_DIR: &str = dsp_journal::DEST_SINK_DIR;

/// Writes the snapshot, appends to the index, and writes the standalone
/// summary, to both the project log directory and the destination sink,
/// using the job name and a caller-supplied timestamp to name the files
/// (`spec.md` §6 on-disk layout).
pub fn write_run_metadata(
    project_log_dir: &Path,
    dest_root: &Path,
    job_name: &str,
    timestamp: &str,
    snapshot: &Snapshot,
) -> Result<(), MetadataError> {
    let dest_sink = dest_root.join(DEST_SINK_DIR);
    for base in [project_log_dir, &dest_sink] {
        write_snapshot(base, job_name, timestamp, snapshot)?;
        append_index(
            base,
            job_name,
            timestamp,
            snapshot.finished_at_ms,
            &snapshot.summary,
        )?;
        write_summary(base, job_name, timestamp, &snapshot.summary)?;
    }
    Ok(())
}

fn write_snapshot(
    base: &Path,
    job_name: &str,
    timestamp: &str,
    snapshot: &Snapshot,
) -> Result<(), MetadataError> {
    let dir = base.join("snapshots");
    let path = dir.join(format!("snapshot_{job_name}_{timestamp}.json"));
    atomic_write_json(&path, snapshot)
}

fn append_index(
    base: &Path,
    job_name: &str,
    timestamp: &str,
    timestamp_ms: i64,
    summary: &Summary,
) -> Result<(), MetadataError> {
    let path = base.join(format!("index_{job_name}.json"));
    let mut index = match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Index::new(),
        Err(err) => return Err(MetadataError::Io(err)),
    };
    index.push(IndexEntry {
        snapshot_id: format!("{job_name}_{timestamp}"),
        path: format!("snapshots/snapshot_{job_name}_{timestamp}.json"),
        timestamp_ms,
        summary: *summary,
    });
    atomic_write_json(&path, &index)
}

fn write_summary(
    base: &Path,
    job_name: &str,
    timestamp: &str,
    summary: &Summary,
) -> Result<(), MetadataError> {
    let path = base.join(format!("summary_{job_name}_{timestamp}.json"));
    atomic_write_json(&path, summary)
}

fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), MetadataError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("dsp"),
        std::process::id()
    ));
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(&bytes)?;
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Builds the destination snapshot tree from `tree`, stamping the current
/// job/summary/timing into a [`Snapshot`] ready for [`write_run_metadata`].
#[must_use]
pub fn build_snapshot(
    job_name: &str,
    started_at_ms: i64,
    finished_at_ms: i64,
    summary: Summary,
    tree: Tree,
) -> Snapshot {
    Snapshot::new(job_name, started_at_ms, finished_at_ms, summary, tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::record::MTime;
    use dsp_core::FileRecord;
    use tempfile::tempdir;

    #[test]
    fn writes_snapshot_index_and_summary_to_both_sinks() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();

        let mut tree = Tree::new();
        tree.insert(FileRecord::file("a.txt", 3, MTime::default(), 0o644));
        let mut summary = Summary::new();
        summary.copied = 1;
        let snapshot = build_snapshot("nightly", 0, 100, summary, tree);

        write_run_metadata(
            project_dir.path(),
            dest_dir.path(),
            "nightly",
            "20260727_000000",
            &snapshot,
        )
        .unwrap();

        for base in [
            project_dir.path().to_path_buf(),
            dest_dir.path().join(DEST_SINK_DIR),
        ] {
            assert!(base
                .join("snapshots/snapshot_nightly_20260727_000000.json")
                .exists());
            assert!(base.join("index_nightly.json").exists());
            assert!(base.join("summary_nightly_20260727_000000.json").exists());
        }
    }

    #[test]
    fn index_accumulates_across_multiple_runs() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        let snapshot = build_snapshot("nightly", 0, 1, Summary::new(), Tree::new());

        write_run_metadata(project_dir.path(), dest_dir.path(), "nightly", "run1", &snapshot)
            .unwrap();
        write_run_metadata(project_dir.path(), dest_dir.path(), "nightly", "run2", &snapshot)
            .unwrap();

        let bytes = fs::read(project_dir.path().join("index_nightly.json")).unwrap();
        let index: Index = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].snapshot_id, "nightly_run1");
        assert_eq!(index.entries[1].snapshot_id, "nightly_run2");
    }

    #[test]
    fn index_entry_carries_the_snapshot_finish_time() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        let snapshot = build_snapshot("nightly", 1_000, 1_234_567, Summary::new(), Tree::new());

        write_run_metadata(project_dir.path(), dest_dir.path(), "nightly", "run1", &snapshot)
            .unwrap();

        let bytes = fs::read(project_dir.path().join("index_nightly.json")).unwrap();
        let index: Index = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(index.entries[0].timestamp_ms, 1_234_567);
    }
}
