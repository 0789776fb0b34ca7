#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_scanner` enumerates a source or destination root into a
//! [`dsp_core::Tree`], gathering the `(size, mtime, mode, kind)` metadata
//! the planner's Smart Update rule depends on (`spec.md` §4.1).
//!
//! # Design
//!
//! Walking is iterative and depth-first via [`jwalk::WalkDir`], sorted for
//! determinism. Excluded directories — and, on a destination-side resume
//! scan, directories already present in `completed_dirs` — are pruned from
//! the `jwalk` read-dir callback before their children are ever visited, so
//! excluded/completed subtrees cost nothing beyond a single `stat`.
//! Symlinks are never followed; they are recorded as [`dsp_core::Kind::Symlink`]
//! entries carrying their target string.
//!
//! # Errors
//!
//! Per-entry I/O failures (a file disappearing mid-walk, a permission
//! error on one entry) are recorded as [`dsp_core::ScanWarning`] and the
//! entry is omitted from the returned tree; failing to open the root itself
//! is reported as [`ScanError::RootUnreadable`] and is fatal to the run.

use std::collections::BTreeSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dsp_core::record::MTime;
use dsp_core::{FileRecord, ScanWarning, Tree};
use dsp_filters::ExcludeSet;
use jwalk::WalkDir;

/// Fatal scanner failure.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The root directory itself could not be opened.
    #[error("could not open root {path}: {source}")]
    RootUnreadable {
        /// Root that failed to open.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Result of a single scan: the tree plus any recoverable per-entry warnings.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Entries successfully observed.
    pub tree: Tree,
    /// Recoverable per-entry failures; the corresponding entry is omitted from `tree`.
    pub warnings: Vec<ScanWarning>,
}

/// Walks `root`, applying `exclude` before descent and, when `completed_dirs`
/// is supplied, pruning those subtrees too (used for the destination side of
/// a `--resume` scan, per `spec.md` §4.1 and §4.5).
///
/// # Errors
///
/// Returns [`ScanError::RootUnreadable`] if `root` cannot be opened at all.
pub fn scan(
    root: &Path,
    exclude: &ExcludeSet,
    completed_dirs: Option<&BTreeSet<String>>,
) -> Result<ScanOutcome, ScanError> {
    if let Err(source) = std::fs::symlink_metadata(root) {
        return Err(ScanError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        });
    }

    let mut outcome = ScanOutcome::default();
    let root_owned = root.to_path_buf();
    let exclude = exclude.clone();
    let completed = completed_dirs.cloned().unwrap_or_default();

    let walker = WalkDir::new(root).sort(true).process_read_dir({
        let root_owned = root_owned.clone();
        move |_depth, _path, _state, children| {
            children.retain(|entry| {
                let Ok(entry) = entry else { return true };
                let Ok(rel) = entry.path().strip_prefix(&root_owned).map(PathBuf::from) else {
                    return true;
                };
                let Some(rel_str) = to_rel_string(&rel) else {
                    return true;
                };
                if exclude.is_excluded(&rel_str) {
                    return false;
                }
                if entry.file_type().is_dir() && completed.contains(&rel_str) {
                    return false;
                }
                true
            });
        }
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                outcome.warnings.push(ScanWarning {
                    rel: "<unknown>".to_string(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if path == root_owned {
            continue;
        }
        let Ok(rel) = path.strip_prefix(&root_owned).map(PathBuf::from) else {
            continue;
        };
        let Some(rel_str) = to_rel_string(&rel) else {
            continue;
        };

        match record_for(&path, &rel_str) {
            Ok(record) => outcome.tree.insert(record),
            Err(reason) => outcome.warnings.push(ScanWarning {
                rel: rel_str,
                reason,
            }),
        }
    }

    Ok(outcome)
}

fn to_rel_string(rel: &Path) -> Option<String> {
    dsp_core::paths::normalize_relative(rel).ok()
}

fn record_for(path: &Path, rel: &str) -> Result<FileRecord, String> {
    let metadata = std::fs::symlink_metadata(path).map_err(|err| err.to_string())?;
    if metadata.file_type().is_symlink() {
        let target = std::fs::read_link(path).map_err(|err| err.to_string())?;
        let target_str = target.to_string_lossy().into_owned();
        return Ok(FileRecord::symlink(rel, target_str, mtime_of(&metadata)));
    }
    if metadata.is_dir() {
        return Ok(FileRecord::dir(rel, mtime_of(&metadata), mode_of(&metadata)));
    }
    Ok(FileRecord::file(
        rel,
        metadata.len(),
        mtime_of(&metadata),
        mode_of(&metadata),
    ))
}

fn mtime_of(metadata: &Metadata) -> MTime {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let since_epoch = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    MTime::new(
        i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX),
        since_epoch.subsec_nanos(),
    )
}

#[cfg(unix)]
fn mode_of(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_metadata: &Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"hello").unwrap();

        let exclude = ExcludeSet::empty().unwrap();
        let outcome = scan(dir.path(), &exclude, None).unwrap();

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.tree.get("a.txt").unwrap().size, 2);
        assert_eq!(outcome.tree.get("sub").unwrap().kind, dsp_core::Kind::Dir);
        assert_eq!(outcome.tree.get("sub/b.txt").unwrap().size, 5);
    }

    #[test]
    fn prunes_excluded_directories_before_descent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/secret.txt"), b"hi").unwrap();
        fs::write(dir.path().join("keep.txt"), b"hi").unwrap();

        let exclude = ExcludeSet::compile(["skip"]).unwrap();
        let outcome = scan(dir.path(), &exclude, None).unwrap();

        assert!(outcome.tree.get("skip").is_none());
        assert!(outcome.tree.get("skip/secret.txt").is_none());
        assert!(outcome.tree.get("keep.txt").is_some());
    }

    #[test]
    fn prunes_completed_directories_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("done")).unwrap();
        fs::write(dir.path().join("done/f.txt"), b"hi").unwrap();

        let exclude = ExcludeSet::empty().unwrap();
        let mut completed = BTreeSet::new();
        completed.insert("done".to_string());
        let outcome = scan(dir.path(), &exclude, Some(&completed)).unwrap();

        assert!(outcome.tree.get("done/f.txt").is_none());
    }

    #[test]
    fn root_unreadable_is_fatal() {
        let missing = Path::new("/does/not/exist/ever");
        assert!(scan(missing, &ExcludeSet::empty().unwrap(), None).is_err());
    }

    #[test]
    fn records_symlink_target() {
        if cfg!(unix) {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("real.txt"), b"hi").unwrap();
            std::os::unix::fs::symlink("real.txt", dir.path().join("link.txt")).unwrap();

            let outcome = scan(dir.path(), &ExcludeSet::empty().unwrap(), None).unwrap();
            let link = outcome.tree.get("link.txt").unwrap();
            assert_eq!(link.kind, dsp_core::Kind::Symlink);
            assert_eq!(link.symlink_target.as_deref(), Some("real.txt"));
        }
    }
}
