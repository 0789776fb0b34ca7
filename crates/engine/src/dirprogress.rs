//! Tracks, for each directory touched by a run's plan, how many of its
//! planned operations — including those of nested subdirectories — have
//! committed, so a directory is only marked complete in the checkpoint once
//! every operation within it has actually committed.
//!
//! `spec.md` §4.5: "A directory is added to `completed_dirs` when the
//! Planner-recorded count of operations within it equals the committed
//! count." A directory's own `MkDir` committing is not enough on its own —
//! [`Checkpoint::mark_dir_complete`](dsp_core::Checkpoint::mark_dir_complete)'s
//! contract is that everything beneath the directory has also been fully
//! processed, which this counter enforces.

use std::collections::HashMap;
use std::sync::Mutex;

use dsp_core::operation::Operation;

/// Per-directory pending-operation counters, built once from a run's full
/// plan and decremented as operations commit.
#[derive(Default)]
pub struct DirProgress {
    pending: Mutex<HashMap<String, usize>>,
}

impl DirProgress {
    /// Builds the initial pending counts from every operation `plan` contains.
    #[must_use]
    pub fn from_plan(plan: &[Operation]) -> Self {
        let mut pending: HashMap<String, usize> = HashMap::new();
        for op in plan {
            for dir in credited_dirs(op) {
                *pending.entry(dir).or_insert(0) += 1;
            }
        }
        Self {
            pending: Mutex::new(pending),
        }
    }

    /// Decrements the pending count for every directory `op` counts toward,
    /// returning those whose count just reached zero — directories that are
    /// now fully processed and safe to mark complete in the checkpoint.
    pub fn complete(&self, op: &Operation) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut newly_complete = Vec::new();
        for dir in credited_dirs(op) {
            if let Some(count) = pending.get_mut(&dir) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    newly_complete.push(dir);
                }
            }
        }
        newly_complete
    }
}

/// Directories `op` counts toward: every proper ancestor directory of its
/// relative path, plus the path itself when `op` is the `MkDir` that
/// creates that directory.
fn credited_dirs(op: &Operation) -> Vec<String> {
    let rel = op.rel();
    let mut dirs = Vec::new();
    if matches!(op, Operation::MkDir { .. }) {
        dirs.push(rel.to_string());
    }

    let mut components = rel.split('/');
    let _ = components.next_back();
    let mut acc = String::new();
    for part in components {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(part);
        dirs.push(acc.clone());
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::operation::OpId;

    fn mkdir(rel: &str) -> Operation {
        Operation::MkDir {
            op_id: OpId(1),
            rel: rel.to_string(),
            mode: 0o755,
        }
    }

    fn copy(rel: &str) -> Operation {
        Operation::Copy {
            op_id: OpId(2),
            rel: rel.to_string(),
            size: 1,
        }
    }

    #[test]
    fn top_level_file_credits_no_directory() {
        assert_eq!(credited_dirs(&copy("a.txt")), Vec::<String>::new());
    }

    #[test]
    fn nested_file_credits_every_ancestor() {
        let mut dirs = credited_dirs(&copy("dir/sub/a.txt"));
        dirs.sort();
        assert_eq!(dirs, vec!["dir".to_string(), "dir/sub".to_string()]);
    }

    #[test]
    fn mkdir_credits_itself_and_its_ancestors() {
        let mut dirs = credited_dirs(&mkdir("dir/sub"));
        dirs.sort();
        assert_eq!(dirs, vec!["dir".to_string(), "dir/sub".to_string()]);
    }

    #[test]
    fn directory_completes_only_once_every_descendant_commits() {
        let plan = vec![
            mkdir("dir"),
            mkdir("dir/sub"),
            copy("dir/sub/a.txt"),
            copy("dir/other.txt"),
        ];
        let progress = DirProgress::from_plan(&plan);

        assert!(progress.complete(&mkdir("dir")).is_empty());
        assert!(progress.complete(&mkdir("dir/sub")).is_empty());

        // "dir/sub" has no remaining descendants once its one file commits,
        // but "dir" still has "dir/other.txt" outstanding.
        let newly_complete = progress.complete(&copy("dir/sub/a.txt"));
        assert_eq!(newly_complete, vec!["dir/sub".to_string()]);

        // Now the last outstanding op under "dir" commits.
        let newly_complete = progress.complete(&copy("dir/other.txt"));
        assert_eq!(newly_complete, vec!["dir".to_string()]);
    }

    #[test]
    fn a_directory_with_a_failed_op_never_completes() {
        let plan = vec![mkdir("dir"), copy("dir/a.txt"), copy("dir/b.txt")];
        let progress = DirProgress::from_plan(&plan);

        assert!(progress.complete(&mkdir("dir")).is_empty());
        assert!(progress.complete(&copy("dir/a.txt")).is_empty());
        // "dir/b.txt" never commits (e.g. it failed) — "dir" must never
        // reach zero and must never be reported complete.
    }
}
