//! Completion index consulted on resume.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Durable record of what a run has already finished, used to elide
/// already-complete work on `--resume` (`spec.md` §4.5).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Relative paths of files whose committed journal entry is durable.
    pub completed_files: BTreeSet<String>,
    /// Relative paths of directories whose planned operation count has been fully committed.
    pub completed_dirs: BTreeSet<String>,
}

impl Checkpoint {
    /// Creates an empty checkpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `rel` has been committed.
    pub fn mark_file_complete(&mut self, rel: impl Into<String>) {
        self.completed_files.insert(rel.into());
    }

    /// Records that `rel` and everything beneath it has been fully processed.
    pub fn mark_dir_complete(&mut self, rel: impl Into<String>) {
        self.completed_dirs.insert(rel.into());
    }

    /// Reports whether `rel` was already committed in a prior attempt.
    #[must_use]
    pub fn is_file_complete(&self, rel: &str) -> bool {
        self.completed_files.contains(rel)
    }

    /// Reports whether `rel` was already fully processed in a prior attempt.
    #[must_use]
    pub fn is_dir_complete(&self, rel: &str) -> bool {
        self.completed_dirs.contains(rel)
    }

    /// Total count of recorded completions, used to decide when to flush
    /// the checkpoint to disk (`spec.md` §4.5: every 100 ops).
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed_files.len() + self.completed_dirs.len()
    }

    /// Reports whether the checkpoint has no recorded completions yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed_files.is_empty() && self.completed_dirs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_and_queries_file_completion() {
        let mut checkpoint = Checkpoint::new();
        assert!(!checkpoint.is_file_complete("a.txt"));
        checkpoint.mark_file_complete("a.txt");
        assert!(checkpoint.is_file_complete("a.txt"));
        assert_eq!(checkpoint.len(), 1);
    }

    #[test]
    fn marks_and_queries_dir_completion() {
        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_dir_complete("dir");
        assert!(checkpoint.is_dir_complete("dir"));
        assert!(!checkpoint.is_dir_complete("other"));
    }
}
