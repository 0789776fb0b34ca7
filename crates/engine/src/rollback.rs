//! Reverses a run by replaying its journal backwards, applying each
//! committed entry's [`dsp_journal::UndoAction`] to the filesystem.
//!
//! Used two ways: automatically by [`crate::Engine::run`] when a journal
//! sink becomes completely unwritable mid-run, and on demand by the
//! `rollback` CLI subcommand to reverse a prior, possibly crashed, run.

use std::fs;
use std::path::Path;

use dsp_core::{JournalEntry, JournalError};
use dsp_journal::{RollbackReport, UndoAction};

/// Reads the journal for `job_name` (preferring the project-log copy, since
/// it is the one the CLI always has a path to), reverses every committed
/// entry via [`dsp_journal::rollback`], and persists the updated
/// `rolled_back` flags back to both sinks that still exist.
///
/// # Errors
///
/// Returns [`JournalError`] if the journal cannot be read, or if a
/// filesystem reversal fails.
pub fn rollback_job(
    project_log_dir: &Path,
    dest_root: &Path,
    job_name: &str,
    dry_run: bool,
) -> Result<RollbackReport, JournalError> {
    let project_path = project_log_dir.join(format!("{job_name}.journal.jsonl"));
    let dest_path = dest_root
        .join(dsp_journal::DEST_SINK_DIR)
        .join(format!("{job_name}.journal.jsonl"));

    let mut entries = match dsp_journal::read_journal(&project_path) {
        Ok(entries) => entries,
        Err(JournalError::Io(_)) => dsp_journal::read_journal(&dest_path)?,
        Err(err) => return Err(err),
    };

    let report = dsp_journal::rollback(&mut entries, dry_run, |entry| {
        apply_undo(entry, dest_root)
    })?;

    if !dry_run {
        if project_path.exists() {
            dsp_journal::rewrite_journal(&project_path, &entries)?;
        }
        if dest_path.exists() {
            dsp_journal::rewrite_journal(&dest_path, &entries)?;
        }
    }

    Ok(report)
}

/// Applies the filesystem action one committed journal entry's undo data
/// describes. Every branch tolerates the target already being gone, so a
/// rollback interrupted partway through and re-run is idempotent.
fn apply_undo(entry: &JournalEntry, dest_root: &Path) -> Result<(), JournalError> {
    match dsp_journal::undo_action(entry, dest_root) {
        UndoAction::None => Ok(()),
        UndoAction::RemoveCreated => {
            let path = dest_root.join(&entry.rel);
            let result = if entry.kind == "mkdir" {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };
            ignore_missing(result)
        }
        UndoAction::RestoreBackup { backup_path } => restore(&backup_path, &dest_root.join(&entry.rel)),
        UndoAction::RestoreFromSafetyNet { safety_net_path } => {
            restore(&safety_net_path, &dest_root.join(&entry.rel))
        }
    }
}

fn restore(from: &Path, to: &Path) -> Result<(), JournalError> {
    if !from.exists() {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)?;
    Ok(())
}

fn ignore_missing(result: std::io::Result<()>) -> Result<(), JournalError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(JournalError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::journal_entry::UndoInfo;
    use dsp_core::{JournalEntry, JournalPhase, OpId};
    use dsp_journal::Journal;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rollback_job_restores_backed_up_file_and_marks_entry() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();

        fs::create_dir_all(dest_dir.path().join(".DiskSyncPro/backups")).unwrap();
        fs::write(
            dest_dir.path().join(".DiskSyncPro/backups/7__a.txt"),
            b"old content",
        )
        .unwrap();
        fs::write(dest_dir.path().join("a.txt"), b"new content").unwrap();

        let mut journal = Journal::open(project_dir.path(), dest_dir.path(), "nightly").unwrap();
        let entry = JournalEntry::planned(OpId(7), "update", "a.txt", 0)
            .with_phase(JournalPhase::Committed, 0)
            .with_undo(UndoInfo::BackupPath(".DiskSyncPro/backups/7__a.txt".into()));
        journal.append(entry).unwrap();
        drop(journal);

        let report = rollback_job(project_dir.path(), dest_dir.path(), "nightly", false).unwrap();
        assert_eq!(report.reversed, 1);
        assert_eq!(
            fs::read(dest_dir.path().join("a.txt")).unwrap(),
            b"old content"
        );

        let entries = dsp_journal::read_journal(
            &project_dir.path().join("nightly.journal.jsonl"),
        )
        .unwrap();
        assert!(entries[0].rolled_back);
    }

    #[test]
    fn rollback_job_removes_created_directory() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        fs::create_dir(dest_dir.path().join("sub")).unwrap();

        let mut journal = Journal::open(project_dir.path(), dest_dir.path(), "nightly").unwrap();
        let entry = JournalEntry::planned(OpId(1), "mkdir", "sub", 0)
            .with_phase(JournalPhase::Committed, 0);
        journal.append(entry).unwrap();
        drop(journal);

        rollback_job(project_dir.path(), dest_dir.path(), "nightly", false).unwrap();
        assert!(!dest_dir.path().join("sub").exists());
    }

    #[test]
    fn dry_run_rollback_leaves_filesystem_untouched() {
        let project_dir = tempdir().unwrap();
        let dest_dir = tempdir().unwrap();
        fs::write(dest_dir.path().join("a.txt"), b"hi").unwrap();

        let mut journal = Journal::open(project_dir.path(), dest_dir.path(), "nightly").unwrap();
        let entry = JournalEntry::planned(OpId(1), "copy", "a.txt", 0)
            .with_phase(JournalPhase::Committed, 0);
        journal.append(entry).unwrap();
        drop(journal);

        let report = rollback_job(project_dir.path(), dest_dir.path(), "nightly", true).unwrap();
        assert_eq!(report.reversed, 1);
        assert!(dest_dir.path().join("a.txt").exists());
    }
}
