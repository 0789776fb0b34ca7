#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_journal` persists the append-only journal and periodic checkpoint
//! described in `spec.md` §4.4/§4.5, and replays a journal backwards to
//! undo a run's effects (§4.6 rollback).
//!
//! Checkpoint and snapshot/index/summary writes all follow the same shape
//! as `dsp-engine`'s file copies: write to a sibling temp file, `sync_all`,
//! then rename over the final path, so a crash never leaves a torn
//! artifact on disk. The journal itself is append-only (JSON Lines) rather
//! than rewrite-on-every-entry, since it is read back only on rollback or
//! resume, not on every write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use dsp_core::journal_entry::UndoInfo;
use dsp_core::{Checkpoint, CheckpointError, JournalEntry, JournalError, JournalPhase};
use thiserror::Error;
use tracing::warn;

/// Directory name the dual-sink writer creates under the destination root.
pub const DEST_SINK_DIR: &str = ".DiskSyncPro";

struct Sink {
    path: PathBuf,
    file: Option<File>,
}

impl Sink {
    fn open(path: PathBuf) -> Self {
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "journal sink unwritable");
                None
            }
        };
        Self { path, file }
    }

    /// Appends `line` to this sink. On the first failure the sink is marked
    /// dead so later calls do not keep retrying a broken handle.
    fn try_append(&mut self, line: &str) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        let result = file
            .write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.sync_all());
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "journal sink write failed");
                self.file = None;
                false
            }
        }
    }

    fn is_dead(&self) -> bool {
        self.file.is_none()
    }
}

/// Writes [`JournalEntry`] records to two independent sinks: one under the
/// caller-supplied project log directory, one under the destination root
/// (`spec.md` §4.4: "written to both... so a destroyed destination does not
/// strand the only copy of the run's journal"). A write that fails on one
/// sink but succeeds on the other is logged and continues; failure on both
/// is fatal.
pub struct Journal {
    project_sink: Sink,
    dest_sink: Sink,
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Opens (creating if absent) the journal file `{job_name}.journal.jsonl`
    /// under `project_log_dir` and under `<dest_root>/.DiskSyncPro/`.
    pub fn open(
        project_log_dir: &Path,
        dest_root: &Path,
        job_name: &str,
    ) -> Result<Self, JournalError> {
        fs::create_dir_all(project_log_dir)?;
        let dest_dir = dest_root.join(DEST_SINK_DIR);
        fs::create_dir_all(&dest_dir)?;

        let project_path = project_log_dir.join(format!("{job_name}.journal.jsonl"));
        let dest_path = dest_dir.join(format!("{job_name}.journal.jsonl"));

        let project_sink = Sink::open(project_path);
        let dest_sink = Sink::open(dest_path);
        if project_sink.is_dead() && dest_sink.is_dead() {
            return Err(JournalError::BothSinksUnwritable(format!(
                "{} and {}",
                project_sink.path.display(),
                dest_sink.path.display()
            )));
        }
        Ok(Self {
            project_sink,
            dest_sink,
            entries: Vec::new(),
        })
    }

    /// Appends `entry` to every healthy sink, keeping an in-memory copy for
    /// immediate checkpoint/rollback use within the same run. Degrades to a
    /// single sink with a warning rather than failing the run; only total
    /// sink loss is fatal.
    pub fn append(&mut self, entry: JournalEntry) -> Result<(), JournalError> {
        let line = serde_json::to_string(&entry).map_err(|err| JournalError::Corrupt {
            path: self.project_sink.path.clone(),
            source: err,
        })?;

        let project_ok = self.project_sink.try_append(&line);
        let dest_ok = self.dest_sink.try_append(&line);

        if !project_ok && !dest_ok {
            return Err(JournalError::BothSinksUnwritable(format!(
                "{} and {}",
                self.project_sink.path.display(),
                self.dest_sink.path.display()
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Entries appended so far in this run, in append order.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }
}

/// Reads every entry from a journal file on disk, in append order. Used by
/// `rollback` when reversing a prior, possibly crashed, run rather than the
/// live run that wrote it.
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry =
            serde_json::from_str(&line).map_err(|err| JournalError::Corrupt {
                path: path.to_path_buf(),
                source: err,
            })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Atomically writes `checkpoint` to `path` via a sibling temp file, so a
/// crash mid-write never corrupts the last-known-good checkpoint
/// (`spec.md` §4.5).
pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    atomic_write_json(path, checkpoint).map_err(|err| match err {
        AtomicWriteError::Io(source) => CheckpointError::Io(source),
        AtomicWriteError::Serde(source) => CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Reads a checkpoint previously written by [`write_checkpoint`]. A missing
/// file is treated as an empty checkpoint by the caller, not an error here.
pub fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Deletes the checkpoint file for a job that completed without being
/// cancelled, so the next run does not treat a finished job as resumable.
pub fn delete_checkpoint(path: &Path) -> Result<(), CheckpointError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CheckpointError::Io(err)),
    }
}

#[derive(Debug, Error)]
enum AtomicWriteError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Serde(serde_json::Error),
}

fn atomic_write_json<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), AtomicWriteError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("dsp"),
        std::process::id()
    ));
    let mut tmp = File::create(&tmp_path)?;
    let bytes = serde_json::to_vec_pretty(value).map_err(AtomicWriteError::Serde)?;
    tmp.write_all(&bytes)?;
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Outcome of a [`rollback`] pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RollbackReport {
    /// Number of committed entries that were reversed.
    pub reversed: usize,
    /// Number of entries already marked `rolled_back` and left untouched.
    pub already_rolled_back: usize,
    /// Number of entries that were not in `Phase::Committed` and needed no reversal.
    pub skipped: usize,
}

/// Rewrites the full journal file at `path` from `entries`, one JSON object
/// per line, via the same temp-then-rename sequence as [`write_checkpoint`].
/// Used after [`rollback`] to persist updated `rolled_back` flags, since a
/// rollback pass is not itself an append — it revisits entries already on
/// disk.
pub fn rewrite_journal(path: &Path, entries: &[JournalEntry]) -> Result<(), JournalError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("dsp"),
        std::process::id()
    ));
    let mut tmp = File::create(&tmp_path)?;
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(|err| JournalError::Corrupt {
            path: path.to_path_buf(),
            source: err,
        })?;
        tmp.write_all(line.as_bytes())?;
        tmp.write_all(b"\n")?;
    }
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reverses every `Committed` entry in `entries`, in reverse append order,
/// so a directory's children are undone before the directory itself
/// (`spec.md` §4.6). `apply` performs the actual filesystem action for one
/// entry and is expected to be idempotent; when `dry_run` is set, `apply`
/// is not called at all, only `rolled_back` flags are simulated.
pub fn rollback<F>(
    entries: &mut [JournalEntry],
    dry_run: bool,
    mut apply: F,
) -> Result<RollbackReport, JournalError>
where
    F: FnMut(&JournalEntry) -> Result<(), JournalError>,
{
    let mut report = RollbackReport::default();
    for entry in entries.iter_mut().rev() {
        if entry.rolled_back {
            report.already_rolled_back += 1;
            continue;
        }
        if entry.phase != JournalPhase::Committed {
            report.skipped += 1;
            continue;
        }
        if !dry_run {
            apply(entry)?;
            entry.rolled_back = true;
        }
        report.reversed += 1;
    }
    Ok(report)
}

/// Describes the filesystem action rollback must perform for one committed
/// entry, derived from its [`UndoInfo`] and `kind` tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoAction {
    /// Remove the file or empty directory this entry created.
    RemoveCreated,
    /// Move the backed-up path back over the entry's relative path.
    RestoreBackup {
        /// Path the pre-existing content was moved aside to.
        backup_path: PathBuf,
    },
    /// Move the SafetyNet-relocated entry back to its original path.
    RestoreFromSafetyNet {
        /// Path the entry was relocated to.
        safety_net_path: PathBuf,
    },
    /// Nothing to do; the operation was not destructive or carries no undo data.
    None,
}

/// Classifies `entry` into the concrete action [`rollback`]'s `apply`
/// callback should take.
#[must_use]
pub fn undo_action(entry: &JournalEntry, dest_root: &Path) -> UndoAction {
    match &entry.undo {
        UndoInfo::None => match entry.kind.as_str() {
            "copy" | "mkdir" | "symlink" => UndoAction::RemoveCreated,
            _ => UndoAction::None,
        },
        UndoInfo::BackupPath(path) => UndoAction::RestoreBackup {
            backup_path: dest_root.join(path),
        },
        UndoInfo::SafetyNetPath(path) => UndoAction::RestoreFromSafetyNet {
            safety_net_path: dest_root.join(path),
        },
    }
}
