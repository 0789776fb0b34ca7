//! Per-operation execution: atomic copy, backup-aside for overwrites and
//! deletes, SafetyNet relocation, and cancellation-aware streaming.
//!
//! Every write lands through a staging file in the destination's own
//! directory, then an atomic rename, mirroring the teacher's
//! temp-file-then-rename guard: a crash or cancellation during a copy
//! never leaves a half-written file visible at its final path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use dsp_checksums::Sha256Stream;
use dsp_core::journal_entry::UndoInfo;
use dsp_core::{Mode, OpError};

use crate::dirgate::DirGate;

/// Buffer size for streamed copies (`spec.md` §5: "buffer size 1 MiB").
pub const COPY_BUFFER_BYTES: usize = 1024 * 1024;

/// Directory under the destination root that backed-aside content (for
/// `UpdateFile` overwrites and `Delete` removals) is parked in, so a
/// committed destructive operation can still be reversed by rollback.
pub const BACKUP_DIR: &str = ".DiskSyncPro/backups";

/// Outcome of a successfully applied operation.
#[derive(Debug, Default)]
pub struct Applied {
    /// Bytes streamed, for progress/summary accounting.
    pub bytes: u64,
    /// Reversal information to record on the committed journal entry.
    pub undo: UndoInfo,
    /// SHA-256 digest of the source content, present when verification ran.
    pub verified: Option<bool>,
}

/// Streams `source` into a fresh file at `dest`, via a staging file in the
/// same directory as `dest` so the final rename is same-filesystem and
/// atomic. Aborts cleanly (removing the staging file) if `cancel` flips
/// mid-copy.
pub fn copy_new_file(
    source: &Path,
    dest: &Path,
    dir_gate: &DirGate,
    cancel: &AtomicBool,
    verify: bool,
) -> Result<Applied, ExecError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    dir_gate.ensure(parent).map_err(io_to_exec)?;

    let staging = staging_path(dest);
    let result = stream_to_staging(source, &staging, cancel, verify);
    let (bytes, source_digest) = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
    };

    fs::rename(&staging, dest).map_err(io_to_exec)?;

    let verified = match (verify, source_digest) {
        (true, Some(expected)) => Some(verify_digest(dest, &expected).map_err(io_to_exec)?),
        _ => None,
    };

    Ok(Applied {
        bytes,
        undo: UndoInfo::None,
        verified,
    })
}

/// Overwrites an existing destination file. In [`Mode::SafetyNet`] the
/// pre-existing content is relocated into the dated quarantine bucket via
/// [`dsp_safetynet::relocate`], carrying a [`UndoInfo::SafetyNetPath`]
/// (`spec.md` §4.2: "UpdateFile (overwrite, prior content preserved to
/// SafetyNet)"); in every other mode it is moved aside under [`BACKUP_DIR`]
/// instead, carrying a [`UndoInfo::BackupPath`]. Either way the new content
/// is then streamed in via the same staging-then-rename sequence as
/// [`copy_new_file`].
#[allow(clippy::too_many_arguments)]
pub fn update_existing_file(
    source: &Path,
    dest: &Path,
    dest_root: &Path,
    rel: &str,
    op_id: u64,
    mode: Mode,
    bucket_date: &str,
    dir_gate: &DirGate,
    cancel: &AtomicBool,
    verify: bool,
) -> Result<Applied, ExecError> {
    let (undo, restore): (UndoInfo, PathBuf) = if mode.quarantines() {
        let relocated = dsp_safetynet::relocate(dest_root, rel, bucket_date).map_err(io_to_exec)?;
        let restore_abs = dest_root.join(&relocated);
        (UndoInfo::SafetyNetPath(relocated), restore_abs)
    } else {
        let backup_rel = backup_aside(dest, dest_root, rel, op_id, dir_gate)?;
        let restore_abs = dest_root.join(&backup_rel);
        (UndoInfo::BackupPath(backup_rel), restore_abs)
    };

    match copy_new_file(source, dest, dir_gate, cancel, verify) {
        Ok(mut applied) => {
            applied.undo = undo;
            Ok(applied)
        }
        Err(err) => {
            // Best-effort restore of the original content before surfacing the failure.
            let _ = fs::rename(&restore, dest);
            Err(err)
        }
    }
}

/// Removes a destination-only entry outright (clone mode), backing it aside
/// first for the same reversibility guarantee as [`update_existing_file`].
pub fn delete_entry(
    dest: &Path,
    dest_root: &Path,
    rel: &str,
    op_id: u64,
    dir_gate: &DirGate,
) -> Result<Applied, ExecError> {
    let backup_rel = backup_aside(dest, dest_root, rel, op_id, dir_gate)?;
    Ok(Applied {
        bytes: 0,
        undo: UndoInfo::BackupPath(backup_rel),
        verified: None,
    })
}

/// Relocates a doomed destination entry under the dated SafetyNet bucket.
pub fn move_to_safety_net(
    dest_root: &Path,
    rel: &str,
    bucket_date: &str,
) -> Result<Applied, ExecError> {
    let relocated = dsp_safetynet::relocate(dest_root, rel, bucket_date).map_err(io_to_exec)?;
    Ok(Applied {
        bytes: 0,
        undo: UndoInfo::SafetyNetPath(relocated),
        verified: None,
    })
}

/// Creates a directory at `dest` with `mode` (no-op if it already exists,
/// since [`DirGate`] may have created it first).
pub fn make_dir(dest: &Path, mode: u32, dir_gate: &DirGate) -> Result<Applied, ExecError> {
    dir_gate.ensure(dest).map_err(io_to_exec)?;
    set_mode(dest, mode).map_err(io_to_exec)?;
    Ok(Applied {
        bytes: 0,
        undo: UndoInfo::None,
        verified: None,
    })
}

/// Recreates a symbolic link pointing at `target`.
pub fn create_symlink(dest: &Path, target: &str, dir_gate: &DirGate) -> Result<Applied, ExecError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    dir_gate.ensure(parent).map_err(io_to_exec)?;
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest).map_err(io_to_exec)?;
    }
    symlink(target, dest).map_err(io_to_exec)?;
    Ok(Applied {
        bytes: 0,
        undo: UndoInfo::None,
        verified: None,
    })
}

fn backup_aside(
    dest: &Path,
    dest_root: &Path,
    rel: &str,
    op_id: u64,
    dir_gate: &DirGate,
) -> Result<String, ExecError> {
    let backup_rel = format!("{BACKUP_DIR}/{op_id}__{}", rel.replace('/', "__"));
    let backup_abs = dest_root.join(&backup_rel);
    let parent = backup_abs.parent().unwrap_or(dest_root);
    dir_gate.ensure(parent).map_err(io_to_exec)?;
    fs::rename(dest, &backup_abs).map_err(io_to_exec)?;
    Ok(backup_rel)
}

fn staging_path(dest: &Path) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("staged");
    parent.join(format!(".{name}.dsp-tmp-{}", std::process::id()))
}

fn stream_to_staging(
    source: &Path,
    staging: &Path,
    cancel: &AtomicBool,
    verify: bool,
) -> Result<(u64, Option<[u8; 32]>), ExecError> {
    let src_file = File::open(source).map_err(io_to_exec)?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_BYTES, src_file);
    let staged_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(staging)
        .map_err(io_to_exec)?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, staged_file);

    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    let mut hasher = verify.then(Sha256Stream::new);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(ExecError::Cancelled);
        }
        let read = reader.read(&mut buf).map_err(io_to_exec)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read]).map_err(io_to_exec)?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&buf[..read]);
        }
        total += read as u64;
    }
    writer.flush().map_err(io_to_exec)?;
    writer.get_ref().sync_all().map_err(io_to_exec)?;

    Ok((total, hasher.map(Sha256Stream::finalize)))
}

fn verify_digest(dest: &Path, expected: &[u8; 32]) -> io::Result<bool> {
    let mut file = File::open(dest)?;
    let mut hasher = Sha256Stream::new();
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(&hasher.finalize() == expected)
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(target: &str, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn symlink(_target: &str, _dest: &Path) -> io::Result<()> {
    Err(io::Error::other("symlinks are not supported on this platform"))
}

fn io_to_exec(err: io::Error) -> ExecError {
    ExecError::Op(OpError::classify_io(&err))
}

/// Failure modes surfaced while applying a single [`dsp_core::Operation`].
#[derive(Debug)]
pub enum ExecError {
    /// The run was cancelled while this operation was in flight.
    Cancelled,
    /// A retriable-or-not I/O failure, already classified.
    Op(OpError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_new_file_streams_content_atomically() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.txt");
        fs::write(&source, b"hello world").unwrap();
        let dest = dir.path().join("out/dest.txt");

        let gate = DirGate::new();
        let cancel = AtomicBool::new(false);
        let applied = copy_new_file(&source, &dest, &gate, &cancel, false).unwrap();

        assert_eq!(applied.bytes, 11);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert_eq!(applied.undo, UndoInfo::None);
    }

    #[test]
    fn copy_new_file_with_verify_confirms_digest() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.txt");
        fs::write(&source, b"verify me").unwrap();
        let dest = dir.path().join("dest.txt");

        let gate = DirGate::new();
        let cancel = AtomicBool::new(false);
        let applied = copy_new_file(&source, &dest, &gate, &cancel, true).unwrap();
        assert_eq!(applied.verified, Some(true));
    }

    #[test]
    fn cancelled_copy_leaves_no_staging_file_behind() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.txt");
        fs::write(&source, vec![0u8; COPY_BUFFER_BYTES * 3]).unwrap();
        let dest = dir.path().join("dest.txt");

        let gate = DirGate::new();
        let cancel = AtomicBool::new(true);
        let result = copy_new_file(&source, &dest, &gate, &cancel, false);

        assert!(matches!(result, Err(ExecError::Cancelled)));
        assert!(!dest.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("dsp-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn update_existing_file_backs_up_old_content_and_records_undo() {
        let dir = tempdir().unwrap();
        let dest_root = dir.path();
        fs::write(dest_root.join("a.txt"), b"old").unwrap();
        let source = dest_root.join("new.txt");
        fs::write(&source, b"new content").unwrap();

        let gate = DirGate::new();
        let cancel = AtomicBool::new(false);
        let applied = update_existing_file(
            &source,
            &dest_root.join("a.txt"),
            dest_root,
            "a.txt",
            7,
            Mode::Sync,
            "2026-07-27",
            &gate,
            &cancel,
            false,
        )
        .unwrap();

        assert_eq!(fs::read(dest_root.join("a.txt")).unwrap(), b"new content");
        match applied.undo {
            UndoInfo::BackupPath(path) => {
                assert_eq!(fs::read(dest_root.join(&path)).unwrap(), b"old");
            }
            other => panic!("expected BackupPath, got {other:?}"),
        }
    }

    #[test]
    fn update_existing_file_in_safety_net_mode_quarantines_old_content() {
        let dir = tempdir().unwrap();
        let dest_root = dir.path();
        fs::write(dest_root.join("a.txt"), b"old").unwrap();
        let source = dest_root.join("new.txt");
        fs::write(&source, b"new content").unwrap();

        let gate = DirGate::new();
        let cancel = AtomicBool::new(false);
        let applied = update_existing_file(
            &source,
            &dest_root.join("a.txt"),
            dest_root,
            "a.txt",
            7,
            Mode::SafetyNet,
            "2026-07-27",
            &gate,
            &cancel,
            false,
        )
        .unwrap();

        assert_eq!(fs::read(dest_root.join("a.txt")).unwrap(), b"new content");
        match applied.undo {
            UndoInfo::SafetyNetPath(path) => {
                assert_eq!(path, ".SafetyNet/2026-07-27/a.txt");
                assert_eq!(fs::read(dest_root.join(&path)).unwrap(), b"old");
            }
            other => panic!("expected SafetyNetPath, got {other:?}"),
        }
    }

    #[test]
    fn delete_entry_backs_up_instead_of_destroying_content() {
        let dir = tempdir().unwrap();
        let dest_root = dir.path();
        fs::write(dest_root.join("doomed.txt"), b"still here").unwrap();

        let gate = DirGate::new();
        let applied = delete_entry(&dest_root.join("doomed.txt"), dest_root, "doomed.txt", 3, &gate)
            .unwrap();

        assert!(!dest_root.join("doomed.txt").exists());
        match applied.undo {
            UndoInfo::BackupPath(path) => {
                assert_eq!(fs::read(dest_root.join(&path)).unwrap(), b"still here");
            }
            other => panic!("expected BackupPath, got {other:?}"),
        }
    }

    #[test]
    fn make_dir_is_idempotent_and_sets_mode() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("sub");
        let gate = DirGate::new();
        make_dir(&target, 0o755, &gate).unwrap();
        make_dir(&target, 0o755, &gate).unwrap();
        assert!(target.is_dir());
    }
}
