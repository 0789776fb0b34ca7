//! Dispatches a planned operation list across worker threads (create-side
//! operations) or a single thread (destructive operations), applying
//! retries, journal/checkpoint bookkeeping, and progress emission uniformly
//! for both.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use dsp_core::progress::Phase as ProgressPhase;
use dsp_core::{Job, JournalError, Operation, OpError, Summary};

use crate::backoff;
use crate::copy::{self, ExecError};
use crate::dirgate::DirGate;
use crate::dirprogress::DirProgress;
use crate::progress::ProgressEmitter;
use crate::writer::SharedJournal;

/// Shared, read-mostly state every worker consults while applying operations.
pub struct RunContext<'a> {
    pub job: &'a Job,
    pub source_root: &'a Path,
    pub dest_root: &'a Path,
    /// `YYYY-MM-DD` bucket used for any SafetyNet relocation this run
    /// performs, including `UpdateFile` overwrites in [`dsp_core::Mode::SafetyNet`]
    /// (`spec.md` §4.2); the same value the planner stamped onto its
    /// `MoveToSafetyNet` operations.
    pub bucket_date: &'a str,
    pub dir_gate: DirGate,
    /// Per-directory pending-operation counters built from the full plan,
    /// consulted by [`commit`] to decide when a directory is fully
    /// processed rather than marking it complete the instant its own
    /// `MkDir` commits.
    pub dir_progress: DirProgress,
    pub cancel: Arc<AtomicBool>,
    pub journal: Arc<SharedJournal>,
    pub progress: Arc<ProgressEmitter>,
    pub summary: Mutex<Summary>,
    /// Set once a [`JournalError::BothSinksUnwritable`] is observed. Checked
    /// by the orchestrator after a run to decide whether to roll back.
    pub journal_fatal: Arc<AtomicBool>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Runs `ops` across `worker_count` threads pulling from a shared queue.
/// Safe to call with operations whose relative order does not matter
/// (copies, updates, directory creation, symlink recreation), since each
/// writer ensures its own parent directory through [`DirGate`] rather than
/// depending on a sibling `MkDir` having already run.
pub fn run_parallel(ops: &[Operation], ctx: &RunContext<'_>, worker_count: usize) {
    if ops.is_empty() {
        return;
    }
    let worker_count = worker_count.max(1).min(ops.len());
    let (sender, receiver) = crossbeam_channel::unbounded::<&Operation>();
    for op in ops {
        let _ = sender.send(op);
    }
    drop(sender);

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let receiver = receiver.clone();
            scope.spawn(move || {
                while let Ok(op) = receiver.recv() {
                    apply_one(op, ctx);
                }
            });
        }
    });
}

/// Runs `ops` on the calling thread, strictly in the order given. Used for
/// destructive operations (`MoveToSafetyNet`, `Delete`), which the planner
/// already sorts children-before-parents; running them out of order could
/// attempt to remove a directory before its last child is gone.
pub fn run_sequential(ops: &[Operation], ctx: &RunContext<'_>) {
    for op in ops {
        apply_one(op, ctx);
    }
}

fn apply_one(op: &Operation, ctx: &RunContext<'_>) {
    let op_id = op.op_id().0;
    let tag = op.tag();
    let rel = op.rel().to_string();

    if ctx.cancel.load(Ordering::Relaxed) {
        let mut journal = ctx.journal.lock().unwrap_or_else(|e| e.into_inner());
        note_journal_result(journal.record_skipped(op_id, tag, &rel, "cancelled", now_ms()), ctx);
        return;
    }

    {
        let mut journal = ctx.journal.lock().unwrap_or_else(|e| e.into_inner());
        note_journal_result(journal.record_started(op_id, tag, &rel, now_ms()), ctx);
    }

    let mut attempt = 0u32;
    loop {
        match perform(op, ctx) {
            Ok(applied) => {
                commit(op, applied.undo, ctx);
                bump_summary(op, &applied, ctx);
                ctx.progress
                    .record(&rel, applied.bytes, ProgressPhase::Copying, false);
                return;
            }
            Err(ExecError::Cancelled) => {
                let mut journal = ctx.journal.lock().unwrap_or_else(|e| e.into_inner());
                note_journal_result(
                    journal.record_skipped(op_id, tag, &rel, "cancelled", now_ms()),
                    ctx,
                );
                return;
            }
            Err(ExecError::Op(err)) => {
                if err.is_retriable() && attempt < ctx.job.retries {
                    let delay = backoff::delay_for_attempt(attempt);
                    thread::sleep(delay);
                    attempt += 1;
                    continue;
                }
                let reason = err.to_string();
                let mut journal = ctx.journal.lock().unwrap_or_else(|e| e.into_inner());
                note_journal_result(journal.record_failed(op_id, tag, &rel, &reason, now_ms()), ctx);
                drop(journal);
                ctx.summary.lock().unwrap_or_else(|e| e.into_inner()).failed += 1;
                ctx.progress.record(&rel, 0, ProgressPhase::Copying, false);
                return;
            }
        }
    }
}

/// A [`JournalError::BothSinksUnwritable`] means the run can no longer
/// account for what it does; it trips `journal_fatal` and `cancel` together
/// so every other worker stops promptly and the orchestrator rolls back.
fn note_journal_result(result: Result<(), JournalError>, ctx: &RunContext<'_>) {
    if let Err(JournalError::BothSinksUnwritable(_)) = result {
        ctx.journal_fatal.store(true, Ordering::SeqCst);
        ctx.cancel.store(true, Ordering::SeqCst);
    }
}

fn perform(op: &Operation, ctx: &RunContext<'_>) -> Result<copy::Applied, ExecError> {
    match op {
        Operation::Copy { rel, .. } => {
            let source = resolve(ctx.source_root, rel)?;
            let dest = resolve(ctx.dest_root, rel)?;
            copy::copy_new_file(&source, &dest, &ctx.dir_gate, &ctx.cancel, ctx.job.verify)
        }
        Operation::UpdateFile { rel, op_id, .. } => {
            let source = resolve(ctx.source_root, rel)?;
            let dest = resolve(ctx.dest_root, rel)?;
            copy::update_existing_file(
                &source,
                &dest,
                ctx.dest_root,
                rel,
                op_id.0,
                ctx.job.mode,
                ctx.bucket_date,
                &ctx.dir_gate,
                &ctx.cancel,
                ctx.job.verify,
            )
        }
        Operation::MkDir { rel, mode, .. } => {
            let dest = resolve(ctx.dest_root, rel)?;
            copy::make_dir(&dest, *mode, &ctx.dir_gate)
        }
        Operation::MoveToSafetyNet { rel, bucket_date, .. } => {
            copy::move_to_safety_net(ctx.dest_root, rel, bucket_date)
        }
        Operation::Delete { rel, op_id, .. } => {
            let dest = resolve(ctx.dest_root, rel)?;
            copy::delete_entry(&dest, ctx.dest_root, rel, op_id.0, &ctx.dir_gate)
        }
        Operation::SymlinkCreate { rel, target, .. } => {
            let dest = resolve(ctx.dest_root, rel)?;
            copy::create_symlink(&dest, target, &ctx.dir_gate)
        }
    }
}

fn resolve(root: &Path, rel: &str) -> Result<std::path::PathBuf, ExecError> {
    dsp_core::paths::resolve_within(root, rel)
        .map_err(|source| ExecError::Op(OpError::NonRetriable(source.to_string())))
}

fn commit(op: &Operation, undo: dsp_core::journal_entry::UndoInfo, ctx: &RunContext<'_>) {
    let mut journal = ctx.journal.lock().unwrap_or_else(|e| e.into_inner());
    note_journal_result(
        journal.record_committed(op.op_id().0, op.tag(), op.rel(), undo, now_ms()),
        ctx,
    );
    if !matches!(op, Operation::MkDir { .. }) {
        let _ = journal.mark_file_complete(op.rel());
    }
    for dir in ctx.dir_progress.complete(op) {
        let _ = journal.mark_dir_complete(&dir);
    }
}

fn bump_summary(op: &Operation, applied: &copy::Applied, ctx: &RunContext<'_>) {
    let mut summary = ctx.summary.lock().unwrap_or_else(|e| e.into_inner());
    summary.bytes_transferred += applied.bytes;
    match op {
        Operation::Copy { .. } => summary.copied += 1,
        Operation::UpdateFile { .. } => summary.updated += 1,
        Operation::MoveToSafetyNet { .. } => summary.moved_to_safety_net += 1,
        Operation::Delete { .. } => summary.deleted += 1,
        Operation::MkDir { .. } | Operation::SymlinkCreate { .. } => {}
    }
    if applied.verified == Some(false) {
        summary.failed += 1;
    }
}
