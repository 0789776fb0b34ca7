#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_engine` is the orchestration layer: [`Engine::run`] wires the
//! scanner, planner, journal, safety-net, and copy worker pool into the
//! single end-to-end flow documented in `spec.md` §4.8 — scan, plan, open
//! journal, execute, write metadata on success, delete the checkpoint,
//! close the journal. [`Engine::rollback`] reverses a prior run from its
//! journal, used both automatically (a journal sink going completely
//! unwritable mid-run) and on demand by the `rollback` CLI subcommand.
//!
//! # Design
//!
//! Everything that touches the filesystem during a run funnels through
//! [`pool::RunContext`]: a single [`writer::SharedJournal`] behind a mutex,
//! a shared [`dirgate::DirGate`], an atomic cancel flag, and a
//! [`progress::ProgressEmitter`]. `Engine::run` builds that context once
//! per job and tears it down before deciding the run's outcome.
//!
//! # Invariants
//!
//! - A journal is opened before any operation is applied; dry-run plans
//!   never open one (`spec.md` §4.2).
//! - [`Engine::run`] returns an `exit_code` matching `spec.md` §6 exactly.

pub mod backoff;
pub mod copy;
pub mod dirgate;
pub mod dirprogress;
pub mod metadata;
pub mod pool;
pub mod progress;
pub mod rollback;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, Utc};
use crossbeam_channel::Sender;
use dsp_core::operation::Operation;
use dsp_core::progress::Phase as ProgressPhase;
use dsp_core::{Checkpoint, Job, ProgressEvent, ScanWarning, Summary};
use dsp_filters::ExcludeSet;
use dsp_journal::Journal;
use thiserror::Error;

pub use dsp_journal::RollbackReport;

/// Failure modes surfaced by [`Engine::run`] before or after the copy
/// phase; per-operation failures never reach this type (they are recorded
/// in the [`Summary`] and journal instead, per `spec.md` §7).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The exclude pattern list failed to compile.
    #[error("invalid exclude patterns: {0}")]
    Filters(#[from] dsp_filters::PatternError),
    /// A root could not be opened for scanning.
    #[error("scan failed: {0}")]
    Scan(#[from] dsp_scanner::ScanError),
    /// The planner rejected the scanned trees.
    #[error("planning failed: {0}")]
    Plan(#[from] dsp_core::PlanError),
    /// Both journal sinks were unwritable at open time, before any operation ran.
    #[error("journal could not be opened: {0}")]
    Journal(#[from] dsp_core::JournalError),
    /// A checkpoint could not be read or persisted.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] dsp_core::CheckpointError),
    /// An end-of-run metadata artifact could not be written.
    #[error("metadata write failed: {0}")]
    Metadata(#[from] metadata::MetadataError),
}

/// Outcome of one [`Engine::run`] invocation.
#[derive(Debug)]
pub struct RunReport {
    /// Accumulated counters for the run.
    pub summary: Summary,
    /// Process exit code, matching `spec.md` §6 exactly.
    pub exit_code: dsp_core::ExitCode,
    /// Per-entry scan failures recorded during this run.
    pub warnings: Vec<ScanWarning>,
    /// Set when the run was cancelled (checkpoint persisted for `--resume`).
    pub cancelled: bool,
    /// Set when a fatal journal failure forced an automatic rollback.
    pub rolled_back: bool,
    /// The operation plan, present even for a dry run (and otherwise equal
    /// to what was actually attempted).
    pub plan: Vec<Operation>,
}

/// Path layout for one job's durable artifacts, computed once per run.
struct Paths {
    dest_root: PathBuf,
    checkpoint_path: PathBuf,
    timestamp: String,
}

impl Paths {
    fn new(job: &Job, project_log_dir: &Path) -> Self {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        Self {
            dest_root: job.dest_root.clone(),
            checkpoint_path: project_log_dir.join(format!("checkpoint_{}.json", job.name)),
            timestamp,
        }
    }
}

/// Orchestrates scan → plan → journal → execute → finalize for one [`Job`].
pub struct Engine;

impl Engine {
    /// Runs `job` to completion (or cancellation), emitting [`ProgressEvent`]s
    /// on `progress_tx` and polling `cancel` between operations.
    ///
    /// `project_log_dir` is the workspace-local mirror of the destination's
    /// `.DiskSyncPro/` sink (`spec.md` §6: "a mirror of the non-checkpoint
    /// artifacts is written under the project's `logs/` directory").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for failures that occur before any operation
    /// is attempted (unreadable root, unopenable journal) or while writing
    /// end-of-run metadata. Per-operation failures never surface here; they
    /// are counted in [`RunReport::summary`] instead.
    pub fn run(
        job: &Job,
        project_log_dir: &Path,
        progress_tx: Sender<ProgressEvent>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RunReport, EngineError> {
        let paths = Paths::new(job, project_log_dir);
        let exclude = ExcludeSet::compile(&job.exclude)?;

        let checkpoint = if job.resume {
            match dsp_journal::read_checkpoint(&paths.checkpoint_path) {
                Ok(checkpoint) => Some(checkpoint),
                Err(dsp_core::CheckpointError::Io(err))
                    if err.kind() == std::io::ErrorKind::NotFound =>
                {
                    None
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            None
        };

        let progress = Arc::new(progress::ProgressEmitter::new(
            progress_tx,
            job.name.clone(),
            0,
            0,
        ));
        progress.emit_phase(ProgressPhase::Scanning);

        let mut warnings = Vec::new();
        let source_outcome = dsp_scanner::scan(&job.source_root, &exclude, None)?;
        warnings.extend(source_outcome.warnings);

        let completed_dirs = checkpoint.as_ref().map(|c| &c.completed_dirs);
        let dest_outcome = dsp_scanner::scan(&job.dest_root, &exclude, completed_dirs)?;
        warnings.extend(dest_outcome.warnings);

        progress.emit_phase(ProgressPhase::Planning);
        let bucket_date = Local::now().format("%Y-%m-%d").to_string();
        let plan = dsp_planner::plan(
            job,
            &source_outcome.tree,
            &dest_outcome.tree,
            &bucket_date,
            checkpoint.as_ref(),
            dsp_planner::DEFAULT_MTIME_TOLERANCE_SECS,
        )?;

        let mut summary = Summary::new();
        summary.scan_warnings = warnings.len() as u64;

        if job.dry_run {
            progress.emit_phase(ProgressPhase::Finalizing);
            return Ok(RunReport {
                summary,
                exit_code: dsp_core::ExitCode::Success,
                warnings,
                cancelled: false,
                rolled_back: false,
                plan,
            });
        }

        let started_at_ms = now_ms();
        let journal = Journal::open(project_log_dir, &paths.dest_root, &job.name)?;
        let journal_state =
            writer::JournalState::new(journal, checkpoint.unwrap_or_default(), paths.checkpoint_path.clone());

        let total_ops = plan.len() as u64;
        let bytes_total: u64 = plan.iter().map(Operation::size_hint).sum();
        let progress = Arc::new(progress::ProgressEmitter::new(
            progress.sender(),
            job.name.clone(),
            total_ops,
            bytes_total,
        ));

        let journal_fatal = Arc::new(AtomicBool::new(false));
        let dir_gate = dirgate::DirGate::new();
        let dir_progress = dirprogress::DirProgress::from_plan(&plan);
        let ctx = pool::RunContext {
            job,
            source_root: &job.source_root,
            dest_root: &paths.dest_root,
            bucket_date: &bucket_date,
            dir_gate,
            dir_progress,
            cancel: Arc::clone(&cancel),
            journal: Arc::new(Mutex::new(journal_state)),
            progress: Arc::clone(&progress),
            summary: Mutex::new(summary),
            journal_fatal: Arc::clone(&journal_fatal),
        };

        let (creates, destructive): (Vec<_>, Vec<_>) = plan
            .iter()
            .cloned()
            .partition(|op| !matches!(op, Operation::Delete { .. } | Operation::MoveToSafetyNet { .. }));

        let worker_count = default_worker_count(job);
        pool::run_parallel(&creates, &ctx, worker_count);
        if !journal_fatal.load(Ordering::SeqCst) {
            pool::run_sequential(&destructive, &ctx);
        }

        progress.emit_phase(ProgressPhase::Finalizing);

        let finished_at_ms = now_ms();
        let mut summary = ctx.summary.into_inner().unwrap_or_else(|e| e.into_inner());
        summary.scan_warnings = warnings.len() as u64;
        summary.set_duration(std::time::Duration::from_millis(
            (finished_at_ms - started_at_ms).max(0) as u64,
        ));

        let cancelled = cancel.load(Ordering::SeqCst) && !journal_fatal.load(Ordering::SeqCst);
        let fatal = journal_fatal.load(Ordering::SeqCst);

        let mut journal_state = Arc::try_unwrap(ctx.journal)
            .map(|mutex| mutex.into_inner().unwrap_or_else(|e| e.into_inner()))
            .unwrap_or_else(|_| unreachable!("RunContext does not leak journal handles"));

        if fatal {
            progress.emit_phase(ProgressPhase::RollingBack);
            let report = rollback::rollback_job(project_log_dir, &paths.dest_root, &job.name, false)?;
            tracing::error!(reversed = report.reversed, "automatic rollback after fatal journal failure");
            journal_state.delete_checkpoint()?;
            return Ok(RunReport {
                summary,
                exit_code: dsp_core::ExitCode::Fatal,
                warnings,
                cancelled: false,
                rolled_back: true,
                plan,
            });
        }

        if cancelled {
            journal_state.persist_checkpoint()?;
            return Ok(RunReport {
                summary,
                exit_code: dsp_core::ExitCode::Cancelled,
                warnings,
                cancelled: true,
                rolled_back: false,
                plan,
            });
        }

        let final_dest = dsp_scanner::scan(&paths.dest_root, &exclude, None)?;
        let snapshot = metadata::build_snapshot(&job.name, started_at_ms, finished_at_ms, summary, final_dest.tree);
        metadata::write_run_metadata(
            project_log_dir,
            &paths.dest_root,
            &job.name,
            &paths.timestamp,
            &snapshot,
        )?;
        journal_state.delete_checkpoint()?;

        let exit_code = if snapshot.summary.is_partial() {
            dsp_core::ExitCode::Partial
        } else {
            dsp_core::ExitCode::Success
        };

        Ok(RunReport {
            summary: snapshot.summary,
            exit_code,
            warnings,
            cancelled: false,
            rolled_back: false,
            plan,
        })
    }

    /// Reverses a prior run by replaying its journal backwards. Delegates
    /// to [`rollback::rollback_job`]; exposed here so callers depend only
    /// on `dsp_engine` rather than reaching into its submodules.
    ///
    /// # Errors
    ///
    /// Returns a [`dsp_core::JournalError`] if the journal cannot be read
    /// or a filesystem reversal fails.
    pub fn rollback(
        project_log_dir: &Path,
        dest_root: &Path,
        job_name: &str,
        dry_run: bool,
    ) -> Result<RollbackReport, dsp_core::JournalError> {
        rollback::rollback_job(project_log_dir, dest_root, job_name, dry_run)
    }
}

/// `min(job.threads, logical_cpus, 8)` (`spec.md` §4.3), but never below 1.
fn default_worker_count(job: &Job) -> usize {
    let logical = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4);
    job.effective_threads().min(logical).min(8).max(1)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
