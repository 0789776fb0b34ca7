#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_cli` is the thin command-line front-end for DiskSyncPro. It owns
//! argument parsing ([`Cli`]/[`Command`] via [`clap`]), TOML job
//! configuration loading ([`config`]), `tracing` subscriber setup
//! ([`logging`]), and human-readable rendering of a run's outcome
//! ([`report`]). All actual scan/plan/execute/rollback work is delegated to
//! [`dsp_engine::Engine`].
//!
//! # Design
//!
//! [`run`] takes a generic argument iterator and stdout/stderr writers,
//! mirroring the workspace convention of keeping process I/O out of `main`
//! so the dispatch logic stays testable without spawning a subprocess.
//!
//! # Invariants
//!
//! - `run` never panics on malformed input; every failure path returns a
//!   [`dsp_core::ExitCode`] matching `spec.md` §6.
//! - `backup` refuses to start over a job with an un-consumed checkpoint
//!   unless `--resume` is passed (`spec.md` §4.5).

pub mod config;
pub mod logging;
pub mod report;

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use dsp_core::ExitCode;
use dsp_engine::Engine;

use config::JobOverrides;

/// Capacity of the progress event channel between the engine and the
/// logging consumer thread below. Generous enough that a healthy consumer
/// never triggers a drop; bounded so an unresponsive one does (`spec.md` §5).
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Top-level command line, parsed by [`clap`]'s derive API.
#[derive(Debug, Parser)]
#[command(name = "dsp", version, about = "Journaled, resumable file-tree backup engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Increases log verbosity (repeatable); `RUST_LOG` overrides this when set.
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// The two subcommands `spec.md` §6 exposes to the UI collaborator.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scans, plans, and (unless `--dry-run`) executes one configured job.
    Backup {
        /// Path to the TOML job configuration file.
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
        /// Name of the `[jobs.<name>]` table to run.
        #[arg(short = 'j', long = "job")]
        job: String,
        /// Produce and report the plan without touching the destination.
        #[arg(long)]
        dry_run: bool,
        /// Consult a prior checkpoint for this job instead of requiring a clean start.
        #[arg(long)]
        resume: bool,
        /// Re-hash every copied/updated file against the source after writing it.
        #[arg(long)]
        verify: bool,
    },
    /// Reverses a prior run by replaying its journal backwards.
    Rollback {
        /// Path to the destination-side journal copy
        /// (`<dest_root>/.DiskSyncPro/<job>.journal.jsonl`).
        #[arg(short = 'f', long = "journal")]
        journal: PathBuf,
        /// Report what would be reversed without touching the filesystem.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Parses `args`, runs the requested subcommand, and writes its
/// human-readable report to `stdout`/`stderr`.
///
/// Returns the [`ExitCode`] the process should exit with; argument parsing
/// failures are reported on `stderr` and map to
/// [`ExitCode::ConfigOrArgument`].
pub fn run<I, T, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let target: &mut dyn Write = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => stdout,
                _ => stderr,
            };
            let _ = write!(target, "{err}");
            return if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                ExitCode::Success
            } else {
                ExitCode::ConfigOrArgument
            };
        }
    };

    logging::init(cli.verbose);

    match cli.command {
        Command::Backup {
            config,
            job,
            dry_run,
            resume,
            verify,
        } => run_backup(&config, &job, dry_run, resume, verify, stdout, stderr),
        Command::Rollback { journal, dry_run } => run_rollback(&journal, dry_run, stdout, stderr),
    }
}

/// Converts an [`ExitCode`] to [`std::process::ExitCode`] for `main` to return.
#[must_use]
pub fn exit_code_from(code: ExitCode) -> std::process::ExitCode {
    std::process::ExitCode::from(code.as_i32() as u8)
}

fn run_backup<Out: Write, Err: Write>(
    config_path: &Path,
    job_name: &str,
    dry_run: bool,
    resume: bool,
    verify: bool,
    stdout: &mut Out,
    stderr: &mut Err,
) -> ExitCode {
    let overrides = JobOverrides {
        dry_run,
        resume,
        verify,
    };
    let job = match config::load_job(config_path, job_name, overrides) {
        Ok(job) => job,
        Err(err) => {
            let _ = writeln!(stderr, "{err}");
            return ExitCode::ConfigOrArgument;
        }
    };

    let project_log_dir = project_logs_dir(config_path);
    if !job.resume {
        let checkpoint_path = project_log_dir.join(format!("checkpoint_{}.json", job.name));
        if checkpoint_path.exists() {
            let _ = writeln!(
                stderr,
                "{}",
                dsp_core::ConfigError::CheckpointRequiresResume(job.name.clone())
            );
            return ExitCode::ConfigOrArgument;
        }
    }

    // Bounded: spec.md §5 calls for a full UI channel to drop older progress
    // events rather than stall the run; `ProgressEmitter::record` already
    // uses `try_send`, so only a bounded channel gives that drop anywhere to
    // happen.
    let (progress_tx, progress_rx) = crossbeam_channel::bounded(PROGRESS_CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let signal_cancel = Arc::clone(&cancel);
    // Best-effort: a process that already has a handler installed (e.g. under
    // a test harness) simply keeps its own; Ctrl-C still arrives as SIGINT.
    let _ = ctrlc::set_handler(move || signal_cancel.store(true, Ordering::SeqCst));

    let progress_thread = std::thread::spawn(move || {
        for event in progress_rx.iter() {
            tracing::info!(
                job = %event.job,
                done = event.done,
                total = event.total,
                bytes_done = event.bytes_done,
                bytes_total = event.bytes_total,
                phase = ?event.phase,
                current = %event.current_rel,
                "progress"
            );
        }
    });

    let report = Engine::run(&job, &project_log_dir, progress_tx, cancel);
    let _ = progress_thread.join();

    let report = match report {
        Ok(report) => report,
        Err(err) => {
            let _ = writeln!(stderr, "{err}");
            return ExitCode::Fatal;
        }
    };

    if job.dry_run {
        let _ = report::render_plan(stdout, &report.plan);
    } else {
        let _ = report::render_summary(
            stdout,
            &job.name,
            &report.summary,
            &report.warnings,
            report.exit_code,
        );
    }

    report.exit_code
}

fn run_rollback<Out: Write, Err: Write>(
    journal_path: &Path,
    dry_run: bool,
    stdout: &mut Out,
    stderr: &mut Err,
) -> ExitCode {
    let (dsink_dir, job_name) = match parse_journal_path(journal_path) {
        Ok(parsed) => parsed,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            return ExitCode::ConfigOrArgument;
        }
    };
    let Some(dest_root) = dsink_dir.parent().map(Path::to_path_buf) else {
        let _ = writeln!(
            stderr,
            "journal path has no destination root: {}",
            journal_path.display()
        );
        return ExitCode::ConfigOrArgument;
    };

    match Engine::rollback(&dsink_dir, &dest_root, &job_name, dry_run) {
        Ok(rollback_report) => {
            let _ = report::render_rollback(stdout, &rollback_report);
            ExitCode::Success
        }
        Err(err) => {
            let _ = writeln!(stderr, "{err}");
            ExitCode::Fatal
        }
    }
}

/// Splits `-f <journal_path>` into the `.DiskSyncPro` sink directory and the
/// job name. The canonical destination-side layout
/// (`<dest_root>/.DiskSyncPro/<job>.journal.jsonl`) is required so
/// `dest_root` is recoverable without a separate flag, matching the two-flag
/// surface `spec.md` §6 documents for `rollback`.
fn parse_journal_path(journal_path: &Path) -> Result<(PathBuf, String), String> {
    let file_name = journal_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("not a valid journal file path: {}", journal_path.display()))?;
    let job_name = file_name
        .strip_suffix(".journal.jsonl")
        .ok_or_else(|| format!("expected a `<job>.journal.jsonl` file, got `{file_name}`"))?
        .to_string();

    let parent = journal_path.parent().ok_or_else(|| {
        format!(
            "journal path has no parent directory: {}",
            journal_path.display()
        )
    })?;
    if parent.file_name().and_then(|n| n.to_str()) != Some(dsp_filters::METADATA_DIR) {
        return Err(format!(
            "-f must point at the destination-side journal copy under `<dest_root>/{}/`",
            dsp_filters::METADATA_DIR
        ));
    }

    Ok((parent.to_path_buf(), job_name))
}

/// Workspace-local mirror directory for a config file's journal/checkpoint
/// artifacts, kept alongside the config itself (`spec.md` §6: "a mirror of
/// the non-checkpoint artifacts is written under the project's `logs/`
/// directory").
fn project_logs_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap_or_else(|| Path::new(".")).join("logs")
}
