#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_core` holds the data model and error taxonomy shared by every crate in
//! the DiskSyncPro workspace: the [`Job`](job::Job) configuration record, the
//! [`Tree`](tree::Tree)/[`FileRecord`](record::FileRecord) scan representation,
//! the [`Operation`](operation::Operation) variants emitted by the planner,
//! the durable [`JournalEntry`](journal_entry::JournalEntry) and
//! [`Checkpoint`](checkpoint::Checkpoint) records, the end-of-run
//! [`Snapshot`](snapshot::Snapshot)/[`Index`](snapshot::Index)/
//! [`Summary`](summary::Summary) artifacts, and the
//! [`ProgressEvent`](progress::ProgressEvent) stream consumed by the UI
//! collaborator.
//!
//! # Design
//!
//! Nothing in this crate touches the filesystem. Scanner, planner, journal,
//! safety-net, and engine crates depend on `dsp_core` for shapes and borrow
//! them read-only or mutate them through narrow, documented APIs; this crate
//! never reaches back into its dependents.
//!
//! # Invariants
//!
//! - Every relative path reaching a [`FileRecord`] or [`Operation`] has
//!   already been normalized by [`paths::normalize_relative`] — no leading
//!   separator, no `.`/`..` components.
//! - [`error::ExitCode`] values match the process exit codes documented in
//!   `spec.md` §6 exactly, so the CLI binary can forward them unchanged.

pub mod checkpoint;
pub mod error;
pub mod job;
pub mod journal_entry;
pub mod operation;
pub mod paths;
pub mod progress;
pub mod record;
pub mod snapshot;
pub mod summary;
pub mod tree;

pub use checkpoint::Checkpoint;
pub use error::{
    CheckpointError, ConfigError, ExitCode, JournalError, OpError, PlanError, ScanWarning,
};
pub use job::{Job, Mode};
pub use journal_entry::{JournalEntry, Phase as JournalPhase, UndoInfo};
pub use operation::{Operation, OpId};
pub use progress::{Phase, ProgressEvent};
pub use record::{FileRecord, Kind};
pub use snapshot::{Index, IndexEntry, Snapshot};
pub use summary::Summary;
pub use tree::Tree;
