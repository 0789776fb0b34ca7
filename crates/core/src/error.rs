//! Error taxonomy shared across the workspace (`spec.md` §7).
//!
//! Each enum here corresponds to one row of the taxonomy table in `spec.md`
//! §7. [`ExitCode`] is the single place that taxonomy maps onto the
//! process exit codes documented in `spec.md` §6.

use std::path::PathBuf;

use thiserror::Error;

/// Process exit codes, matching `spec.md` §6 exactly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Run completed with no skips or failures.
    Success = 0,
    /// Run completed but some operations were skipped.
    Partial = 1,
    /// A fatal error occurred and the engine rolled back.
    Fatal = 2,
    /// The run was cancelled; a checkpoint was persisted for `--resume`.
    Cancelled = 3,
    /// The job configuration or CLI arguments were invalid.
    ConfigOrArgument = 4,
}

impl ExitCode {
    /// The raw integer value a process should exit with.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Fatal configuration failures, raised before any journal is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The job configuration file could not be read.
    #[error("could not read config file {path}: {source}")]
    Unreadable {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The job configuration file is not valid TOML or does not match the schema.
    #[error("could not parse config file {path}: {source}")]
    Malformed {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
    /// The requested job name is not present in the configuration file.
    #[error("no job named `{0}` in config")]
    UnknownJob(String),
    /// The job's `mode` field did not match `clone`, `sync`, or `safety_net`.
    #[error("invalid mode `{0}`: expected clone, sync, or safety_net")]
    InvalidMode(String),
    /// The job's source or destination root could not be accessed.
    #[error("root {path} is not accessible: {source}")]
    UnreadableRoot {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A prior checkpoint exists for this job but `--resume` was not supplied.
    #[error(
        "a checkpoint for job `{0}` already exists; pass --resume to continue it or remove it to start over"
    )]
    CheckpointRequiresResume(String),
    /// One of the job's `exclude` patterns failed to compile as a glob.
    #[error("invalid exclude pattern in config: {0}")]
    InvalidExcludePattern(String),
}

/// Recoverable per-entry scan failure; the entry is omitted from the [`crate::tree::Tree`].
#[derive(Clone, Debug, Error)]
#[error("scan warning at {rel}: {reason}")]
pub struct ScanWarning {
    /// Relative path of the entry that could not be scanned.
    pub rel: String,
    /// Human-readable reason, typically the `io::Error` message.
    pub reason: String,
}

/// Fatal planner failures.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A computed destination path escaped its declared root.
    #[error("planned path `{rel}` escapes its root: {source}")]
    PathEscape {
        /// Relative path that triggered the escape.
        rel: String,
        /// Underlying path-normalization failure.
        #[source]
        source: crate::paths::PathError,
    },
    /// Two source entries normalized to the same relative path and could not be reconciled.
    #[error("unresolvable collision at `{0}`")]
    UnresolvableCollision(String),
}

/// Reason a single operation could not be completed.
#[derive(Clone, Debug, Error)]
pub enum OpError {
    /// Transient failure; the operation is retried with backoff.
    #[error("{0}")]
    Retriable(String),
    /// Failure classed as non-retriable; the operation is marked `skipped` immediately.
    #[error("{0}")]
    NonRetriable(String),
}

impl OpError {
    /// Reports whether this error should trigger another retry attempt.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    /// Classifies a raw I/O error using the rules in `spec.md` §7: permission
    /// denial, out-of-space, and invalid-path errors are non-retriable;
    /// everything else is treated as transient.
    #[must_use]
    pub fn classify_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = err.to_string();
        match err.kind() {
            ErrorKind::PermissionDenied | ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                Self::NonRetriable(message)
            }
            ErrorKind::StorageFull => Self::NonRetriable(message),
            _ => Self::Retriable(message),
        }
    }
}

/// Fatal journal/checkpoint persistence failures.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Both the project-log and destination-side journal sinks are unwritable.
    #[error("both journal sinks are unwritable: {0}")]
    BothSinksUnwritable(String),
    /// One journal sink failed to write or flush; the other remains durable.
    #[error("journal sink degraded: {0}")]
    SinkDegraded(String),
    /// The journal file could not be parsed during rollback.
    #[error("could not parse journal {path}: {source}")]
    Corrupt {
        /// Path of the journal file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// An underlying I/O failure occurred while reading or writing journal state.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal checkpoint persistence failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint file could not be parsed.
    #[error("could not parse checkpoint {path}: {source}")]
    Corrupt {
        /// Path of the checkpoint file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// An underlying I/O failure occurred while reading or writing the checkpoint.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_io_marks_permission_denied_non_retriable() {
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!OpError::classify_io(&err).is_retriable());
    }

    #[test]
    fn classify_io_marks_interrupted_retriable() {
        let err = std::io::Error::from(std::io::ErrorKind::Interrupted);
        assert!(OpError::classify_io(&err).is_retriable());
    }

    #[test]
    fn exit_codes_match_spec_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Partial.as_i32(), 1);
        assert_eq!(ExitCode::Fatal.as_i32(), 2);
        assert_eq!(ExitCode::Cancelled.as_i32(), 3);
        assert_eq!(ExitCode::ConfigOrArgument.as_i32(), 4);
    }
}
