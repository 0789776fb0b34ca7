//! Operations emitted by the planner and consumed by the executor.

use serde::{Deserialize, Serialize};

/// Monotonic identifier, unique within a single run, assigned in plan order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct OpId(pub u64);

impl OpId {
    /// The first id issued by a fresh [`crate::operation::OpIdGenerator`].
    pub const FIRST: Self = Self(1);

    /// Returns the next id in sequence.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Monotonic [`OpId`] generator owned by the planner for the duration of one run.
#[derive(Debug, Default)]
pub struct OpIdGenerator {
    next: u64,
}

impl OpIdGenerator {
    /// Creates a generator that issues ids starting at [`OpId::FIRST`].
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issues the next [`OpId`].
    pub fn issue(&mut self) -> OpId {
        let id = OpId(self.next);
        self.next += 1;
        id
    }
}

/// A single planned mutation against the destination tree.
///
/// Every variant carries the normalized relative path it applies to; the
/// planner guarantees at most one [`Operation`] per relative path per run
/// (`spec.md` §3 invariant).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Copy a source-only file into the destination.
    Copy {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the new file.
        rel: String,
        /// Size in bytes, used for progress totals.
        size: u64,
    },
    /// Overwrite a destination file whose content differs from the source.
    UpdateFile {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the changed file.
        rel: String,
        /// New size in bytes.
        size: u64,
    },
    /// Create a destination directory ahead of any operation that writes into it.
    MkDir {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the directory.
        rel: String,
        /// Permission bits to apply.
        mode: u32,
    },
    /// Relocate a doomed destination entry under the dated SafetyNet bucket.
    MoveToSafetyNet {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the entry being quarantined.
        rel: String,
        /// `YYYY-MM-DD` bucket the entry is relocated under.
        bucket_date: String,
    },
    /// Remove a destination-only entry outright (clone mode).
    Delete {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the entry being removed.
        rel: String,
    },
    /// Recreate a symbolic link once its containing directory exists.
    SymlinkCreate {
        /// Op identity, stable within a run.
        op_id: OpId,
        /// Relative path of the link.
        rel: String,
        /// Target the link points at.
        target: String,
    },
}

impl Operation {
    /// The op id carried by every variant.
    #[must_use]
    pub const fn op_id(&self) -> OpId {
        match self {
            Self::Copy { op_id, .. }
            | Self::UpdateFile { op_id, .. }
            | Self::MkDir { op_id, .. }
            | Self::MoveToSafetyNet { op_id, .. }
            | Self::Delete { op_id, .. }
            | Self::SymlinkCreate { op_id, .. } => *op_id,
        }
    }

    /// The relative path carried by every variant.
    #[must_use]
    pub fn rel(&self) -> &str {
        match self {
            Self::Copy { rel, .. }
            | Self::UpdateFile { rel, .. }
            | Self::MkDir { rel, .. }
            | Self::MoveToSafetyNet { rel, .. }
            | Self::Delete { rel, .. }
            | Self::SymlinkCreate { rel, .. } => rel,
        }
    }

    /// Size in bytes this operation contributes to progress totals; `0` for
    /// operations that do not stream file content.
    #[must_use]
    pub const fn size_hint(&self) -> u64 {
        match self {
            Self::Copy { size, .. } | Self::UpdateFile { size, .. } => *size,
            Self::MkDir { .. }
            | Self::MoveToSafetyNet { .. }
            | Self::Delete { .. }
            | Self::SymlinkCreate { .. } => 0,
        }
    }

    /// A short tag used in log lines and the dry-run plan report.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::UpdateFile { .. } => "update",
            Self::MkDir { .. } => "mkdir",
            Self::MoveToSafetyNet { .. } => "safety_net",
            Self::Delete { .. } => "delete",
            Self::SymlinkCreate { .. } => "symlink",
        }
    }
}
