#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_filters` compiles a job's `exclude` pattern list (`spec.md` §3) into
//! a [`globset::GlobSet`] pair and matches candidate entries against both
//! their basename and their full relative path, exactly as `spec.md` §2
//! specifies ("matched against both basename and relative path").
//!
//! # Design
//!
//! The scanner calls [`ExcludeSet::is_excluded`] before descending into a
//! directory so excluded subtrees are pruned rather than walked and
//! discarded (`spec.md` §4.1). SafetyNet quarantine directories are always
//! excluded in addition to the job's own patterns, preventing the scanner
//! from recursing into its own output (`spec.md` §4.6).

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// A pattern failed to compile as a glob.
#[derive(Debug, thiserror::Error)]
#[error("invalid exclude pattern `{pattern}`: {source}")]
pub struct PatternError {
    /// The offending pattern string.
    pub pattern: String,
    /// Underlying glob compilation failure.
    #[source]
    pub source: globset::Error,
}

/// Name of the quarantine directory the scanner always excludes.
pub const SAFETY_NET_DIR: &str = ".SafetyNet";
/// Name of the metadata directory the scanner always excludes.
pub const METADATA_DIR: &str = ".DiskSyncPro";

/// Compiled set of exclude patterns.
#[derive(Clone, Debug)]
pub struct ExcludeSet {
    set: GlobSet,
}

impl ExcludeSet {
    /// Compiles `patterns` together with the implicit SafetyNet/metadata
    /// directory exclusions.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if any pattern fails to compile as a glob.
    pub fn compile<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for implicit in [SAFETY_NET_DIR, METADATA_DIR] {
            push_pattern(&mut builder, implicit)?;
        }
        for pattern in patterns {
            push_pattern(&mut builder, pattern.as_ref())?;
        }
        let set = builder
            .build()
            .map_err(|source| PatternError {
                pattern: "<build>".to_string(),
                source,
            })?;
        Ok(Self { set })
    }

    /// Compiles an empty exclude set (still excludes SafetyNet/metadata dirs).
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] only if the implicit patterns somehow fail
    /// to compile, which does not happen in practice.
    pub fn empty() -> Result<Self, PatternError> {
        Self::compile::<_, &str>([])
    }

    /// Reports whether `rel` (a normalized relative path) should be pruned.
    ///
    /// Matches both the full relative path and the entry's basename, so a
    /// pattern like `*.tmp` excludes `a.tmp` wherever it appears in the tree.
    #[must_use]
    pub fn is_excluded(&self, rel: &str) -> bool {
        if self.set.is_match(rel) {
            return true;
        }
        let basename = Path::new(rel)
            .file_name()
            .map_or(rel, |name| name.to_str().unwrap_or(rel));
        self.set.is_match(basename)
    }
}

fn push_pattern(builder: &mut GlobSetBuilder, pattern: &str) -> Result<(), PatternError> {
    let glob = Glob::new(pattern).map_err(|source| PatternError {
        pattern: pattern.to_string(),
        source,
    })?;
    builder.add(glob);
    Ok(())
}
