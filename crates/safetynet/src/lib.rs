#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_safetynet` relocates a destination entry doomed by clone/safety_net
//! policy into a dated quarantine bucket instead of deleting it outright
//! (`spec.md` §4.6): `<dest_root>/.SafetyNet/<YYYY-MM-DD>/<rel>`, preserving
//! the entry's relative structure so a user can find it again by path.
//!
//! The quarantine directory itself is excluded from scanning by
//! [`dsp_filters::ExcludeSet`], which always excludes
//! [`dsp_filters::SAFETY_NET_DIR`], so relocated entries are never
//! rediscovered as live tree content on a later run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use dsp_filters::SAFETY_NET_DIR;

/// Computes today's quarantine bucket directory, `<dest_root>/.SafetyNet/<date>`.
///
/// `date` is supplied by the caller (typically `YYYY-MM-DD`, matching
/// `spec.md` §4.6) rather than computed here, since this crate never reads
/// the system clock itself.
#[must_use]
pub fn bucket_dir(dest_root: &Path, date: &str) -> PathBuf {
    dest_root.join(SAFETY_NET_DIR).join(date)
}

/// Relocates the destination entry at `dest_root.join(rel)` into today's
/// quarantine bucket, preserving `rel`'s directory structure beneath it.
///
/// If the destination path within the bucket already exists (e.g. a file
/// with the same relative path was already quarantined once today), a
/// `(n)` suffix is appended before the extension, starting at `(1)` and
/// incrementing until a free name is found, matching `spec.md` §4.6.
///
/// Returns the path the entry was relocated to, relative to `dest_root`, so
/// it can be recorded as [`dsp_core::journal_entry::UndoInfo::SafetyNetPath`].
pub fn relocate(dest_root: &Path, rel: &str, date: &str) -> io::Result<String> {
    let source = dest_root.join(rel);
    let bucket = bucket_dir(dest_root, date);
    let target = bucket.join(rel);
    let parent = target.parent().unwrap_or(&bucket);
    fs::create_dir_all(parent)?;

    let target = disambiguate(&target)?;
    fs::rename(&source, &target)?;

    let relative = target
        .strip_prefix(dest_root)
        .unwrap_or(&target)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(relative)
}

/// Finds the first path among `target`, `target (1)`, `target (2)`, ... that
/// does not already exist on disk.
fn disambiguate(target: &Path) -> io::Result<PathBuf> {
    if !target.exists() {
        return Ok(target.to_path_buf());
    }

    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1..=u32::MAX {
        let name = match &extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(io::Error::other("exhausted SafetyNet collision suffixes"))
}
