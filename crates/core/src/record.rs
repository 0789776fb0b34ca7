//! Per-entry metadata gathered by the scanner.

use serde::{Deserialize, Serialize};

/// Kind of filesystem entry a [`FileRecord`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link (never followed by the scanner).
    Symlink,
}

/// Sub-second precision retained alongside an integer mtime so comparisons
/// stay exact across filesystems that disagree on resolution (`spec.md`
/// §3, Open Questions).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MTime {
    /// Whole seconds since the Unix epoch.
    pub secs: i64,
    /// Sub-second remainder, in nanoseconds.
    pub nanos: u32,
}

impl MTime {
    /// Builds an [`MTime`] from seconds and a nanosecond remainder.
    #[must_use]
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Compares two timestamps allowing for `tolerance` seconds of slop,
    /// used when the source and destination filesystems round mtimes to
    /// different resolutions (`spec.md` §9, Open Questions).
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance_secs: i64) -> bool {
        if tolerance_secs <= 0 {
            return self == other;
        }
        (self.secs - other.secs).abs() <= tolerance_secs
    }
}

/// One entry observed by the scanner, keyed by its normalized relative path
/// in the owning [`crate::tree::Tree`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// POSIX-normalized relative path, no leading separator.
    pub rel: String,
    /// Kind of entry.
    pub kind: Kind,
    /// Size in bytes; `0` for directories and symlinks.
    pub size: u64,
    /// Last-modified time.
    pub mtime: MTime,
    /// Unix-style permission bits.
    pub mode: u32,
    /// Target of the symlink, when `kind == Kind::Symlink`.
    pub symlink_target: Option<String>,
}

impl FileRecord {
    /// Builds a record for a regular file.
    #[must_use]
    pub fn file(rel: impl Into<String>, size: u64, mtime: MTime, mode: u32) -> Self {
        Self {
            rel: rel.into(),
            kind: Kind::File,
            size,
            mtime,
            mode,
            symlink_target: None,
        }
    }

    /// Builds a record for a directory.
    #[must_use]
    pub fn dir(rel: impl Into<String>, mtime: MTime, mode: u32) -> Self {
        Self {
            rel: rel.into(),
            kind: Kind::Dir,
            size: 0,
            mtime,
            mode,
            symlink_target: None,
        }
    }

    /// Builds a record for a symbolic link.
    #[must_use]
    pub fn symlink(rel: impl Into<String>, target: impl Into<String>, mtime: MTime) -> Self {
        Self {
            rel: rel.into(),
            kind: Kind::Symlink,
            size: 0,
            mtime,
            mode: 0o777,
            symlink_target: Some(target.into()),
        }
    }

    /// Depth of this entry, used to order directory creation/removal.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rel.matches('/').count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_respects_tolerance() {
        let a = MTime::new(100, 0);
        let b = MTime::new(101, 0);
        assert!(!a.approx_eq(b, 0));
        assert!(a.approx_eq(b, 1));
    }

    #[test]
    fn depth_counts_separators() {
        let top = FileRecord::file("a.txt", 3, MTime::default(), 0o644);
        let nested = FileRecord::file("dir/b.txt", 5, MTime::default(), 0o644);
        assert_eq!(top.depth(), 0);
        assert_eq!(nested.depth(), 1);
    }
}
