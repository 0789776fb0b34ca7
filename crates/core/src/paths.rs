//! Relative-path normalization and root-containment checks.
//!
//! Every [`crate::record::FileRecord`] and [`crate::operation::Operation`]
//! carries a path produced by [`normalize_relative`]; [`resolve_within`]
//! is the single choke point the scanner, planner, and executor use to
//! enforce the invariant that no path escapes its declared root (`spec.md`
//! §3, §8 property 1).

use std::path::{Component, Path, PathBuf};

/// Error returned when a path cannot be safely normalized or resolved.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PathError {
    /// The path contained a `..` component that would escape its root.
    #[error("path `{0}` escapes its root via a `..` component")]
    Escapes(String),
    /// The path was empty after normalization.
    #[error("path `{0}` normalizes to an empty relative path")]
    Empty(String),
}

/// Normalizes `path` to a POSIX-style relative path with no leading
/// separator and no `.`/`..` components.
///
/// # Errors
///
/// Returns [`PathError::Escapes`] if a `..` component is present, and
/// [`PathError::Empty`] if nothing remains after normalization.
pub fn normalize_relative(path: &Path) -> Result<String, PathError> {
    let display = path.display().to_string();
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => return Err(PathError::Escapes(display)),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty(display));
    }
    Ok(parts.join("/"))
}

/// Joins `root` with an already-normalized relative path and confirms the
/// result still lies within `root` lexically (no symlink resolution is
/// performed here; that is the executor's concern when it opens file
/// handles).
///
/// # Errors
///
/// Returns [`PathError::Escapes`] if `rel` is empty or contains traversal
/// components that a prior call to [`normalize_relative`] should already
/// have rejected.
pub fn resolve_within(root: &Path, rel: &str) -> Result<PathBuf, PathError> {
    if rel.is_empty() {
        return Err(PathError::Empty(rel.to_string()));
    }
    let mut resolved = root.to_path_buf();
    for part in rel.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(PathError::Escapes(rel.to_string()));
        }
        resolved.push(part);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_relative_path() {
        assert_eq!(
            normalize_relative(Path::new("dir/b.txt")).unwrap(),
            "dir/b.txt"
        );
    }

    #[test]
    fn strips_leading_separator() {
        assert_eq!(
            normalize_relative(Path::new("/dir/b.txt")).unwrap(),
            "dir/b.txt"
        );
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(matches!(
            normalize_relative(Path::new("../escape")),
            Err(PathError::Escapes(_))
        ));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(matches!(
            normalize_relative(Path::new(".")),
            Err(PathError::Empty(_))
        ));
    }

    #[test]
    fn resolve_within_stays_under_root() {
        let resolved = resolve_within(Path::new("/dest"), "dir/b.txt").unwrap();
        assert_eq!(resolved, Path::new("/dest/dir/b.txt"));
    }

    #[test]
    fn resolve_within_rejects_traversal() {
        assert!(resolve_within(Path::new("/dest"), "dir/../../etc").is_err());
    }

    proptest::proptest! {
        #[test]
        fn resolved_paths_always_start_with_root(rel in "[a-z]{1,8}(/[a-z]{1,8}){0,4}") {
            let resolved = resolve_within(Path::new("/root"), &rel).unwrap();
            proptest::prop_assert!(resolved.starts_with("/root"));
        }
    }
}
