//! Mutex-protected memo of directories already created during this run
//! (`spec.md` §5: "created-directory set (mutex-protected map)").
//!
//! Every writer op ensures its parent directory exists through this gate
//! before opening its staging file, rather than relying on worker dispatch
//! order to respect the plan's "`MkDir` precedes writes into it" invariant.
//! This lets create-side operations run fully in parallel: whichever worker
//! gets there first pays the `create_dir_all` cost, everyone else finds the
//! entry already memoized.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use rustc_hash::FxHashSet;

#[derive(Default)]
pub struct DirGate {
    created: Mutex<FxHashSet<String>>,
}

impl DirGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `dir` (an absolute path) exists, creating it and all missing
    /// ancestors if necessary. Cheap on repeat calls for the same path.
    pub fn ensure(&self, dir: &Path) -> io::Result<()> {
        let key = dir.to_string_lossy().into_owned();
        {
            let created = self.created.lock().unwrap_or_else(|e| e.into_inner());
            if created.contains(&key) {
                return Ok(());
            }
        }
        fs::create_dir_all(dir)?;
        let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
        created.insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_creates_missing_ancestors() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a/b/c");
        let gate = DirGate::new();
        gate.ensure(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn ensure_is_idempotent() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a/b");
        let gate = DirGate::new();
        gate.ensure(&nested).unwrap();
        gate.ensure(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
