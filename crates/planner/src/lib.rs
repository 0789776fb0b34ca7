#![deny(unsafe_code)]

//! # Overview
//!
//! `dsp_planner` implements Smart Update: given a source [`Tree`], a
//! destination [`Tree`], and a [`Mode`], it emits the ordered
//! [`Operation`] list the executor will perform (`spec.md` §4.2).
//!
//! # Design
//!
//! Change detection treats a destination entry as up to date with its
//! source counterpart iff kind, size, and mtime (at the configured
//! tolerance) all match; a mode-bits-only difference still produces an
//! `UpdateFile` so the executor can correct permissions without recopying
//! content. The per-mode deletion policy table from `spec.md` §4.2 is
//! implemented directly in [`plan`].
//!
//! Ordering is achieved with two independent sorts rather than a topological
//! walk: creating operations (`Copy`/`UpdateFile`/`MkDir`/`SymlinkCreate`)
//! sort ascending by relative path, which places every directory immediately
//! before its children because a parent path is always a strict string
//! prefix of — and therefore lexicographically less than — any path
//! beneath it. Destructive operations (`Delete`/`MoveToSafetyNet`) sort
//! descending by relative path for the same reason, in reverse: children
//! are removed before the directories that contained them.
//!
//! # Invariants
//!
//! - At most one [`Operation`] is emitted per relative path (`spec.md` §3).
//! - Every operation's path passes [`dsp_core::paths::resolve_within`] for
//!   both the source and destination roots before the planner returns it.

use dsp_core::error::PlanError;
use dsp_core::operation::{OpId, OpIdGenerator};
use dsp_core::record::Kind;
use dsp_core::{Checkpoint, FileRecord, Job, Mode, Operation, Tree};

/// Default mtime comparison tolerance, in seconds, used when the caller does
/// not override it (`spec.md` §9, Open Questions: filesystems disagree on
/// mtime resolution).
pub const DEFAULT_MTIME_TOLERANCE_SECS: i64 = 1;

fn up_to_date(source: &FileRecord, dest: &FileRecord, tolerance_secs: i64) -> bool {
    source.kind == dest.kind
        && source.size == dest.size
        && source.mtime.approx_eq(dest.mtime, tolerance_secs)
}

/// Computes the ordered operation list transforming `dest` towards `source`
/// under `mode`.
///
/// `bucket_date` is the `YYYY-MM-DD` string stamped onto any
/// [`Operation::MoveToSafetyNet`] emitted by this call; the caller supplies
/// it (rather than the planner reading the clock) so plans stay
/// deterministic and testable.
///
/// When `checkpoint` is supplied, relative paths already present in
/// [`Checkpoint::completed_files`] are elided entirely, and directories in
/// [`Checkpoint::completed_dirs`] are assumed fully processed (`spec.md`
/// §4.5).
///
/// # Errors
///
/// Returns [`PlanError::PathEscape`] if any entry's relative path fails
/// root containment once resolved against `job`'s roots.
pub fn plan(
    job: &Job,
    source: &Tree,
    dest: &Tree,
    bucket_date: &str,
    checkpoint: Option<&Checkpoint>,
    mtime_tolerance_secs: i64,
) -> Result<Vec<Operation>, PlanError> {
    let mode = job.mode;
    let mut ids = OpIdGenerator::new();
    let mut creates: Vec<Operation> = Vec::new();
    let mut destructive: Vec<Operation> = Vec::new();

    for record in source.iter() {
        if is_checkpointed(checkpoint, record) {
            continue;
        }
        verify_within_roots(job, &record.rel)?;

        match dest.get(&record.rel) {
            None => creates.push(create_op(&mut ids, record)),
            Some(existing) => {
                if !up_to_date(record, existing, mtime_tolerance_secs)
                    || record.mode != existing.mode
                {
                    creates.push(update_op(&mut ids, record));
                }
            }
        }
    }

    for record in dest.iter() {
        if source.get(&record.rel).is_some() {
            continue;
        }
        if is_checkpointed(checkpoint, record) {
            continue;
        }
        verify_within_roots(job, &record.rel)?;

        match mode {
            Mode::Clone => destructive.push(Operation::Delete {
                op_id: ids.issue(),
                rel: record.rel.clone(),
            }),
            Mode::Sync => {}
            Mode::SafetyNet => destructive.push(Operation::MoveToSafetyNet {
                op_id: ids.issue(),
                rel: record.rel.clone(),
                bucket_date: bucket_date.to_string(),
            }),
        }
    }

    creates.sort_by(|a, b| a.rel().cmp(b.rel()));
    destructive.sort_by(|a, b| b.rel().cmp(a.rel()));

    creates.extend(destructive);
    Ok(creates)
}

fn is_checkpointed(checkpoint: Option<&Checkpoint>, record: &FileRecord) -> bool {
    let Some(checkpoint) = checkpoint else {
        return false;
    };
    match record.kind {
        Kind::Dir => checkpoint.is_dir_complete(&record.rel),
        Kind::File | Kind::Symlink => checkpoint.is_file_complete(&record.rel),
    }
}

fn verify_within_roots(job: &Job, rel: &str) -> Result<(), PlanError> {
    dsp_core::paths::resolve_within(&job.source_root, rel).map_err(|source| {
        PlanError::PathEscape {
            rel: rel.to_string(),
            source,
        }
    })?;
    dsp_core::paths::resolve_within(&job.dest_root, rel).map_err(|source| {
        PlanError::PathEscape {
            rel: rel.to_string(),
            source,
        }
    })?;
    Ok(())
}

fn create_op(ids: &mut OpIdGenerator, record: &FileRecord) -> Operation {
    match record.kind {
        Kind::Dir => Operation::MkDir {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            mode: record.mode,
        },
        Kind::Symlink => Operation::SymlinkCreate {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            target: record.symlink_target.clone().unwrap_or_default(),
        },
        Kind::File => Operation::Copy {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            size: record.size,
        },
    }
}

fn update_op(ids: &mut OpIdGenerator, record: &FileRecord) -> Operation {
    match record.kind {
        Kind::Dir => Operation::MkDir {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            mode: record.mode,
        },
        Kind::Symlink => Operation::SymlinkCreate {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            target: record.symlink_target.clone().unwrap_or_default(),
        },
        Kind::File => Operation::UpdateFile {
            op_id: ids.issue(),
            rel: record.rel.clone(),
            size: record.size,
        },
    }
}

/// Assigns fresh, contiguous op ids to an already-ordered operation list,
/// used by the executor after a resume trims elided entries from a replayed
/// plan so ids stay monotonic within the remaining run.
#[must_use]
pub fn renumber(ops: Vec<Operation>) -> Vec<Operation> {
    let mut ids = OpIdGenerator::new();
    ops.into_iter()
        .map(|op| assign_id(op, ids.issue()))
        .collect()
}

fn assign_id(op: Operation, new_id: OpId) -> Operation {
    match op {
        Operation::Copy { rel, size, .. } => Operation::Copy {
            op_id: new_id,
            rel,
            size,
        },
        Operation::UpdateFile { rel, size, .. } => Operation::UpdateFile {
            op_id: new_id,
            rel,
            size,
        },
        Operation::MkDir { rel, mode, .. } => Operation::MkDir {
            op_id: new_id,
            rel,
            mode,
        },
        Operation::MoveToSafetyNet {
            rel, bucket_date, ..
        } => Operation::MoveToSafetyNet {
            op_id: new_id,
            rel,
            bucket_date,
        },
        Operation::Delete { rel, .. } => Operation::Delete { op_id: new_id, rel },
        Operation::SymlinkCreate { rel, target, .. } => Operation::SymlinkCreate {
            op_id: new_id,
            rel,
            target,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_core::record::MTime;
    use std::path::Path;

    fn job(mode: Mode) -> Job {
        Job {
            name: "demo".into(),
            source_root: "/src".into(),
            dest_root: "/dst".into(),
            mode,
            exclude: Vec::new(),
            safety_net_days: 30,
            verify: false,
            retries: 3,
            threads: 4,
            dry_run: false,
            resume: false,
        }
    }

    // S1 from spec.md §8.
    #[test]
    fn clone_copies_additions_and_deletes_extras() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        source.insert(FileRecord::file("dir/b.txt", 5, MTime::new(200, 0), 0o644));

        let mut dest = Tree::new();
        dest.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        dest.insert(FileRecord::file("dir/c.txt", 7, MTime::new(300, 0), 0o644));

        let ops = plan(&job(Mode::Clone), &source, &dest, "2025-01-15", None, 0).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operation::Copy { rel, .. } if rel == "dir/b.txt"));
        assert!(matches!(&ops[1], Operation::Delete { rel, .. } if rel == "dir/c.txt"));
    }

    // S2 from spec.md §8.
    #[test]
    fn sync_copies_additions_but_leaves_extras() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        source.insert(FileRecord::file("dir/b.txt", 5, MTime::new(200, 0), 0o644));

        let mut dest = Tree::new();
        dest.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        dest.insert(FileRecord::file("dir/c.txt", 7, MTime::new(300, 0), 0o644));

        let ops = plan(&job(Mode::Sync), &source, &dest, "2025-01-15", None, 0).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::Copy { rel, .. } if rel == "dir/b.txt"));
    }

    // S3 from spec.md §8.
    #[test]
    fn safety_net_quarantines_deletions_and_overwrites() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 3, MTime::new(400, 0), 0o644));

        let mut dest = Tree::new();
        dest.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        dest.insert(FileRecord::file("old.txt", 9, MTime::new(50, 0), 0o644));

        let ops = plan(&job(Mode::SafetyNet), &source, &dest, "2025-01-15", None, 0).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operation::UpdateFile { rel, .. } if rel == "a.txt"));
        assert!(
            matches!(&ops[1], Operation::MoveToSafetyNet { rel, bucket_date, .. }
                if rel == "old.txt" && bucket_date == "2025-01-15")
        );
    }

    #[test]
    fn identical_trees_produce_no_operations() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));
        let dest = source.clone();

        for mode in [Mode::Clone, Mode::Sync, Mode::SafetyNet] {
            let ops = plan(&job(mode), &source, &dest, "2025-01-15", None, 0).unwrap();
            assert!(ops.is_empty(), "mode {mode:?} should be a no-op");
        }
    }

    #[test]
    fn directories_precede_children_and_children_precede_directory_removal() {
        let mut source = Tree::new();
        source.insert(FileRecord::dir("dir", MTime::default(), 0o755));
        source.insert(FileRecord::file("dir/b.txt", 1, MTime::new(1, 0), 0o644));

        let dest = Tree::new();
        let ops = plan(&job(Mode::Clone), &source, &dest, "2025-01-15", None, 0).unwrap();
        assert_eq!(ops[0].rel(), "dir");
        assert_eq!(ops[1].rel(), "dir/b.txt");
    }

    #[test]
    fn resume_elides_checkpointed_files() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 1, MTime::new(1, 0), 0o644));
        source.insert(FileRecord::file("b.txt", 2, MTime::new(2, 0), 0o644));
        let dest = Tree::new();

        let mut checkpoint = Checkpoint::new();
        checkpoint.mark_file_complete("a.txt");

        let ops = plan(
            &job(Mode::Clone),
            &source,
            &dest,
            "2025-01-15",
            Some(&checkpoint),
            0,
        )
        .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].rel(), "b.txt");
    }

    #[test]
    fn mode_only_difference_still_updates() {
        let mut source = Tree::new();
        source.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o600));
        let mut dest = Tree::new();
        dest.insert(FileRecord::file("a.txt", 3, MTime::new(100, 0), 0o644));

        let ops = plan(&job(Mode::Sync), &source, &dest, "2025-01-15", None, 0).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::UpdateFile { rel, .. } if rel == "a.txt"));
    }

    proptest::proptest! {
        #[test]
        fn every_planned_path_stays_within_its_root(rel in "[a-z]{1,6}(/[a-z]{1,6}){0,3}") {
            let mut source = Tree::new();
            source.insert(FileRecord::file(rel.clone(), 1, MTime::new(1, 0), 0o644));
            let dest = Tree::new();

            let ops = plan(&job(Mode::Clone), &source, &dest, "2025-01-15", None, 0).unwrap();
            for op in &ops {
                let resolved = dsp_core::paths::resolve_within(Path::new("/dst"), op.rel()).unwrap();
                proptest::prop_assert!(resolved.starts_with("/dst"));
            }
        }
    }
}
