//! Progress event emission, rate-limited to at most 10 events per second
//! (`spec.md` §4.3), so a full UI channel never stalls execution: the
//! emitter drops intermediate events rather than blocking, only the final
//! "run complete" event is guaranteed to be sent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use dsp_core::progress::Phase;
use dsp_core::ProgressEvent;

const MIN_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProgressEmitter {
    tx: Sender<ProgressEvent>,
    job: String,
    total_ops: u64,
    bytes_total: u64,
    done: AtomicU64,
    bytes_done: AtomicU64,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressEmitter {
    pub fn new(tx: Sender<ProgressEvent>, job: String, total_ops: u64, bytes_total: u64) -> Self {
        Self {
            tx,
            job,
            total_ops,
            bytes_total,
            done: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            last_emit: Mutex::new(None),
        }
    }

    /// Records one completed operation and its byte contribution, then
    /// emits a [`ProgressEvent`] unless the rate limit suppresses it.
    /// `force` bypasses the rate limit (used for the terminal event).
    pub fn record(&self, current_rel: &str, bytes: u64, phase: Phase, force: bool) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes_done = self.bytes_done.fetch_add(bytes, Ordering::Relaxed) + bytes;

        if !force && !self.should_emit() {
            return;
        }

        let event = ProgressEvent {
            job: self.job.clone(),
            done,
            total: self.total_ops,
            bytes_done,
            bytes_total: self.bytes_total,
            current_rel: current_rel.to_string(),
            phase,
        };
        let _ = self.tx.try_send(event);
    }

    fn should_emit(&self) -> bool {
        let mut last_emit = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *last_emit {
            Some(previous) if now.duration_since(previous) < MIN_INTERVAL => false,
            _ => {
                *last_emit = Some(now);
                true
            }
        }
    }

    /// Clones the underlying event sender, used to rebuild the emitter once
    /// the true `total_ops`/`bytes_total` are known after planning.
    pub fn sender(&self) -> Sender<ProgressEvent> {
        self.tx.clone()
    }

    /// Emits a non-per-operation phase transition (e.g. entering `scanning`
    /// or `finalizing`), bypassing the per-op rate limit.
    pub fn emit_phase(&self, phase: Phase) {
        let done = self.done.load(Ordering::Relaxed);
        let bytes_done = self.bytes_done.load(Ordering::Relaxed);
        let event = ProgressEvent {
            job: self.job.clone(),
            done,
            total: self.total_ops,
            bytes_done,
            bytes_total: self.bytes_total,
            current_rel: String::new(),
            phase,
        };
        let _ = self.tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_suppresses_rapid_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let emitter = ProgressEmitter::new(tx, "demo".into(), 100, 0);
        for i in 0..20 {
            emitter.record(&format!("f{i}.txt"), 1, Phase::Copying, false);
        }
        let received = rx.try_iter().count();
        assert!(received < 20, "rate limiting should drop most events");
    }

    #[test]
    fn forced_event_always_sends() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let emitter = ProgressEmitter::new(tx, "demo".into(), 1, 0);
        emitter.record("a.txt", 0, Phase::Finalizing, true);
        assert_eq!(rx.try_iter().count(), 1);
    }
}
