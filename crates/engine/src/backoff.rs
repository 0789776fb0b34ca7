//! Exponential backoff with jitter for retriable operation failures
//! (`spec.md` §4.3: "base 100ms, doubling, capped at 2s, +/-20% jitter").

use std::time::Duration;

use rand::Rng;

const BASE_MS: u64 = 100;
const CAP_MS: u64 = 2_000;

/// Computes the delay before retry attempt `attempt` (`1` for the first
/// retry after the initial failed try).
#[must_use]
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let doubled = BASE_MS.saturating_mul(1u64 << attempt.min(20));
    let capped = doubled.min(CAP_MS);
    let jittered = jitter(capped);
    Duration::from_millis(jittered)
}

fn jitter(base_ms: u64) -> u64 {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.8..=1.2);
    ((base_ms as f64) * factor).round().max(0.0) as u64
}
