//! Backoff between attempts of idempotent agents.

use std::time::Duration;

use cee_settings::RetrySettings;

/// Jitter applied symmetrically around the exponential delay.
pub const JITTER_FACTOR: f64 = 0.2;

/// Delay before retry number `retry` (0 for the first retry).
///
/// `min(max_delay, base_delay * 2^retry)` scaled by `1 ± JITTER_FACTOR`,
/// where `random` in `[0, 1)` picks the point in the jitter band.
#[must_use]
pub fn backoff_delay(retry: u32, settings: &RetrySettings, random: f64) -> Duration {
    let exponential = settings
        .base_delay_ms
        .saturating_mul(1u64 << retry.min(31));
    let capped = exponential.min(settings.max_delay_ms);
    let jitter = 1.0 + (random.clamp(0.0, 1.0) * 2.0 - 1.0) * JITTER_FACTOR;
    Duration::from_millis(((capped as f64) * jitter).round().max(0.0) as u64)
}

/// [`backoff_delay`] with a thread-local random draw.
pub fn jittered_backoff(retry: u32, settings: &RetrySettings) -> Duration {
    backoff_delay(retry, settings, rand::random::<f64>())
}
