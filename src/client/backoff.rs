//! Reconnect backoff used by the socket client.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Base delay between reconnect attempts.
pub(crate) const BASE_DELAY: Duration = Duration::from_millis(100);
/// Ceiling on any single delay.
pub(crate) const MAX_DELAY: Duration = Duration::from_millis(60_000);

/// Produces jittered exponential delays keyed off the attempt counter.
pub(crate) struct BackoffState {
    rng: StdRng,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Delay to sleep before the next attempt: `BASE << (attempt % 10)`,
    /// capped by [`MAX_DELAY`] and the remaining retry budget, then scaled
    /// by a uniform factor in [0.75, 1.25].
    pub fn next_delay(&mut self, attempt: usize, remaining: Duration) -> Duration {
        let factor = 1u64 << (attempt % 10);
        let capped = (BASE_DELAY.as_millis() as u64 * factor)
            .min(MAX_DELAY.as_millis() as u64)
            .min(remaining.as_millis() as u64);
        let jitter: f64 = self.rng.gen_range(0.75..=1.25);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }
}
