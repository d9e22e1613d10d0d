//! Backoff policy for reconnection attempts.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `initial_delay × multiplier^attempt`, capped at
/// `max_delay`, with optional ±25% jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_retries: 5,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let base = self.initial_delay.as_secs_f64() * exp;
        let capped = base.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            capped * factor
        } else {
            capped
        };

        Duration::from_secs_f64(final_secs.max(0.0))
    }
}
