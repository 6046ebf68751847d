use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RetrySettings;

/// Exponential backoff with additive jitter for the status poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(
        min_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        max_jitter: Duration,
    ) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            max_attempts,
            max_jitter,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            Duration::from_millis(settings.min_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.max_attempts,
            Duration::from_millis(settings.max_jitter_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// `min(max_delay, min_delay * 2^attempt)`, saturating at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.min_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn next_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.base_delay(attempt) + self.jitter(rng)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    fn jitter<R: Rng>(&self, rng: &mut R) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Derives a per-query seed so invocations sharing a configured seed still
/// draw different jitter for different queries.
pub fn seed_for(seed: u64, query_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query_id.hash(&mut hasher);
    seed ^ hasher.finish()
}

/// Random source for jitter. A fixed seed makes the delay sequence repeatable.
pub fn jitter_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
