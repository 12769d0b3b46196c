use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Capped exponential backoff with optional jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_delay_ms),
            // out-of-range or NaN settings fall back to no growth and no jitter
            multiplier: if config.multiplier >= 1.0 && config.multiplier.is_finite() {
                config.multiplier
            } else {
                1.0
            },
            jitter: if (0.0..=1.0).contains(&config.jitter) {
                config.jitter
            } else {
                0.0
            },
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt; grows until the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.attempts += 1;
        let grown = base.as_secs_f64() * self.multiplier;
        self.current = Duration::from_secs_f64(grown.min(self.max.as_secs_f64()));

        let spread = base.as_secs_f64() * self.jitter;
        if spread <= 0.0 {
            return base;
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((base.as_secs_f64() + offset).clamp(0.0, self.max.as_secs_f64()))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
