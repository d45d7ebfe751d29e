//! Request pacing and retry backoff for the Steam store endpoint.
//!
//! The store's appdetails endpoint allows roughly 200 requests per five
//! minutes. Large libraries are throttled to one call per `min_interval`;
//! failed calls back off exponentially until `max_attempts` is reached.

use rand::Rng;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_delay: Duration,
    /// Fraction of each delay added as random jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        let start = if rate_limited {
            self.rate_limit_delay
        } else {
            self.base_delay
        };
        let exp = attempt.saturating_sub(1).min(16);
        let delay = start.saturating_mul(1 << exp).min(self.max_delay);

        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.jitter);
        delay + delay.mul_f64(extra)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Throttle {
    /// Libraries larger than this get paced.
    pub threshold: usize,
    pub min_interval: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            threshold: 200,
            min_interval: Duration::from_secs(2),
        }
    }
}

impl Throttle {
    pub fn interval_for(&self, batch_size: usize) -> Duration {
        if batch_size > self.threshold {
            self.min_interval
        } else {
            Duration::ZERO
        }
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Keeps consecutive calls at least `interval` apart.
pub struct Pacer {
    interval: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    /// How long to wait before the next call may start.
    pub fn wait_time(&self) -> Duration {
        match self.last_call {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn mark_call(&mut self) {
        self.last_call = Some(Instant::now());
    }
}
