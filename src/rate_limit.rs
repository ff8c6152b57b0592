//! Navigation pacing
//!
//! Optional token bucket capping how many portal navigations start per second.
//! The batch cooldown already spaces requests out; this cap is for portals that
//! throttle even within a batch.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::PacingConfig;

/// Token bucket over navigations
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    /// Bucket capacity; one second's worth of navigations
    capacity: f64,
    per_second: f64,
    last_refill: Instant,
    /// Total time spent waiting for tokens
    waited: Duration,
}

impl RateLimiter {
    /// `None` when `per_second` is 0 (no cap).
    pub fn new(per_second: u32) -> Option<Self> {
        if per_second == 0 {
            return None;
        }
        let capacity = per_second as f64;
        Some(Self {
            tokens: capacity,
            capacity,
            per_second: capacity,
            last_refill: Instant::now(),
            waited: Duration::ZERO,
        })
    }

    pub fn from_config(config: &PacingConfig) -> Option<Self> {
        Self::new(config.max_navigations_per_second)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or report how long until one is available.
    pub fn try_acquire(&mut self) -> Option<Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.per_second))
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&mut self) {
        while let Some(wait) = self.try_acquire() {
            debug!("Navigation cap reached, waiting {:?}", wait);
            self.waited += wait;
            sleep(wait).await;
        }
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }
}
