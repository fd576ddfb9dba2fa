//! Request pacing for sequential outbound work.
//!
//! Scraping, model calls and search queries all run one at a time with a
//! minimum gap between consecutive requests. A `Pacer` is a single-cell token
//! bucket: the first request goes through immediately, each following one waits
//! until `period` has elapsed since the previous permit.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct Pacer {
    limiter: Option<DefaultDirectRateLimiter>,
    period: Duration,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        let limiter = Quota::with_period(period)
            .map(|q| RateLimiter::direct(q.allow_burst(NonZeroU32::MIN)));
        Self { limiter, period }
    }

    /// No pacing at all
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next permit
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_permit_is_immediate_then_spaced() {
        let pacer = Pacer::new(Duration::from_millis(80));
        let start = Instant::now();
        pacer.ready().await;
        assert!(start.elapsed() < Duration::from_millis(40));

        pacer.ready().await;
        pacer.ready().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn zero_period_never_waits() {
        let pacer = Pacer::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            pacer.ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
