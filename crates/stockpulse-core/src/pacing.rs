use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces provider calls at least `interval` apart.
///
/// The first call goes through immediately; a zero interval disables pacing.
#[derive(Clone, Default)]
pub struct Pacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))));
        Self { limiter, interval }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next call is allowed.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Non-blocking variant of [`Pacer::ready`].
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}
