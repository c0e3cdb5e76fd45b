//! Token-bucket limiter for calls to the source service.
//!
//! Every source request awaits [`RateLimiter::acquire`] before it is sent.
//! The destination is not limited.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use tracing::debug;

use crate::error::{Error, Result};

/// Steady-state source requests per second.
pub const DEFAULT_SOURCE_RATE: u32 = 4;
/// Requests allowed back to back before the steady rate applies.
pub const DEFAULT_SOURCE_BURST: u32 = 2;

pub struct RateLimiter {
    inner: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    per_second: u32,
    burst: u32,
}

impl RateLimiter {
    pub fn new(per_second: u32, burst: u32) -> Result<Self> {
        let rate = NonZeroU32::new(per_second)
            .ok_or_else(|| Error::Config("rate_limit.per_second must be at least 1".into()))?;
        let burst_nz = NonZeroU32::new(burst)
            .ok_or_else(|| Error::Config("rate_limit.burst must be at least 1".into()))?;
        let quota = Quota::per_second(rate).allow_burst(burst_nz);
        Ok(Self {
            inner: GovernorRateLimiter::direct(quota),
            per_second,
            burst,
        })
    }

    /// 4 requests per second with a burst of 2.
    pub fn source_default() -> Self {
        let quota = Quota::per_second(nonzero(DEFAULT_SOURCE_RATE))
            .allow_burst(nonzero(DEFAULT_SOURCE_BURST));
        Self {
            inner: GovernorRateLimiter::direct(quota),
            per_second: DEFAULT_SOURCE_RATE,
            burst: DEFAULT_SOURCE_BURST,
        }
    }

    /// Waits until a permit is available. Dropping the future gives up the wait.
    pub async fn acquire(&self) {
        if self.inner.check().is_err() {
            debug!(per_second = self.per_second, burst = self.burst, "[RATE] Waiting for permit");
            self.inner.until_ready().await;
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_second", &self.per_second)
            .field("burst", &self.burst)
            .finish()
    }
}

const fn nonzero(n: u32) -> NonZeroU32 {
    match NonZeroU32::new(n) {
        Some(n) => n,
        None => NonZeroU32::MIN,
    }
}
