//! Shared request throttle for provider calls.
//!
//! A single [`Throttle`] is cloned into every task of a run, so the minimum
//! spacing between provider calls holds across identities, not per task.
//! Callers await [`Throttle::ready`] before issuing a fetch; waiting for a
//! permit is kept apart from the fetch itself so a per-request timeout only
//! measures the provider.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::providers::{ProviderInitError, ZeroIntervalSnafu};

/// Builds a limiter handing out one permit per `min_interval`, with up to
/// `burst` permits available at once.
pub fn rate_limiter(
    min_interval: Duration,
    burst: NonZeroU32,
) -> Result<Arc<DefaultDirectRateLimiter>, ProviderInitError> {
    let quota = Quota::with_period(min_interval)
        .ok_or_else(|| ZeroIntervalSnafu.build())?
        .allow_burst(burst);
    Ok(Arc::new(RateLimiter::direct(quota)))
}

/// Cheap to clone; clones share one limiter.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DefaultDirectRateLimiter>,
    min_interval: Duration,
}

impl Throttle {
    /// One call per `min_interval`, no burst.
    pub fn new(min_interval: Duration) -> Result<Self, ProviderInitError> {
        Ok(Self {
            limiter: rate_limiter(min_interval, nonzero!(1u32))?,
            min_interval,
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the next provider call may start, consuming one permit.
    pub async fn ready(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}
