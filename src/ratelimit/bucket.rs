//! Token bucket limiter.

use governor::clock::Clock as GovernorClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::{Result, TurnstileError};

/// Seconds of refill the bucket can hold.
const MAX_BURST_SECONDS: f64 = 1.0;

const MIN_PERIOD: Duration = Duration::from_nanos(1);
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Feeds the crate clock to governor.
#[derive(Debug, Clone)]
struct BucketClock(Arc<dyn Clock>);

impl GovernorClock for BucketClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.0.now()
    }
}

type Gcra = RateLimiter<NotKeyed, InMemoryState, BucketClock, NoOpMiddleware<Instant>>;

/// A smoothed token bucket.
///
/// Permits accumulate at `permits_per_second` up to one second's worth (never
/// less than a single permit) and each admission consumes one. The bucket
/// starts with no stored permits: the first request is admitted and the next
/// one waits a full refill period, so a new client gets no burst on top of the
/// rate. Accounting is a lock-free GCRA cell, so two threads can never both
/// take the last permit.
pub struct TokenBucket {
    permits_per_second: f64,
    burst: NonZeroU32,
    limiter: Gcra,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create an empty bucket refilling at `permits_per_second`.
    pub fn new(permits_per_second: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if !permits_per_second.is_finite() || permits_per_second <= 0.0 {
            return Err(TurnstileError::InvalidPolicy {
                field: "max_requests",
                reason: format!(
                    "gives a refill rate of {} per second",
                    permits_per_second
                ),
            });
        }

        let period = Duration::try_from_secs_f64(permits_per_second.recip())
            .unwrap_or(MAX_PERIOD)
            .clamp(MIN_PERIOD, MAX_PERIOD);
        let burst = (permits_per_second * MAX_BURST_SECONDS)
            .floor()
            .clamp(1.0, f64::from(u32::MAX)) as u32;
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);

        let quota = Quota::with_period(period)
            .ok_or_else(|| TurnstileError::InvalidPolicy {
                field: "max_requests",
                reason: format!("gives a refill period of {:?}", period),
            })?
            .allow_burst(burst);
        let limiter = RateLimiter::direct_with_clock(quota, &BucketClock(Arc::clone(&clock)));

        // Spend all but one cell so only the first request goes through at once
        if let Some(stored) = NonZeroU32::new(burst.get() - 1) {
            let _ = limiter.check_n(stored);
        }

        Ok(Self {
            permits_per_second,
            burst,
            limiter,
            clock,
        })
    }

    /// Refill rate of this bucket.
    pub fn permits_per_second(&self) -> f64 {
        self.permits_per_second
    }

    /// Maximum number of permits an idle bucket stores.
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }

    /// Take a permit if one is available right now.
    ///
    /// Never blocks and never queues.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Take a permit, sleeping until one becomes available.
    ///
    /// Intended for warming a bucket up before it serves traffic; it must not
    /// be used on the request path, and it only returns once the bucket's clock
    /// has moved far enough. Returns how long the caller slept.
    pub fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.limiter.check() {
                Ok(()) => return waited,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    std::thread::sleep(wait);
                    waited += wait;
                }
            }
        }
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("permits_per_second", &self.permits_per_second)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}
