//! The per-key limiter, one of the two supported algorithms.

use std::sync::Arc;

use super::bucket::TokenBucket;
use super::window::SlidingWindow;
use crate::clock::Clock;
use crate::error::Result;
use crate::policy::{Algorithm, PolicyConfig};

/// Rate limiter state for a single `(client, group)` slot.
///
/// The algorithm is fixed when the slot is created.
#[derive(Debug)]
pub enum RateLimiter {
    /// Token bucket limiter
    TokenBucket(TokenBucket),
    /// Sliding window limiter
    SlidingWindow(SlidingWindow),
}

impl RateLimiter {
    /// Create the limiter a policy asks for.
    pub fn for_policy(policy: &PolicyConfig, clock: &Arc<dyn Clock>) -> Result<Self> {
        Ok(match policy.algorithm {
            Algorithm::TokenBucket => RateLimiter::TokenBucket(TokenBucket::new(
                policy.permits_per_second(),
                Arc::clone(clock),
            )?),
            Algorithm::SlidingWindow => RateLimiter::SlidingWindow(SlidingWindow::new()),
        })
    }

    /// The algorithm backing this limiter.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            RateLimiter::TokenBucket(_) => Algorithm::TokenBucket,
            RateLimiter::SlidingWindow(_) => Algorithm::SlidingWindow,
        }
    }

    /// Decide whether one more request is within the limit.
    ///
    /// A token bucket keeps the rate and clock it was created with; a sliding
    /// window reads the window length and maximum from `policy` and the time
    /// from `clock` on every call.
    pub fn check(&self, policy: &PolicyConfig, clock: &dyn Clock) -> bool {
        match self {
            RateLimiter::TokenBucket(bucket) => bucket.try_acquire(),
            RateLimiter::SlidingWindow(window) => {
                window.allow(policy.window(), policy.max_requests, clock)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::TimeUnit;
    use std::time::{Duration, Instant};

    fn manual_clock() -> (Arc<dyn Clock>, ManualClock) {
        let clock = ManualClock::new(Instant::now());
        (Arc::new(clock.clone()), clock)
    }

    #[test]
    fn test_for_policy_picks_algorithm() {
        let (clock, _) = manual_clock();

        let policy = PolicyConfig::default().with_algorithm(Algorithm::TokenBucket);
        let limiter = RateLimiter::for_policy(&policy, &clock).unwrap();
        assert_eq!(limiter.algorithm(), Algorithm::TokenBucket);

        let limiter = RateLimiter::for_policy(&PolicyConfig::default(), &clock).unwrap();
        assert_eq!(limiter.algorithm(), Algorithm::SlidingWindow);
    }

    #[test]
    fn test_token_bucket_rate_comes_from_policy() {
        let (clock, _) = manual_clock();
        let policy = PolicyConfig::default()
            .with_algorithm(Algorithm::TokenBucket)
            .with_limit(120.0, 1, TimeUnit::Minute);

        match RateLimiter::for_policy(&policy, &clock).unwrap() {
            RateLimiter::TokenBucket(bucket) => assert_eq!(bucket.permits_per_second(), 2.0),
            other => panic!("expected a token bucket, got {:?}", other),
        }
    }

    #[test]
    fn test_token_bucket_with_zero_window_is_refused() {
        let (clock, _) = manual_clock();
        let policy = PolicyConfig::default()
            .with_algorithm(Algorithm::TokenBucket)
            .with_limit(10.0, 0, TimeUnit::Second);

        assert!(RateLimiter::for_policy(&policy, &clock).is_err());
    }

    #[test]
    fn test_sliding_window_check_uses_policy_window() {
        let (clock, manual) = manual_clock();
        let policy = PolicyConfig::default().with_limit(2.0, 100, TimeUnit::Millisecond);
        let limiter = RateLimiter::for_policy(&policy, &clock).unwrap();

        assert!(limiter.check(&policy, clock.as_ref()));
        assert!(limiter.check(&policy, clock.as_ref()));
        assert!(!limiter.check(&policy, clock.as_ref()));

        manual.advance(Duration::from_millis(101));
        assert!(limiter.check(&policy, clock.as_ref()));
    }
}
