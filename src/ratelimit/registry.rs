//! Registry of per-client, per-group rate limiters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::key::LimiterKey;
use super::limiter::RateLimiter;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::policy::PolicyConfig;

type GroupLimiters = DashMap<String, Arc<RateLimiter>>;

/// Two-level store of limiters: client id, then group name.
///
/// Slots are created lazily on first use through the map's entry API, so
/// concurrent first access for a key yields a single limiter. Each limiter
/// synchronizes on its own state; callers for different keys never wait on
/// each other beyond a shard lookup.
///
/// A slot keeps the algorithm it was created with. A later policy for the same
/// group naming another algorithm is checked against the existing limiter.
pub struct LimiterRegistry {
    /// Limiters indexed by client, then group
    clients: DashMap<String, Arc<GroupLimiters>>,
    /// Time source for every check
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    /// Create an empty registry on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty registry on a specific clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: DashMap::new(),
            clock,
        }
    }

    /// Get the limiter for `(client_id, policy.group_name)`, creating it if absent.
    ///
    /// Existing slots are found under a shard read lock; the write lock is only
    /// taken on a miss. Fails if a new token bucket cannot be built from the
    /// policy's rate.
    pub fn get_or_create(&self, policy: &PolicyConfig, client_id: &str) -> Result<Arc<RateLimiter>> {
        let groups = match self.clients.get(client_id) {
            Some(groups) => Arc::clone(&groups),
            None => self
                .clients
                .entry(client_id.to_string())
                .or_insert_with(|| Arc::new(DashMap::new()))
                .clone(),
        };

        let existing = groups.get(&policy.group_name).map(|limiter| Arc::clone(&limiter));
        let limiter = match existing {
            Some(limiter) => limiter,
            None => match groups.entry(policy.group_name.clone()) {
                Entry::Occupied(slot) => Arc::clone(slot.get()),
                Entry::Vacant(slot) => {
                    debug!(
                        client = %client_id,
                        group = %policy.group_name,
                        algorithm = ?policy.algorithm,
                        "Creating new rate limiter"
                    );
                    let limiter = Arc::new(RateLimiter::for_policy(policy, &self.clock)?);
                    slot.insert(Arc::clone(&limiter));
                    limiter
                }
            },
        };

        if limiter.algorithm() != policy.algorithm {
            warn!(
                client = %client_id,
                group = %policy.group_name,
                existing = ?limiter.algorithm(),
                requested = ?policy.algorithm,
                "Group already has a limiter with another algorithm; keeping the existing one"
            );
        }

        Ok(limiter)
    }

    /// Check one request for `client_id` against the policy's rate limit.
    ///
    /// Returns `Ok(true)` if the request is within the limit. A policy whose
    /// limits fail [`PolicyConfig::validate_limits`] is refused with an error
    /// instead of being admitted.
    pub fn check(&self, policy: &PolicyConfig, client_id: &str) -> Result<bool> {
        policy.validate_limits()?;
        let limiter = self.get_or_create(policy, client_id)?;
        let within_limit = limiter.check(policy, self.clock.as_ref());

        trace!(
            client = %client_id,
            group = %policy.group_name,
            within_limit,
            "Checked rate limit"
        );

        Ok(within_limit)
    }

    /// Look up an existing limiter without creating one.
    pub fn get(&self, key: &LimiterKey) -> Option<Arc<RateLimiter>> {
        let groups = self.clients.get(&key.client_id)?;
        let limiter = groups.get(&key.group_name)?;
        Some(Arc::clone(&limiter))
    }

    /// Number of clients with at least one limiter.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of limiters across all clients.
    pub fn limiter_count(&self) -> usize {
        self.clients.iter().map(|groups| groups.len()).sum()
    }

    /// Drop every limiter.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
