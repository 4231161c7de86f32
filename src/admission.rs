//! Admission decisions combining list checks with rate limiting.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::lists::DynamicListStore;
use crate::policy::{ListPolicy, PolicyConfig};
use crate::ratelimit::{LimiterKey, LimiterRegistry};

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The client matched the deny list
    Denied,
    /// The policy only admits allow-listed clients and this one was not
    NotAllowed,
    /// The client exhausted its rate budget
    RateLimited,
    /// The policy's limits are unusable, so no budget can be checked
    InvalidPolicy,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::Denied => "deny-listed",
            RejectReason::NotAllowed => "not allow-listed",
            RejectReason::RateLimited => "rate limited",
            RejectReason::InvalidPolicy => "invalid policy",
        };
        f.write_str(reason)
    }
}

/// A rejected admission, with enough context for the caller to report it.
///
/// Rejections are final for the request; nothing here retries.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("Admission rejected ({reason}): client {client_id}, group {group_name}")]
pub struct Rejection {
    pub client_id: String,
    pub group_name: String,
    pub reason: RejectReason,
    pub policy: PolicyConfig,
}

impl Rejection {
    fn new(policy: &PolicyConfig, client_id: &str, reason: RejectReason) -> Self {
        Self {
            client_id: client_id.to_string(),
            group_name: policy.group_name.clone(),
            reason,
            policy: policy.clone(),
        }
    }

    /// The limiter slot the rejection applies to.
    pub fn key(&self) -> LimiterKey {
        LimiterKey::new(self.client_id.as_str(), self.group_name.as_str())
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Admitted after passing the rate limit
    Admit,
    /// Admitted by a list check without consulting the rate limit
    Bypass,
    /// Rejected
    Reject(Rejection),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Reject(_))
    }

    /// Whether the request was rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Reject(_))
    }

    /// Convert into a `Result` so callers can propagate rejections with `?`.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Decision::Admit | Decision::Bypass => Ok(()),
            Decision::Reject(rejection) => Err(rejection),
        }
    }
}

/// Sequences deny-list, allow-list and rate-limit checks per the policy's
/// [`ListPolicy`].
///
/// | list policy          | checks                                             |
/// |----------------------|----------------------------------------------------|
/// | `None`               | rate limit                                         |
/// | `WhiteOnly`          | allowed: bypass, else reject                       |
/// | `BlackOnly`          | denied: reject, else bypass                        |
/// | `DefaultPlusWhite`   | allowed: bypass, else rate limit                   |
/// | `DefaultPlusBlack`   | denied: reject, else rate limit                    |
/// | `DefaultPlusBoth`    | denied: reject, allowed: bypass, else rate limit   |
///
/// The deny check always runs before the allow check.
#[derive(Clone)]
pub struct AdmissionEvaluator {
    limiters: Arc<LimiterRegistry>,
    lists: Arc<DynamicListStore>,
}

impl AdmissionEvaluator {
    /// Create an evaluator over shared limiter and list state.
    pub fn new(limiters: Arc<LimiterRegistry>, lists: Arc<DynamicListStore>) -> Self {
        Self { limiters, lists }
    }

    /// The limiter registry backing this evaluator.
    pub fn limiters(&self) -> &Arc<LimiterRegistry> {
        &self.limiters
    }

    /// The list store backing this evaluator.
    pub fn lists(&self) -> &Arc<DynamicListStore> {
        &self.lists
    }

    /// Decide whether `client_id` may perform an operation guarded by `policy`.
    #[instrument(
        level = "trace",
        skip(self, policy),
        fields(group = %policy.group_name, list_policy = ?policy.list_policy)
    )]
    pub fn evaluate(&self, policy: &PolicyConfig, client_id: &str) -> Decision {
        let checks_deny = policy.list_policy.checks_deny();
        let checks_allow = policy.list_policy.checks_allow();

        if checks_deny && self.lists.is_denied(policy, client_id) {
            return self.reject(policy, client_id, RejectReason::Denied);
        }

        if checks_allow && self.lists.is_allowed(policy, client_id) {
            trace!("Allow-listed, skipping rate limit");
            return Decision::Bypass;
        }

        let decision = match policy.list_policy {
            ListPolicy::WhiteOnly => self.reject(policy, client_id, RejectReason::NotAllowed),
            ListPolicy::BlackOnly => Decision::Bypass,
            ListPolicy::None
            | ListPolicy::DefaultPlusWhite
            | ListPolicy::DefaultPlusBlack
            | ListPolicy::DefaultPlusBoth => self.rate_limit(policy, client_id),
        };

        trace!(admitted = decision.is_admitted(), "Admission decision made");
        decision
    }

    fn rate_limit(&self, policy: &PolicyConfig, client_id: &str) -> Decision {
        match self.limiters.check(policy, client_id) {
            Ok(true) => Decision::Admit,
            Ok(false) => self.reject(policy, client_id, RejectReason::RateLimited),
            Err(error) => {
                warn!(
                    group = %policy.group_name,
                    error = %error,
                    "Policy was never validated and has unusable limits"
                );
                self.reject(policy, client_id, RejectReason::InvalidPolicy)
            }
        }
    }

    fn reject(&self, policy: &PolicyConfig, client_id: &str, reason: RejectReason) -> Decision {
        debug!(
            client = %client_id,
            group = %policy.group_name,
            reason = %reason,
            "Admission rejected"
        );
        Decision::Reject(Rejection::new(policy, client_id, reason))
    }
}

impl Default for AdmissionEvaluator {
    fn default() -> Self {
        Self::new(
            Arc::new(LimiterRegistry::new()),
            Arc::new(DynamicListStore::new()),
        )
    }
}
