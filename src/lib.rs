//! Turnstile - Per-Client Admission Control
//!
//! This crate decides, for each inbound operation, whether a client may
//! proceed. A policy attached to the operation combines a rate limit (token
//! bucket or sliding window, tracked per client and group) with optional
//! allow and deny lists of wildcard address patterns.
//!
//! ```
//! use std::sync::Arc;
//! use turnstile::{AdmissionEvaluator, DynamicListStore, LimiterRegistry, PolicyConfig, TimeUnit};
//!
//! let evaluator = AdmissionEvaluator::new(
//!     Arc::new(LimiterRegistry::new()),
//!     Arc::new(DynamicListStore::new()),
//! );
//! let policy = PolicyConfig::default().with_limit(2.0, 1, TimeUnit::Second);
//!
//! assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
//! assert!(evaluator.evaluate(&policy, "10.0.0.5").is_admitted());
//! assert!(evaluator.evaluate(&policy, "10.0.0.5").is_rejected());
//! ```
//!
//! Extracting the client identity from a request and choosing the policy for
//! an operation are left to the caller.

pub mod admission;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod lists;
pub mod matcher;
pub mod policy;
pub mod ratelimit;

pub use admission::{AdmissionEvaluator, Decision, RejectReason, Rejection};
pub use catalog::PolicyCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use crate::config::TurnstileConfig;
pub use error::{Result, TurnstileError};
pub use lists::{DynamicListStore, ListKind};
pub use policy::{Algorithm, ListPolicy, PolicyConfig, TimeUnit};
pub use ratelimit::{LimiterKey, LimiterRegistry, RateLimiter, SlidingWindow, TokenBucket};
