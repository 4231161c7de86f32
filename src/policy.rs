//! Admission policy attached to a guarded operation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::matcher;

/// Group used when a policy does not name one.
pub const DEFAULT_GROUP: &str = "COMMON";

/// Rate-limiting algorithm backing a limiter slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    /// Continuously refilled bucket of permits
    TokenBucket,
    /// Trailing window of admitted request timestamps
    #[default]
    SlidingWindow,
}

/// How allow and deny lists combine with the rate limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListPolicy {
    /// Rate limit only; lists are ignored
    #[default]
    None,
    /// Only allow-listed clients get through, without a rate limit
    WhiteOnly,
    /// Deny-listed clients are rejected, everyone else passes without a rate limit
    BlackOnly,
    /// Allow-listed clients skip the rate limit
    DefaultPlusWhite,
    /// Deny-listed clients are rejected before the rate limit
    DefaultPlusBlack,
    /// Deny list first, then allow list, then the rate limit
    DefaultPlusBoth,
}

impl ListPolicy {
    /// Whether this policy consults the deny list.
    pub fn checks_deny(&self) -> bool {
        matches!(
            self,
            ListPolicy::BlackOnly | ListPolicy::DefaultPlusBlack | ListPolicy::DefaultPlusBoth
        )
    }

    /// Whether this policy consults the allow list.
    pub fn checks_allow(&self) -> bool {
        matches!(
            self,
            ListPolicy::WhiteOnly | ListPolicy::DefaultPlusWhite | ListPolicy::DefaultPlusBoth
        )
    }
}

/// Unit for `window_length`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Millisecond,
    #[default]
    Second,
    Minute,
}

impl TimeUnit {
    /// Duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
        }
    }
}

/// Admission policy for one protected operation.
///
/// Immutable once registered. Fields are public so the policy can be written
/// as a literal or deserialized. [`crate::PolicyCatalog::register`] runs
/// [`PolicyConfig::validate`]; the limiter registry re-checks the limits on
/// every call and refuses a policy that fails them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Namespace partitioning limiter and list state
    #[serde(default = "default_group_name")]
    pub group_name: String,

    /// Rate-limiting algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Combination of list checks and rate limit
    #[serde(default)]
    pub list_policy: ListPolicy,

    /// Unit of `window_length`
    #[serde(default)]
    pub time_unit: TimeUnit,

    /// Window length, in `time_unit`
    #[serde(default = "default_window_length")]
    pub window_length: u64,

    /// Requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: f64,

    /// Allow-list entries declared with the policy
    #[serde(default)]
    pub static_white_list: Vec<String>,

    /// Deny-list entries declared with the policy
    #[serde(default)]
    pub static_black_list: Vec<String>,
}

fn default_group_name() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_window_length() -> u64 {
    1
}

fn default_max_requests() -> f64 {
    10.0
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            group_name: default_group_name(),
            algorithm: Algorithm::default(),
            list_policy: ListPolicy::default(),
            time_unit: TimeUnit::default(),
            window_length: default_window_length(),
            max_requests: default_max_requests(),
            static_white_list: Vec::new(),
            static_black_list: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Create a default policy for a group.
    pub fn for_group(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_list_policy(mut self, list_policy: ListPolicy) -> Self {
        self.list_policy = list_policy;
        self
    }

    /// Admit `max_requests` per `window_length` of `time_unit`.
    pub fn with_limit(mut self, max_requests: f64, window_length: u64, time_unit: TimeUnit) -> Self {
        self.max_requests = max_requests;
        self.window_length = window_length;
        self.time_unit = time_unit;
        self
    }

    pub fn with_white_list<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_white_list = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_black_list<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_black_list = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        let length = u32::try_from(self.window_length).unwrap_or(u32::MAX);
        self.time_unit.duration().saturating_mul(length)
    }

    /// Token bucket refill rate derived from the window settings.
    pub fn permits_per_second(&self) -> f64 {
        let length = self.window_length as f64;
        match self.time_unit {
            TimeUnit::Millisecond => self.max_requests * 1000.0 / length,
            TimeUnit::Second => self.max_requests / length,
            TimeUnit::Minute => self.max_requests / (length * 60.0),
        }
    }

    /// Check the policy invariants.
    pub fn validate(&self) -> Result<()> {
        self.validate_limits()?;
        for entry in self.static_white_list.iter().chain(&self.static_black_list) {
            matcher::validate_entry(entry)?;
        }
        Ok(())
    }

    /// Check the group and rate settings, leaving list patterns aside.
    ///
    /// Cheap enough to run on every rate-limit check.
    pub fn validate_limits(&self) -> Result<()> {
        if self.group_name.trim().is_empty() {
            return Err(TurnstileError::InvalidPolicy {
                field: "group_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.window_length == 0 {
            return Err(TurnstileError::InvalidPolicy {
                field: "window_length",
                reason: "must be positive".to_string(),
            });
        }
        if !self.max_requests.is_finite() || self.max_requests <= 0.0 {
            return Err(TurnstileError::InvalidPolicy {
                field: "max_requests",
                reason: format!("must be a positive number, got {}", self.max_requests),
            });
        }
        let rate = self.permits_per_second();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(TurnstileError::InvalidPolicy {
                field: "max_requests",
                reason: format!("gives a refill rate of {} per second", rate),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.group_name, "COMMON");
        assert_eq!(policy.algorithm, Algorithm::SlidingWindow);
        assert_eq!(policy.list_policy, ListPolicy::None);
        assert_eq!(policy.time_unit, TimeUnit::Second);
        assert_eq!(policy.window_length, 1);
        assert_eq!(policy.max_requests, 10.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_permits_per_second_conversion() {
        let policy = PolicyConfig::default().with_limit(5.0, 10, TimeUnit::Millisecond);
        assert_eq!(policy.permits_per_second(), 500.0);

        let policy = PolicyConfig::default().with_limit(30.0, 3, TimeUnit::Second);
        assert_eq!(policy.permits_per_second(), 10.0);

        let policy = PolicyConfig::default().with_limit(30.0, 2, TimeUnit::Minute);
        assert_eq!(policy.permits_per_second(), 0.25);
    }

    #[test]
    fn test_window_duration() {
        let policy = PolicyConfig::default().with_limit(1.0, 250, TimeUnit::Millisecond);
        assert_eq!(policy.window(), Duration::from_millis(250));

        let policy = PolicyConfig::default().with_limit(1.0, 2, TimeUnit::Minute);
        assert_eq!(policy.window(), Duration::from_secs(120));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let policy = PolicyConfig::default().with_limit(10.0, 0, TimeUnit::Second);
        assert!(matches!(
            policy.validate(),
            Err(TurnstileError::InvalidPolicy { field: "window_length", .. })
        ));

        for max in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let policy = PolicyConfig::default().with_limit(max, 1, TimeUnit::Second);
            assert!(
                matches!(
                    policy.validate(),
                    Err(TurnstileError::InvalidPolicy { field: "max_requests", .. })
                ),
                "max_requests {} should be rejected",
                max
            );
        }

        let policy = PolicyConfig::for_group("  ");
        assert!(policy.validate().is_err());

        let policy = PolicyConfig::default().with_limit(f64::MAX, 1, TimeUnit::Millisecond);
        assert!(matches!(
            policy.validate_limits(),
            Err(TurnstileError::InvalidPolicy { field: "max_requests", .. })
        ));
    }

    #[test]
    fn test_validate_limits_ignores_patterns() {
        let policy = PolicyConfig::default().with_white_list(["10.*.*"]);
        assert!(policy.validate_limits().is_ok());
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        let policy = PolicyConfig::default().with_white_list(["10.*.*"]);
        assert!(matches!(
            policy.validate(),
            Err(TurnstileError::InvalidPattern { .. })
        ));

        let policy = PolicyConfig::default().with_black_list(["10.0.0.1, 10.0.*"]);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_list_policy_checks() {
        assert!(!ListPolicy::None.checks_allow());
        assert!(!ListPolicy::None.checks_deny());
        assert!(ListPolicy::WhiteOnly.checks_allow());
        assert!(ListPolicy::BlackOnly.checks_deny());
        assert!(ListPolicy::DefaultPlusBoth.checks_allow());
        assert!(ListPolicy::DefaultPlusBoth.checks_deny());
    }

    #[test]
    fn test_parse_yaml_policy() {
        let yaml = r#"
group_name: login
algorithm: TOKEN_BUCKET
list_policy: DEFAULT_PLUS_BOTH
time_unit: MINUTE
window_length: 2
max_requests: 30
static_white_list:
  - "127.0.0.1, localhost"
"#;
        let policy: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.group_name, "login");
        assert_eq!(policy.algorithm, Algorithm::TokenBucket);
        assert_eq!(policy.list_policy, ListPolicy::DefaultPlusBoth);
        assert_eq!(policy.time_unit, TimeUnit::Minute);
        assert_eq!(policy.max_requests, 30.0);
        assert_eq!(policy.static_white_list.len(), 1);
        assert!(policy.static_black_list.is_empty());
    }
}
