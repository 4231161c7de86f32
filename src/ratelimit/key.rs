//! Limiter key generation and handling.

use std::fmt;

/// A key that uniquely identifies one limiter slot.
///
/// Rate-limit state is partitioned first by client, then by group, so two
/// operations sharing a group share a budget while unrelated groups do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    /// The client identity, typically a source address
    pub client_id: String,
    /// The policy group
    pub group_name: String,
}

impl LimiterKey {
    /// Create a new limiter key.
    pub fn new(client_id: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            group_name: group_name.into(),
        }
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_id, self.group_name)
    }
}
