//! Registered policies, keyed by the operation they guard.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, TurnstileError};
use crate::policy::{Algorithm, PolicyConfig};

/// Validated policies for every guarded operation.
///
/// Registration is where malformed policies fail, before any request is
/// evaluated. Operations sharing a group must agree on the algorithm, since a
/// limiter slot is created for one algorithm only.
#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    policies: HashMap<String, Arc<PolicyConfig>>,
    group_algorithms: HashMap<String, Algorithm>,
}

impl PolicyCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the policy guarding `operation`.
    pub fn register(&mut self, operation: &str, policy: PolicyConfig) -> Result<Arc<PolicyConfig>> {
        if self.policies.contains_key(operation) {
            return Err(TurnstileError::Config(format!(
                "operation '{}' is already registered",
                operation
            )));
        }

        policy.validate()?;

        if let Some(existing) = self.group_algorithms.get(&policy.group_name) {
            if *existing != policy.algorithm {
                return Err(TurnstileError::Config(format!(
                    "operation '{}' uses {:?} for group '{}', which already uses {:?}",
                    operation, policy.algorithm, policy.group_name, existing
                )));
            }
        }

        debug!(
            operation = %operation,
            group = %policy.group_name,
            algorithm = ?policy.algorithm,
            list_policy = ?policy.list_policy,
            "Registered policy"
        );

        self.group_algorithms
            .insert(policy.group_name.clone(), policy.algorithm);
        let policy = Arc::new(policy);
        self.policies
            .insert(operation.to_string(), Arc::clone(&policy));
        Ok(policy)
    }

    /// Get the policy for an operation.
    pub fn get(&self, operation: &str) -> Option<Arc<PolicyConfig>> {
        self.policies.get(operation).cloned()
    }

    /// Get the policy for an operation, failing if it was never registered.
    pub fn require(&self, operation: &str) -> Result<Arc<PolicyConfig>> {
        self.get(operation)
            .ok_or_else(|| TurnstileError::UnknownOperation(operation.to_string()))
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut operations: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        operations.sort_unstable();
        operations
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no operation is registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
