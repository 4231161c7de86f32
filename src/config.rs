//! Configuration management for Turnstile.
//!
//! Configuration is read from a YAML file and overlaid with environment
//! variables prefixed `TURNSTILE_` (nested keys separated by `__`, e.g.
//! `TURNSTILE_LOGGING__LEVEL=debug`).
//!
//! List patterns may contain `${name}` or `${name:default}` placeholders. They
//! are resolved once at load time, first from `properties`, then from the
//! process environment, then from the inline default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::catalog::PolicyCatalog;
use crate::error::{Result, TurnstileError};
use crate::lists::{DynamicListStore, ListKind};
use crate::policy::PolicyConfig;

const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Values substituted into `${name}` placeholders
    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Policies for guarded operations
    #[serde(default)]
    pub policies: Vec<OperationPolicy>,

    /// Initial dynamic list entries
    #[serde(default)]
    pub lists: ListSeeds,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// A policy bound to the operation it guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPolicy {
    /// Operation name, as the interception layer knows it
    pub operation: String,

    /// The policy; every field has a default
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Initial entries for the dynamic allow and deny lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSeeds {
    #[serde(default)]
    pub allow: Vec<GroupEntries>,

    #[serde(default)]
    pub deny: Vec<GroupEntries>,
}

/// List entries for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntries {
    pub group: String,

    #[serde(default)]
    pub entries: Vec<String>,
}

impl TurnstileConfig {
    /// Load configuration from a file path, with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(TurnstileError::Config(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: TurnstileConfig = settings.try_deserialize()?;
        config.resolve_placeholders()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: TurnstileConfig = serde_yaml::from_str(yaml)?;
        config.resolve_placeholders()?;
        Ok(config)
    }

    /// Replace placeholders in every list pattern with their values.
    pub fn resolve_placeholders(&mut self) -> Result<()> {
        let properties = &self.properties;

        for binding in &mut self.policies {
            let policy = &mut binding.policy;
            for entry in policy
                .static_white_list
                .iter_mut()
                .chain(policy.static_black_list.iter_mut())
            {
                *entry = resolve(entry, properties)?;
            }
        }

        for group in self.lists.allow.iter_mut().chain(self.lists.deny.iter_mut()) {
            for entry in &mut group.entries {
                *entry = resolve(entry, properties)?;
            }
        }

        Ok(())
    }

    /// Build the catalog of configured policies.
    pub fn catalog(&self) -> Result<PolicyCatalog> {
        let mut catalog = PolicyCatalog::new();
        for binding in &self.policies {
            catalog.register(&binding.operation, binding.policy.clone())?;
        }
        info!(operations = catalog.len(), "Policy catalog built");
        Ok(catalog)
    }

    /// Load the configured initial entries into a list store.
    pub fn seed_lists(&self, store: &DynamicListStore) -> Result<()> {
        let seeds = [
            (ListKind::Allow, &self.lists.allow),
            (ListKind::Deny, &self.lists.deny),
        ];
        for (kind, groups) in seeds {
            for group in groups {
                for entry in &group.entries {
                    store.add(kind, &group.group, entry)?;
                }
            }
        }
        Ok(())
    }
}

fn lookup(name: &str, properties: &HashMap<String, String>) -> Option<String> {
    properties
        .get(name)
        .or_else(|| properties.get(&name.to_lowercase()))
        .cloned()
        .or_else(|| std::env::var(name).ok())
}

fn resolve(text: &str, properties: &HashMap<String, String>) -> Result<String> {
    let mut resolved = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            TurnstileError::Config(format!("unterminated placeholder in '{}'", text))
        })?;

        let expr = &after[..end];
        let (name, default) = match expr.split_once(':') {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (expr.trim(), None),
        };

        let value = lookup(name, properties)
            .or_else(|| default.map(str::to_string))
            .ok_or_else(|| {
                TurnstileError::Config(format!("unresolved placeholder '{}' in '{}'", name, text))
            })?;
        resolved.push_str(&value);
        rest = &after[end + 1..];
    }

    resolved.push_str(rest);
    Ok(resolved)
}
