//! Runtime-mutable allow and deny lists.
//!
//! Each policy group owns an ordered list of entries in the allow map and in
//! the deny map. At evaluation time these are OR-ed with the static lists the
//! policy itself declares; dynamic removals never touch static entries.

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::matcher;
use crate::policy::PolicyConfig;

/// Which of the two lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Deny,
}

impl ListKind {
    fn as_str(&self) -> &'static str {
        match self {
            ListKind::Allow => "allow",
            ListKind::Deny => "deny",
        }
    }
}

/// Dynamic allow/deny entries, keyed by group name.
///
/// Mutations on one group are atomic with respect to each other and to
/// concurrent reads; different groups live in independent map slots.
#[derive(Debug, Default)]
pub struct DynamicListStore {
    allow: DashMap<String, Vec<String>>,
    deny: DashMap<String, Vec<String>>,
}

impl DynamicListStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: ListKind) -> &DashMap<String, Vec<String>> {
        match kind {
            ListKind::Allow => &self.allow,
            ListKind::Deny => &self.deny,
        }
    }

    /// Append an entry to a group's list, creating the group if needed.
    ///
    /// The entry may hold several comma-separated patterns.
    pub fn add(&self, kind: ListKind, group: &str, entry: &str) -> Result<()> {
        matcher::validate_entry(entry)?;
        self.map(kind)
            .entry(group.to_string())
            .or_default()
            .push(entry.to_string());

        info!(list = kind.as_str(), group = %group, entry = %entry, "Added list entry");
        Ok(())
    }

    /// Remove a whole group, returning its entries if it existed.
    pub fn remove_group(&self, kind: ListKind, group: &str) -> Option<Vec<String>> {
        let removed = self.map(kind).remove(group).map(|(_, entries)| entries);
        if removed.is_some() {
            info!(list = kind.as_str(), group = %group, "Removed list group");
        }
        removed
    }

    /// Remove the first occurrence of one literal entry from a group.
    ///
    /// Returns whether anything was removed; a missing group or entry is a no-op.
    /// Only one occurrence goes, so an add followed by a remove leaves the list
    /// as it was.
    pub fn remove_entry(&self, kind: ListKind, group: &str, entry: &str) -> bool {
        let Some(mut entries) = self.map(kind).get_mut(group) else {
            return false;
        };
        let Some(index) = entries.iter().position(|e| e == entry) else {
            return false;
        };
        entries.remove(index);

        info!(list = kind.as_str(), group = %group, entry = %entry, "Removed list entry");
        true
    }

    /// Snapshot of a group's entries.
    pub fn entries(&self, kind: ListKind, group: &str) -> Vec<String> {
        self.map(kind)
            .get(group)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    fn listed(&self, kind: ListKind, group: &str, static_entries: &[String], address: &str) -> bool {
        if static_entries
            .iter()
            .any(|entry| matcher::entry_matches(entry, address))
        {
            debug!(list = kind.as_str(), group = %group, address = %address, "Matched static list");
            return true;
        }

        let matched = self.map(kind).get(group).is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| matcher::entry_matches(entry, address))
        });
        if matched {
            debug!(list = kind.as_str(), group = %group, address = %address, "Matched dynamic list");
        }
        matched
    }

    /// Whether `address` is on the policy's static allow list or its group's dynamic one.
    pub fn is_allowed(&self, policy: &PolicyConfig, address: &str) -> bool {
        self.listed(
            ListKind::Allow,
            &policy.group_name,
            &policy.static_white_list,
            address,
        )
    }

    /// Whether `address` is on the policy's static deny list or its group's dynamic one.
    pub fn is_denied(&self, policy: &PolicyConfig, address: &str) -> bool {
        self.listed(
            ListKind::Deny,
            &policy.group_name,
            &policy.static_black_list,
            address,
        )
    }

    pub fn add_allow(&self, group: &str, entry: &str) -> Result<()> {
        self.add(ListKind::Allow, group, entry)
    }

    pub fn add_deny(&self, group: &str, entry: &str) -> Result<()> {
        self.add(ListKind::Deny, group, entry)
    }

    pub fn remove_allow_group(&self, group: &str) -> Option<Vec<String>> {
        self.remove_group(ListKind::Allow, group)
    }

    pub fn remove_deny_group(&self, group: &str) -> Option<Vec<String>> {
        self.remove_group(ListKind::Deny, group)
    }

    pub fn remove_allow_pattern(&self, group: &str, entry: &str) -> bool {
        self.remove_entry(ListKind::Allow, group, entry)
    }

    pub fn remove_deny_pattern(&self, group: &str, entry: &str) -> bool {
        self.remove_entry(ListKind::Deny, group, entry)
    }

    pub fn allow_patterns(&self, group: &str) -> Vec<String> {
        self.entries(ListKind::Allow, group)
    }

    pub fn deny_patterns(&self, group: &str) -> Vec<String> {
        self.entries(ListKind::Deny, group)
    }

    /// Drop every dynamic entry in both lists.
    pub fn clear(&self) {
        self.allow.clear();
        self.deny.clear();
    }
}
