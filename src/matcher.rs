//! Wildcard address matching for allow and deny lists.
//!
//! Patterns come in four shapes:
//! - a literal address (`172.16.50.21`), compared for equality
//! - a lone `*`, matching any address
//! - a single `*` (`172.*`, `*.21`, `172.*.21`), matched as a prefix and/or suffix
//! - several `*` in dotted-quad form (`172.*.*.21`), matched octet by octet
//!
//! A list entry may hold several patterns separated by [`LIST_SEPARATOR`].

use crate::error::{Result, TurnstileError};

/// The wildcard character.
pub const WILDCARD: char = '*';

/// Separator between patterns inside a single list entry.
pub const LIST_SEPARATOR: char = ',';

const IPV4_SEGMENTS: usize = 4;

/// Check whether `address` matches `pattern`.
///
/// A multi-wildcard pattern applied to anything other than a four-segment
/// dotted address is a non-match, never an error.
pub fn matches(pattern: &str, address: &str) -> bool {
    match pattern.matches(WILDCARD).count() {
        0 => pattern == address,
        _ if pattern == "*" => true,
        1 => match pattern.split_once(WILDCARD) {
            Some((head, tail)) => {
                address.len() >= head.len() + tail.len()
                    && address.starts_with(head)
                    && address.ends_with(tail)
            }
            None => false,
        },
        _ => matches_octets(pattern, address),
    }
}

fn matches_octets(pattern: &str, address: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let address_segments: Vec<&str> = address.split('.').collect();

    if pattern_segments.len() != IPV4_SEGMENTS || address_segments.len() != IPV4_SEGMENTS {
        return false;
    }

    pattern_segments
        .iter()
        .zip(&address_segments)
        .all(|(p, a)| *p == "*" || p == a)
}

/// Split a list entry into its trimmed, non-empty patterns.
pub fn split_entry(entry: &str) -> impl Iterator<Item = &str> {
    entry
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Check whether any pattern in `entry` matches `address`.
pub fn entry_matches(entry: &str, address: &str) -> bool {
    split_entry(entry).any(|pattern| matches(pattern, address))
}

/// Reject list entries that could never match as written.
pub fn validate_entry(entry: &str) -> Result<()> {
    if split_entry(entry).next().is_none() {
        return Err(TurnstileError::invalid_pattern(entry, "no pattern given"));
    }
    split_entry(entry).try_for_each(validate_pattern)
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.chars().any(char::is_whitespace) {
        return Err(TurnstileError::invalid_pattern(
            pattern,
            "contains whitespace",
        ));
    }

    if pattern.matches(WILDCARD).count() < 2 {
        return Ok(());
    }

    let segments: Vec<&str> = pattern.split('.').collect();
    if segments.len() != IPV4_SEGMENTS {
        return Err(TurnstileError::invalid_pattern(
            pattern,
            "patterns with several wildcards must have four dotted segments",
        ));
    }
    if let Some(segment) = segments
        .iter()
        .find(|s| s.contains(WILDCARD) && **s != "*")
    {
        return Err(TurnstileError::invalid_pattern(
            pattern,
            format!("segment '{}' mixes a wildcard with literal text", segment),
        ));
    }

    Ok(())
}
