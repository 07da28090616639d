//! Address blocklists for the From and To headers
//!
//! Configured entries come in two forms that are kept apart:
//! - an exact address (`notifications@example.com`)
//! - a domain suffix (`*@example.com` or `@example.com`), which also covers
//!   subdomains such as `mail.example.com`
//!
//! Matching is case-insensitive.

use crate::address::Address;
use std::collections::HashSet;

/// One configured blocklist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionRule {
    /// Matches one address exactly
    Address(String),
    /// Matches every address in the domain or one of its subdomains
    Domain(String),
}

impl ExclusionRule {
    /// Interpret a configured entry
    ///
    /// Returns `None` for blank entries.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim().to_lowercase();
        if entry.is_empty() {
            return None;
        }

        if let Some(domain) = entry.strip_prefix("*@").or_else(|| entry.strip_prefix('@')) {
            if domain.is_empty() {
                return None;
            }
            return Some(ExclusionRule::Domain(domain.to_string()));
        }

        Some(ExclusionRule::Address(entry))
    }

    /// Gmail search operand for this entry (`*@domain` or the address)
    pub fn query_operand(&self) -> String {
        match self {
            ExclusionRule::Address(address) => address.clone(),
            ExclusionRule::Domain(domain) => format!("*@{}", domain),
        }
    }
}

/// Blocklist with set lookup for exact addresses and suffix checks for domains
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    /// Exact addresses, lower-cased, for fast lookup
    addresses: HashSet<String>,
    domains: Vec<String>,
    /// All rules in configuration order (for query building)
    rules: Vec<ExclusionRule>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from configured entries, skipping blanks and duplicates
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for entry in entries {
            if let Some(rule) = ExclusionRule::parse(entry.as_ref()) {
                list.add(rule);
            }
        }
        list
    }

    /// Add a rule
    pub fn add(&mut self, rule: ExclusionRule) {
        if self.rules.contains(&rule) {
            return;
        }

        match &rule {
            ExclusionRule::Address(address) => {
                self.addresses.insert(address.clone());
            }
            ExclusionRule::Domain(domain) => self.domains.push(domain.clone()),
        }
        self.rules.push(rule);
    }

    /// Check whether an address is blocked
    pub fn matches(&self, address: &Address) -> bool {
        if self.addresses.contains(&address.as_str().to_lowercase()) {
            return true;
        }

        let domain = address.domain();
        self.domains.iter().any(|blocked| {
            domain == blocked
                || domain
                    .strip_suffix(blocked.as_str())
                    .map_or(false, |prefix| prefix.ends_with('.'))
        })
    }

    /// Check whether any of the addresses is blocked
    pub fn matches_any<'a, I>(&self, addresses: I) -> bool
    where
        I: IntoIterator<Item = &'a Address>,
    {
        addresses.into_iter().any(|address| self.matches(address))
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
