//! Email address parsing for header values
//!
//! Header values may carry display names, quoted strings, RFC 5322 groups and
//! several comma-separated entries. The grammar is handled by
//! [`mailparse::addrparse`]; this module reduces the result to bare
//! `local@domain` addresses. Malformed input never produces an error: a
//! single-address header yields `None` and a list header yields an empty list.

use mailparse::{addrparse, MailAddr, SingleInfo};
use std::fmt;

/// A parsed `local@domain` address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    local_part: String,
    domain: String,
    raw: String,
}

impl Address {
    /// Split an address spec on its first `@`
    ///
    /// Returns `None` when there is no `@` or either side is empty. The
    /// domain is lower-cased; the local part is kept as written.
    pub fn parse(addr_spec: &str) -> Option<Self> {
        let trimmed = addr_spec.trim();
        let (local_part, domain) = trimmed.split_once('@')?;

        if local_part.is_empty() || domain.is_empty() {
            return None;
        }

        let domain = domain.to_lowercase();
        Some(Self {
            raw: format!("{}@{}", local_part, domain),
            local_part: local_part.to_string(),
            domain,
        })
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The bare address, `local@domain`
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Case-insensitive domain membership
    pub fn is_in_domain(&self, domain: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
    }

    /// Address with every `.` removed from the local part
    pub fn without_local_dots(&self) -> String {
        format!("{}@{}", self.local_part.replace('.', ""), self.domain)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn from_single(info: &SingleInfo) -> Option<Address> {
    Address::parse(&info.addr)
}

/// Parse a single-address header such as `From`
///
/// A group entry resolves to its first member.
pub fn parse_one(raw: &str) -> Option<Address> {
    if raw.trim().is_empty() {
        return None;
    }

    let list = addrparse(raw).ok()?;
    match list.iter().next()? {
        MailAddr::Single(info) => from_single(info),
        MailAddr::Group(group) => group.addrs.first().and_then(from_single),
    }
}

/// Parse a multi-address header such as `To`
///
/// Order is preserved and nothing is deduplicated. Groups are expanded in
/// place into their members.
pub fn parse_list(raw: &str) -> Vec<Address> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let list = match addrparse(raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::debug!("Ignoring unparsable address header {:?}: {}", raw, e);
            return Vec::new();
        }
    };

    let mut addresses = Vec::new();
    for entry in list.iter() {
        match entry {
            MailAddr::Single(info) => addresses.extend(from_single(info)),
            MailAddr::Group(group) => addresses.extend(group.addrs.iter().filter_map(from_single)),
        }
    }
    addresses
}
