use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Config;
use crate::error::{Result, StatsError};
use crate::exclusions::ExclusionList;

/// One attendee entry of a calendar event as returned upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAttendee {
    pub email: Option<String>,
    pub is_self: bool,
    pub response_status: Option<String>,
}

/// A calendar event record as returned upstream
///
/// `start` is the provider's start value: an RFC 3339 date-time, or a
/// `YYYY-MM-DD` date for all-day events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Option<String>,
    pub organizer_email: Option<String>,
    pub attendees: Vec<RawAttendee>,
    pub start: Option<String>,
    pub summary: Option<String>,
    pub status: Option<String>,
}

/// A single message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An email message record (metadata format) as returned upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Option<String>,
    pub headers: Vec<MessageHeader>,
    pub internal_date_millis: Option<i64>,
}

/// A thread reference from a search result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
}

/// One page of thread search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub threads: Vec<ThreadRef>,
    pub next_page_token: Option<String>,
}

/// Half-open time window `[start, end)` for an events query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventWindow {
    /// January 1st of `year` up to January 1st of the following year, UTC
    pub fn for_year(year: i32) -> Result<Self> {
        let start = year_start(year)?;
        let end = year_start(year + 1)?;
        Ok(Self { start, end })
    }
}

fn year_start(year: i32) -> Result<DateTime<Utc>> {
    chrono::NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StatsError::ConfigError(format!("Invalid year {}", year)))
}

/// Flattened calendar event, one CSV line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub date: String,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub summary: String,
    pub is_host: bool,
    pub is_one_on_one: bool,
    pub number_of_attendees: usize,
}

impl EventRow {
    pub const HEADERS: [&'static str; 7] = [
        "date",
        "year",
        "month",
        "summary",
        "isHost",
        "isOneOnOne",
        "numberOfAttendees",
    ];
}

/// Flattened email message, one CSV line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub date: String,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub is_sender: bool,
}

impl MessageRow {
    pub const HEADERS: [&'static str; 7] =
        ["date", "year", "month", "subject", "from", "to", "isSender"];
}

/// Who "self" is for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    self_email: String,
    self_address: Address,
    ignore_local_part_dots: bool,
}

impl Identity {
    pub fn new(self_email: &str, ignore_local_part_dots: bool) -> Result<Self> {
        let self_address = Address::parse(self_email).ok_or_else(|| {
            StatsError::ConfigError(format!("'{}' is not a valid self email", self_email))
        })?;

        Ok(Self {
            self_email: self_email.trim().to_string(),
            self_address,
            ignore_local_part_dots,
        })
    }

    /// The configured self email exactly as written
    pub fn self_email(&self) -> &str {
        &self.self_email
    }

    pub fn home_domain(&self) -> &str {
        self.self_address.domain()
    }

    /// Whether `address` is the account owner
    ///
    /// Case-insensitive. With `ignore_local_part_dots`, dots in the local
    /// part are dropped on both sides before comparing.
    pub fn is_self(&self, address: &Address) -> bool {
        if address.as_str().eq_ignore_ascii_case(self.self_address.as_str()) {
            return true;
        }

        self.ignore_local_part_dots
            && address
                .without_local_dots()
                .eq_ignore_ascii_case(&self.self_address.without_local_dots())
    }
}

/// Everything the classifiers need, fixed for the run
#[derive(Debug, Clone)]
pub struct Criteria {
    pub identity: Identity,
    pub excluded_from: ExclusionList,
    pub excluded_to: ExclusionList,
}

impl Criteria {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            excluded_from: ExclusionList::new(),
            excluded_to: ExclusionList::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let identity = Identity::new(
            &config.identity.self_email,
            config.identity.ignore_local_part_dots,
        )?;

        Ok(Self {
            identity,
            excluded_from: ExclusionList::from_entries(&config.exclusions.from),
            excluded_to: ExclusionList::from_entries(&config.exclusions.to),
        })
    }

    pub fn with_excluded_from(mut self, list: ExclusionList) -> Self {
        self.excluded_from = list;
        self
    }

    pub fn with_excluded_to(mut self, list: ExclusionList) -> Self {
        self.excluded_to = list;
        self
    }
}
