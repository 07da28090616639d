//! Calendar event classification
//!
//! An event counts as an internal meeting when every other attendee is in the
//! home domain, the event is confirmed, the account owner hosts or accepted
//! it, and it has already started.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};

use crate::address::Address;
use crate::models::{Criteria, EventRow, RawEvent};

const CONFIRMED: &str = "confirmed";
const ACCEPTED: &str = "accepted";

/// A calendar event with its derived attendee facts
///
/// Derived values are computed once in [`CalendarEvent::new`].
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    raw: RawEvent,
    attendee_emails: Vec<String>,
    attendee_domains: Vec<String>,
    /// An attendee email without a usable domain
    has_unparsable_attendee: bool,
    is_host: bool,
    is_attending: bool,
    start: Option<DateTime<Local>>,
    home_domain: String,
}

impl CalendarEvent {
    pub fn new(raw: RawEvent, criteria: &Criteria) -> Self {
        let self_email = criteria.identity.self_email();

        let attendee_emails: Vec<String> = raw
            .attendees
            .iter()
            .filter_map(|attendee| attendee.email.clone())
            .filter(|email| email != self_email)
            .collect();

        let mut attendee_domains: Vec<String> = Vec::new();
        let mut has_unparsable_attendee = false;
        for email in &attendee_emails {
            match Address::parse(email) {
                Some(address) => {
                    if !attendee_domains.iter().any(|d| d == address.domain()) {
                        attendee_domains.push(address.domain().to_string());
                    }
                }
                None => has_unparsable_attendee = true,
            }
        }

        let is_host = raw.organizer_email.as_deref() == Some(self_email);

        let is_attending = raw.attendees.iter().any(|attendee| {
            attendee.is_self && attendee.response_status.as_deref() == Some(ACCEPTED)
        });

        let start = raw.start.as_deref().and_then(parse_start);

        Self {
            raw,
            attendee_emails,
            attendee_domains,
            has_unparsable_attendee,
            is_host,
            is_attending,
            start,
            home_domain: criteria.identity.home_domain().to_string(),
        }
    }

    pub fn raw(&self) -> &RawEvent {
        &self.raw
    }

    /// Attendee emails other than the account owner
    pub fn attendee_emails(&self) -> &[String] {
        &self.attendee_emails
    }

    /// Distinct attendee domains in order of first appearance
    pub fn attendee_domains(&self) -> &[String] {
        &self.attendee_domains
    }

    /// True when the attendee domains are exactly the home domain
    pub fn is_internal(&self) -> bool {
        !self.has_unparsable_attendee
            && self.attendee_domains.len() == 1
            && self.attendee_domains[0] == self.home_domain
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_attending(&self) -> bool {
        self.is_attending
    }

    pub fn is_confirmed(&self) -> bool {
        self.raw.status.as_deref() == Some(CONFIRMED)
    }

    pub fn number_of_attendees(&self) -> usize {
        self.attendee_emails.len()
    }

    pub fn is_one_on_one(&self) -> bool {
        self.number_of_attendees() == 1
    }

    /// Start time in local time, if the provider value parsed
    pub fn start(&self) -> Option<DateTime<Local>> {
        self.start
    }

    /// Whether the event started at or before `now`
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start.map_or(false, |start| start.with_timezone(&Utc) <= now)
    }

    pub fn should_include(&self) -> bool {
        self.should_include_at(Utc::now())
    }

    pub fn should_include_at(&self, now: DateTime<Utc>) -> bool {
        self.is_internal()
            && self.is_confirmed()
            && (self.is_host() || self.is_attending())
            && self.number_of_attendees() > 0
            && self.has_started(now)
    }

    pub fn to_row(&self) -> EventRow {
        EventRow {
            date: self.raw.start.clone().unwrap_or_default(),
            year: self.start.map(|start| start.year()),
            month: self.start.map(|start| start.month()),
            summary: self.raw.summary.clone().unwrap_or_default(),
            is_host: self.is_host(),
            is_one_on_one: self.is_one_on_one(),
            number_of_attendees: self.number_of_attendees(),
        }
    }
}

/// Parse a provider start value into local time
///
/// All-day dates become local midnight.
pub fn parse_start(value: &str) -> Option<DateTime<Local>> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time.with_timezone(&Local));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Local.from_local_datetime(&midnight).earliest()
}
