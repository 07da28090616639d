//! Email message classification

use chrono::{DateTime, Datelike, Local, SecondsFormat, TimeZone, Utc};

use crate::address::{self, Address};
use crate::models::{Criteria, MessageRow, RawMessage};

/// One message of a thread, with its parsed addresses
///
/// Header parsing and every derived flag are computed once in
/// [`EmailMessage::new`]; the criteria are not retained.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    raw: RawMessage,
    from: Option<Address>,
    to: Vec<Address>,
    is_sender: bool,
    is_internal: bool,
    excluded_from: bool,
    excluded_to: bool,
}

impl EmailMessage {
    pub fn new(raw: RawMessage, criteria: &Criteria) -> Self {
        let from = find_header(&raw, "From").and_then(address::parse_one);
        let to = find_header(&raw, "To")
            .map(address::parse_list)
            .unwrap_or_default();

        let home_domain = criteria.identity.home_domain();
        let is_internal = from
            .as_ref()
            .map_or(false, |from| from.is_in_domain(home_domain))
            && to.iter().all(|recipient| recipient.is_in_domain(home_domain));

        let is_sender = from
            .as_ref()
            .map_or(false, |from| criteria.identity.is_self(from));
        let excluded_from = from
            .as_ref()
            .map_or(false, |from| criteria.excluded_from.matches(from));
        let excluded_to = criteria.excluded_to.matches_any(&to);

        Self {
            raw,
            from,
            to,
            is_sender,
            is_internal,
            excluded_from,
            excluded_to,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.raw.id.as_deref()
    }

    /// Value of the first header named exactly `name`
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.raw, name)
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    pub fn from(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    pub fn to(&self) -> &[Address] {
        &self.to
    }

    pub fn is_sender(&self) -> bool {
        self.is_sender
    }

    /// Sender and every recipient are in the home domain
    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub fn excluded_from(&self) -> bool {
        self.excluded_from
    }

    pub fn excluded_to(&self) -> bool {
        self.excluded_to
    }

    pub fn should_include(&self) -> bool {
        self.is_internal && !self.excluded_from && !self.excluded_to
    }

    /// Internal date as reported upstream
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.raw
            .internal_date_millis
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    pub fn to_row(&self) -> MessageRow {
        let date = self.date();
        let local = date.map(|date| date.with_timezone(&Local));

        MessageRow {
            date: date
                .map(|date| date.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            year: local.map(|date| date.year()),
            month: local.map(|date| date.month()),
            subject: self.subject().to_string(),
            from: self.from.as_ref().map(|from| from.to_string()).unwrap_or_default(),
            to: self
                .to
                .iter()
                .map(Address::as_str)
                .collect::<Vec<_>>()
                .join(","),
            is_sender: self.is_sender,
        }
    }
}

fn find_header<'a>(raw: &'a RawMessage, name: &str) -> Option<&'a str> {
    raw.headers
        .iter()
        .find(|header| header.name == name)
        .map(|header| header.value.as_str())
}
