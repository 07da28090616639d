//! Common test utilities and fixtures

#![allow(dead_code)]

use interaction_stats::client::{CalendarSource, MailSource};
use interaction_stats::config::Config;
use interaction_stats::error::Result;
use interaction_stats::models::{
    EventWindow, MessageHeader, RawAttendee, RawEvent, RawMessage, ThreadPage, ThreadRef,
};
use mockall::mock;

pub const SELF_EMAIL: &str = "u@h.com";

/// Configuration for `u@h.com` scanning `years`
pub fn test_config(years: Vec<i32>) -> Config {
    let mut config = Config::default();
    config.identity.self_email = SELF_EMAIL.to_string();
    config.scan.years = years;
    config
}

/// A message with From and To headers, dated mid-2020
pub fn create_test_message(from: &str, to: &str) -> RawMessage {
    RawMessage {
        id: None,
        headers: vec![
            MessageHeader::new("From", from),
            MessageHeader::new("To", to),
            MessageHeader::new("Subject", "Test subject"),
        ],
        internal_date_millis: Some(1_592_222_400_000),
    }
}

/// A message where every party is in the home domain
pub fn internal_message() -> RawMessage {
    create_test_message("v@h.com", SELF_EMAIL)
}

/// A message with one recipient outside the home domain
pub fn external_message() -> RawMessage {
    create_test_message("v@h.com", "u@h.com, partner@other.com")
}

pub fn attendee(email: &str) -> RawAttendee {
    RawAttendee {
        email: Some(email.to_string()),
        is_self: false,
        response_status: Some("needsAction".to_string()),
    }
}

pub fn self_attendee(status: &str) -> RawAttendee {
    RawAttendee {
        email: Some(SELF_EMAIL.to_string()),
        is_self: true,
        response_status: Some(status.to_string()),
    }
}

/// A confirmed, accepted one-on-one with `v@h.com`
pub fn internal_event(start: &str, summary: &str) -> RawEvent {
    RawEvent {
        id: Some(format!("evt-{}", summary)),
        organizer_email: Some("v@h.com".to_string()),
        attendees: vec![self_attendee("accepted"), attendee("v@h.com")],
        start: Some(start.to_string()),
        summary: Some(summary.to_string()),
        status: Some("confirmed".to_string()),
    }
}

/// A page of thread references with ids `{prefix}-{n}`
pub fn thread_page(prefix: &str, count: usize, next_page_token: Option<&str>) -> ThreadPage {
    ThreadPage {
        threads: (0..count)
            .map(|n| ThreadRef {
                id: format!("{}-{}", prefix, n),
            })
            .collect(),
        next_page_token: next_page_token.map(str::to_string),
    }
}

mock! {
    pub MailSource {}

    #[async_trait::async_trait]
    impl MailSource for MailSource {
        async fn list_threads(
            &self,
            query: &str,
            max_results: u32,
            page_token: Option<String>,
        ) -> Result<ThreadPage>;
        async fn get_thread(&self, thread_id: &str) -> Result<Vec<RawMessage>>;
    }
}

mock! {
    pub CalendarSource {}

    #[async_trait::async_trait]
    impl CalendarSource for CalendarSource {
        async fn list_events(&self, window: EventWindow, max_results: u32) -> Result<Vec<RawEvent>>;
    }
}
