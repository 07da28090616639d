//! Calendar and Gmail API clients with retry and timeout handling

use async_trait::async_trait;
use chrono::SecondsFormat;
use google_calendar3::api::Event;
use google_gmail1::api::Message;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{ApiHubs, CalendarHub, GmailHub, CALENDAR_READONLY_SCOPE, GMAIL_READONLY_SCOPE};
use crate::config::{RetryConfig, ScanConfig};
use crate::error::{Result, StatsError};
use crate::models::{EventWindow, MessageHeader, RawAttendee, RawEvent, RawMessage, ThreadPage, ThreadRef};

/// Headers requested for every message
pub const METADATA_HEADERS: [&str; 3] = ["From", "To", "Subject"];

/// Calendar retrieval, one window per call
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// List single events of the primary calendar in `window`, ordered by start time
    async fn list_events(&self, window: EventWindow, max_results: u32) -> Result<Vec<RawEvent>>;
}

/// Mail retrieval: thread search and per-thread message metadata
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Fetch one page of threads matching `query`
    async fn list_threads(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<ThreadPage>;

    /// Fetch the messages of a thread with From/To/Subject headers
    async fn get_thread(&self, thread_id: &str) -> Result<Vec<RawMessage>>;
}

/// Backoff settings for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

/// Google Workspace client backing both sources
pub struct GoogleWorkspaceClient {
    gmail: GmailHub,
    calendar: CalendarHub,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GoogleWorkspaceClient {
    pub fn new(hubs: ApiHubs, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            gmail: hubs.gmail,
            calendar: hubs.calendar,
            retry,
            timeout,
        }
    }

    pub fn from_config(hubs: ApiHubs, scan: &ScanConfig, retry: &RetryConfig) -> Self {
        Self::new(
            hubs,
            RetryPolicy::from(retry),
            Duration::from_secs(scan.request_timeout_secs),
        )
    }

    /// Check if an error is retryable
    fn should_retry(error: &StatsError) -> bool {
        matches!(
            error,
            StatsError::ServerError { .. }
                | StatsError::RateLimitExceeded { .. }
                | StatsError::NetworkError(_)
        )
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = policy.initial_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= policy.max_retries => {
                    let wait = match &e {
                        StatsError::RateLimitExceeded { retry_after } => {
                            std::cmp::min(delay.max(Duration::from_secs(*retry_after)), policy.max_delay)
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        policy.max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, policy.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Await an API call, failing with a network error once the timeout elapses
    async fn with_timeout<T, E, Fut>(&self, operation_name: &str, api_call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        StatsError: From<E>,
    {
        match tokio::time::timeout(self.timeout, api_call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("{} call timed out after {:?}", operation_name, self.timeout);
                Err(StatsError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl CalendarSource for GoogleWorkspaceClient {
    async fn list_events(&self, window: EventWindow, max_results: u32) -> Result<Vec<RawEvent>> {
        let max_results = i32::try_from(max_results).unwrap_or(i32::MAX);

        Self::with_retry(&self.retry, "list_events", || async {
            debug!("Listing events from {} to {}", window.start, window.end);
            let (_, response) = self
                .with_timeout(
                    "list_events",
                    self.calendar
                        .events()
                        .list("primary")
                        .time_min(window.start)
                        .time_max(window.end)
                        .max_results(max_results)
                        .single_events(true)
                        .order_by("startTime")
                        .add_scope(CALENDAR_READONLY_SCOPE)
                        .doit(),
                )
                .await?;

            if response.next_page_token.is_some() {
                warn!(
                    "More than {} events between {} and {}; later events are not counted",
                    max_results, window.start, window.end
                );
            }

            Ok(response
                .items
                .unwrap_or_default()
                .into_iter()
                .map(convert_event)
                .collect())
        })
        .await
    }
}

#[async_trait]
impl MailSource for GoogleWorkspaceClient {
    async fn list_threads(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<ThreadPage> {
        Self::with_retry(&self.retry, "list_threads", || async {
            let mut call = self
                .gmail
                .users()
                .threads_list("me")
                .q(query)
                .max_results(max_results);

            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) = self
                .with_timeout("list_threads", call.add_scope(GMAIL_READONLY_SCOPE).doit())
                .await?;

            let threads = response
                .threads
                .unwrap_or_default()
                .into_iter()
                .filter_map(|thread| thread.id.map(|id| ThreadRef { id }))
                .collect();

            Ok(ThreadPage {
                threads,
                next_page_token: response.next_page_token,
            })
        })
        .await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Vec<RawMessage>> {
        Self::with_retry(&self.retry, "get_thread", || async {
            let mut call = self
                .gmail
                .users()
                .threads_get("me", thread_id)
                .format("metadata");
            for header in METADATA_HEADERS {
                call = call.add_metadata_headers(header);
            }

            let (_, thread) = self
                .with_timeout("get_thread", call.add_scope(GMAIL_READONLY_SCOPE).doit())
                .await?;

            Ok(thread
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(convert_message)
                .collect())
        })
        .await
    }
}

/// Convert a Calendar API event into a raw record
fn convert_event(event: Event) -> RawEvent {
    let start = event.start.and_then(|start| {
        start
            .date_time
            .map(|date_time| date_time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .or_else(|| start.date.map(|date| date.format("%Y-%m-%d").to_string()))
    });

    let attendees = event
        .attendees
        .unwrap_or_default()
        .into_iter()
        .map(|attendee| RawAttendee {
            email: attendee.email,
            is_self: attendee.self_.unwrap_or(false),
            response_status: attendee.response_status,
        })
        .collect();

    RawEvent {
        id: event.id,
        organizer_email: event.organizer.and_then(|organizer| organizer.email),
        attendees,
        start,
        summary: event.summary,
        status: event.status,
    }
}

/// Convert a Gmail API message into a raw record
///
/// Headers missing a name or value are dropped.
fn convert_message(message: Message) -> RawMessage {
    let headers = message
        .payload
        .and_then(|payload| payload.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some(MessageHeader { name, value }),
            _ => None,
        })
        .collect();

    RawMessage {
        id: message.id,
        headers,
        internal_date_millis: message.internal_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_calendar3::api::{EventAttendee, EventDateTime, EventOrganizer};
    use google_gmail1::api::{MessagePart, MessagePartHeader};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_should_retry_transient_errors() {
        assert!(GoogleWorkspaceClient::should_retry(&StatsError::ServerError {
            status: 500,
            message: "Internal error".to_string(),
        }));
        assert!(GoogleWorkspaceClient::should_retry(
            &StatsError::RateLimitExceeded { retry_after: 5 }
        ));
        assert!(GoogleWorkspaceClient::should_retry(&StatsError::NetworkError(
            "connection reset".to_string()
        )));
    }

    #[test]
    fn test_should_not_retry_permanent_errors() {
        assert!(!GoogleWorkspaceClient::should_retry(&StatsError::AuthError(
            "invalid token".to_string()
        )));
        assert!(!GoogleWorkspaceClient::should_retry(&StatsError::Forbidden(
            "no access".to_string()
        )));
        assert!(!GoogleWorkspaceClient::should_retry(&StatsError::NotFound(
            "thread".to_string()
        )));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 250,
            max_delay_secs: 10,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = GoogleWorkspaceClient::with_retry(&fast_policy(3), "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err(StatsError::NetworkError("Connection timeout".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_fails_on_permanent_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = GoogleWorkspaceClient::with_retry(&fast_policy(3), "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(StatsError::BadRequest("bad query".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = GoogleWorkspaceClient::with_retry(&fast_policy(3), "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(StatsError::ServerError {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(StatsError::ServerError { status: 503, .. })));
        // Initial attempt + 3 retries
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_with_retry_zero_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = GoogleWorkspaceClient::with_retry(&fast_policy(0), "test_op", || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(StatsError::NetworkError("reset".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_convert_event_timed() {
        let start = chrono::DateTime::parse_from_rfc3339("2020-03-15T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let event = Event {
            id: Some("evt".to_string()),
            organizer: Some(EventOrganizer {
                email: Some("u@h.com".to_string()),
                ..Default::default()
            }),
            attendees: Some(vec![
                EventAttendee {
                    email: Some("u@h.com".to_string()),
                    self_: Some(true),
                    response_status: Some("accepted".to_string()),
                    ..Default::default()
                },
                EventAttendee {
                    email: Some("v@h.com".to_string()),
                    ..Default::default()
                },
            ]),
            start: Some(EventDateTime {
                date_time: Some(start),
                ..Default::default()
            }),
            summary: Some("Sync".to_string()),
            status: Some("confirmed".to_string()),
            ..Default::default()
        };

        let raw = convert_event(event);
        assert_eq!(raw.organizer_email.as_deref(), Some("u@h.com"));
        assert_eq!(raw.start.as_deref(), Some("2020-03-15T10:00:00Z"));
        assert_eq!(raw.attendees.len(), 2);
        assert!(raw.attendees[0].is_self);
        assert!(!raw.attendees[1].is_self);
        assert_eq!(raw.attendees[1].response_status, None);
    }

    #[test]
    fn test_convert_event_all_day() {
        let event = Event {
            start: Some(EventDateTime {
                date: chrono::NaiveDate::from_ymd_opt(2019, 7, 4),
                ..Default::default()
            }),
            ..Default::default()
        };

        let raw = convert_event(event);
        assert_eq!(raw.start.as_deref(), Some("2019-07-04"));
        assert!(raw.attendees.is_empty());
        assert_eq!(raw.organizer_email, None);
    }

    #[test]
    fn test_convert_message_keeps_header_order() {
        let message = Message {
            id: Some("m1".to_string()),
            internal_date: Some(1_592_222_400_000),
            payload: Some(MessagePart {
                headers: Some(vec![
                    MessagePartHeader {
                        name: Some("From".to_string()),
                        value: Some("v@h.com".to_string()),
                    },
                    MessagePartHeader {
                        name: Some("To".to_string()),
                        value: None,
                    },
                    MessagePartHeader {
                        name: Some("Subject".to_string()),
                        value: Some("Hi".to_string()),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let raw = convert_message(message);
        assert_eq!(raw.id.as_deref(), Some("m1"));
        assert_eq!(raw.internal_date_millis, Some(1_592_222_400_000));
        assert_eq!(
            raw.headers,
            vec![
                MessageHeader::new("From", "v@h.com"),
                MessageHeader::new("Subject", "Hi"),
            ]
        );
    }

    #[test]
    fn test_convert_message_without_payload() {
        let raw = convert_message(Message::default());
        assert!(raw.headers.is_empty());
        assert_eq!(raw.internal_date_millis, None);
    }
}
