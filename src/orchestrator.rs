//! Per-year retrieval and classification of events and threads

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{CalendarSource, MailSource};
use crate::config::Config;
use crate::error::{Result, StatsError};
use crate::event::CalendarEvent;
use crate::models::{Criteria, EventRow, EventWindow, MessageRow, ThreadPage};
use crate::query::{build_thread_query, QueryExclusions};
use crate::thread::EmailThread;

/// Progress callback, called with a short status line
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Stream of thread search pages, driven until no continuation token is left
pub fn thread_pages<'a>(
    source: &'a dyn MailSource,
    query: String,
    page_size: u32,
) -> Pin<Box<dyn Stream<Item = Result<ThreadPage>> + Send + 'a>> {
    Box::pin(stream! {
        let mut page_token: Option<String> = None;
        let mut page_number = 0;

        loop {
            page_number += 1;
            match source.list_threads(&query, page_size, page_token.take()).await {
                Ok(page) => {
                    let next = page.next_page_token.clone().filter(|token| !token.is_empty());
                    debug!("Thread page {}: {} threads", page_number, page.threads.len());
                    yield Ok(page);

                    match next {
                        Some(token) => page_token = Some(token),
                        None => break,
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}

/// Counts for one scanned year
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct YearTally {
    pub fetched: usize,
    pub included: usize,
    pub rows: usize,
}

/// Rows of one entity type with per-year tallies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsOutcome<R> {
    pub rows: Vec<R>,
    pub per_year: BTreeMap<i32, YearTally>,
}

impl<R> Default for StatsOutcome<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            per_year: BTreeMap::new(),
        }
    }
}

impl<R> StatsOutcome<R> {
    pub fn total_fetched(&self) -> usize {
        self.per_year.values().map(|tally| tally.fetched).sum()
    }

    pub fn total_included(&self) -> usize {
        self.per_year.values().map(|tally| tally.included).sum()
    }
}

/// Drives retrieval for every configured year, in ascending order
pub struct FetchOrchestrator {
    criteria: Criteria,
    years: Vec<i32>,
    event_page_size: u32,
    thread_page_size: u32,
    thread_fetch_concurrency: usize,
    exclusions: QueryExclusions,
    now: DateTime<Utc>,
    progress: Option<ProgressCallback>,
}

impl FetchOrchestrator {
    pub fn new(config: &Config) -> Result<Self> {
        let criteria = Criteria::from_config(config)?;
        let exclusions = QueryExclusions {
            from: criteria.excluded_from.clone(),
            to: criteria.excluded_to.clone(),
            subjects: config.exclusions.subjects.clone(),
            attachment_type: config.exclusions.attachment_type.clone(),
        };

        Ok(Self {
            criteria,
            years: config.scan.sorted_years(),
            event_page_size: config.scan.event_page_size,
            thread_page_size: config.scan.thread_page_size,
            thread_fetch_concurrency: config.scan.thread_fetch_concurrency.max(1),
            exclusions,
            now: Utc::now(),
            progress: None,
        })
    }

    /// Fix the reference time used to drop events that have not started
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.set_progress(progress);
        self
    }

    /// Replace the progress callback, e.g. with a new spinner per phase
    pub fn set_progress(&mut self, progress: ProgressCallback) {
        self.progress = Some(progress);
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn report(&self, status: &str) {
        if let Some(progress) = &self.progress {
            progress(status);
        }
    }

    /// Search query for one year of internal threads
    pub fn thread_query(&self, year: i32) -> String {
        build_thread_query(year, self.criteria.identity.home_domain(), &self.exclusions)
    }

    /// Events of one year
    pub async fn fetch_year_events(
        &self,
        calendar: &dyn CalendarSource,
        year: i32,
    ) -> Result<Vec<CalendarEvent>> {
        self.report(&format!("{}: fetching events", year));
        let window = EventWindow::for_year(year)?;
        let raw = calendar.list_events(window, self.event_page_size).await?;

        if raw.is_empty() {
            info!("No events found for {}", year);
            return Ok(Vec::new());
        }

        debug!("Fetched {} events for {}", raw.len(), year);
        Ok(raw
            .into_iter()
            .map(|event| CalendarEvent::new(event, &self.criteria))
            .collect())
    }

    /// Events of every configured year, in year order
    pub async fn fetch_events(&self, calendar: &dyn CalendarSource) -> Result<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        for &year in &self.years {
            events.extend(self.fetch_year_events(calendar, year).await?);
        }
        Ok(events)
    }

    /// Rows for every included event, with per-year tallies
    pub async fn build_event_stats(&self, calendar: &dyn CalendarSource) -> Result<StatsOutcome<EventRow>> {
        let mut outcome = StatsOutcome::default();

        for &year in &self.years {
            let events = self.fetch_year_events(calendar, year).await?;
            let rows: Vec<EventRow> = events
                .iter()
                .filter(|event| event.should_include_at(self.now))
                .map(CalendarEvent::to_row)
                .collect();

            info!("{}: {} events, {} internal meetings", year, events.len(), rows.len());
            outcome.per_year.insert(
                year,
                YearTally {
                    fetched: events.len(),
                    included: rows.len(),
                    rows: rows.len(),
                },
            );
            outcome.rows.extend(rows);
        }

        Ok(outcome)
    }

    /// Thread references of one year, in search result order
    pub async fn fetch_threads(&self, mail: &dyn MailSource, year: i32) -> Result<Vec<EmailThread>> {
        self.report(&format!("{}: searching threads", year));
        let mut pages = thread_pages(mail, self.thread_query(year), self.thread_page_size);
        let mut threads = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page?;
            threads.extend(page.threads.into_iter().map(EmailThread::from));
            self.report(&format!("{}: found {} threads", year, threads.len()));
        }

        debug!("Found {} threads for {}", threads.len(), year);
        Ok(threads)
    }

    /// Fetch the messages of every thread, keeping thread order
    async fn fetch_thread_messages(
        &self,
        mail: &dyn MailSource,
        year: i32,
        threads: Vec<EmailThread>,
    ) -> Result<Vec<EmailThread>> {
        let total = threads.len();
        let criteria = &self.criteria;

        stream::iter(threads.into_iter().enumerate())
            .map(|(index, mut thread)| async move {
                thread.fetch_messages(mail, criteria).await?;
                self.report(&format!("{}: fetched thread {}/{}", year, index + 1, total));
                Ok::<_, StatsError>(thread)
            })
            .buffered(self.thread_fetch_concurrency)
            .try_collect()
            .await
    }

    /// Rows for every message of every included thread, with per-year tallies
    pub async fn build_email_stats(&self, mail: &dyn MailSource) -> Result<StatsOutcome<MessageRow>> {
        let mut outcome = StatsOutcome::default();

        for &year in &self.years {
            let threads = self.fetch_threads(mail, year).await?;
            if threads.is_empty() {
                info!("No threads found for {}", year);
            }

            let threads = self.fetch_thread_messages(mail, year, threads).await?;

            let mut tally = YearTally {
                fetched: threads.len(),
                ..Default::default()
            };
            for thread in threads.iter().filter(|thread| thread.should_include()) {
                let rows = thread.to_rows().unwrap_or_default();
                tally.included += 1;
                tally.rows += rows.len();
                outcome.rows.extend(rows);
            }

            info!(
                "{}: {} threads, {} internal ({} messages)",
                year, tally.fetched, tally.included, tally.rows
            );
            outcome.per_year.insert(year, tally);
        }

        Ok(outcome)
    }
}
