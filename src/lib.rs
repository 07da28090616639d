//! Interaction statistics export
//!
//! Counts how much of a person's collaboration stays inside their own
//! organization. For each configured year it retrieves calendar events and
//! Gmail threads, keeps the ones whose participants are all in the home
//! domain (the domain of the configured self email), and writes one CSV row
//! per internal meeting and per message of an internal thread.
//!
//! # Example Usage
//!
//! ```no_run
//! use interaction_stats::{auth, client::GoogleWorkspaceClient, config::Config};
//! use interaction_stats::orchestrator::FetchOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     config.validate()?;
//!
//!     let hubs = auth::authorize("credentials.json".as_ref(), "token.json".as_ref(), false).await?;
//!     let client = GoogleWorkspaceClient::from_config(hubs, &config.scan, &config.retry);
//!
//!     let orchestrator = FetchOrchestrator::new(&config)?;
//!     let events = orchestrator.build_event_stats(&client).await?;
//!     interaction_stats::output::write_csv(&config.output.events_csv, &events.rows).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`address`] - Header address parsing
//! - [`auth`] - OAuth2 authorization and API hub construction
//! - [`client`] - Calendar/Gmail sources with retry and timeout handling
//! - [`cli`] - Command-line interface and pipeline
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`event`] - Calendar event classification
//! - [`exclusions`] - From/To blocklists
//! - [`message`] - Email message classification
//! - [`models`] - Raw records, rows, identity and criteria
//! - [`orchestrator`] - Per-year retrieval and aggregation
//! - [`output`] - CSV rendering
//! - [`query`] - Gmail search query building
//! - [`thread`] - Email thread classification

pub mod address;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod exclusions;
pub mod message;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod query;
pub mod thread;

pub use address::Address;
pub use client::{CalendarSource, GoogleWorkspaceClient, MailSource};
pub use config::Config;
pub use error::{Result, StatsError};
pub use event::CalendarEvent;
pub use exclusions::{ExclusionList, ExclusionRule};
pub use message::EmailMessage;
pub use models::{Criteria, EventRow, Identity, MessageRow, RawEvent, RawMessage};
pub use orchestrator::{FetchOrchestrator, StatsOutcome, YearTally};
pub use thread::EmailThread;
