//! Command-line interface and pipeline

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth;
use crate::client::GoogleWorkspaceClient;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{FetchOrchestrator, ProgressCallback, YearTally};
use crate::output;

#[derive(Parser, Debug)]
#[command(name = "interaction-stats")]
#[command(version = "0.1.0")]
#[command(
    about = "Export internal meetings and email threads to CSV",
    long_about = None
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 client credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to the saved authorized-user credentials
    #[arg(long, default_value = "token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Fetch events and emails for every configured year and write the CSV files
    Run {
        /// Do not fetch calendar events
        #[arg(long)]
        skip_events: bool,

        /// Do not fetch email threads
        #[arg(long)]
        skip_emails: bool,
    },

    /// Authorize with Google and save credentials
    Auth {
        /// Run the browser flow even if saved credentials exist
        #[arg(long)]
        force: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// The subcommand to execute, `run` when none was given
    pub fn effective_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            skip_events: false,
            skip_emails: false,
        })
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share an existing MultiProgress, e.g. the one log output goes through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    /// Progress callback that updates a spinner's message
    pub fn spinner_callback(pb: &ProgressBar) -> ProgressCallback {
        let pb = pb.clone();
        Arc::new(move |status: &str| pb.set_message(status.to_string()))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub path: PathBuf,
    pub per_year: BTreeMap<i32, YearTally>,
    pub rows_written: usize,
}

impl EntityReport {
    pub fn total_fetched(&self) -> usize {
        self.per_year.values().map(|tally| tally.fetched).sum()
    }

    pub fn total_included(&self) -> usize {
        self.per_year.values().map(|tally| tally.included).sum()
    }
}

/// Run summary
#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub events: Option<EntityReport>,
    pub emails: Option<EntityReport>,
}

impl Report {
    fn write_table(
        f: &mut fmt::Formatter<'_>,
        title: &str,
        fetched_label: &str,
        entity: &EntityReport,
    ) -> fmt::Result {
        writeln!(f, "{} -> {}", title, entity.path.display())?;
        writeln!(f, "  {:<6} {:>10} {:>10} {:>8}", "Year", fetched_label, "Internal", "Rows")?;
        for (year, tally) in &entity.per_year {
            writeln!(
                f,
                "  {:<6} {:>10} {:>10} {:>8}",
                year, tally.fetched, tally.included, tally.rows
            )?;
        }
        writeln!(
            f,
            "  {:<6} {:>10} {:>10} {:>8}",
            "Total",
            entity.total_fetched(),
            entity.total_included(),
            entity.rows_written
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========================================")?;
        writeln!(f, "Run Summary")?;
        writeln!(f, "========================================")?;
        writeln!(f, "Run ID: {}", self.run_id)?;
        writeln!(f, "Duration: {} seconds", self.duration_seconds)?;

        if let Some(events) = &self.events {
            writeln!(f)?;
            Self::write_table(f, "Calendar events", "Events", events)?;
        }
        if let Some(emails) = &self.emails {
            writeln!(f)?;
            Self::write_table(f, "Email threads", "Threads", emails)?;
        }

        write!(f, "========================================")
    }
}

/// Load config, authorize, fetch, classify and write the CSV files
pub async fn run_pipeline(
    cli: &Cli,
    skip_events: bool,
    skip_emails: bool,
    multi: MultiProgress,
) -> Result<Report> {
    let reporter = ProgressReporter::with_multi_progress(multi);
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    info!("Starting run {}", run_id);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let config = Config::load(&cli.config).await?;
    config.validate()?;
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded from {:?}", cli.config),
    );

    let mut orchestrator = FetchOrchestrator::new(&config)?;
    info!(
        "Scanning years {:?} for {}",
        orchestrator.years(),
        orchestrator.criteria().identity.self_email()
    );

    let auth_spinner = reporter.add_spinner("Authorizing with Google...");
    let hubs = auth::authorize(&cli.credentials, &cli.token_cache, false).await?;
    reporter.finish_spinner(&auth_spinner, "Authorized");

    let client = GoogleWorkspaceClient::from_config(hubs, &config.scan, &config.retry);

    let events = if skip_events {
        None
    } else {
        let spinner = reporter.add_spinner("Fetching calendar events...");
        orchestrator.set_progress(ProgressReporter::spinner_callback(&spinner));
        let stats = orchestrator.build_event_stats(&client).await?;
        output::write_csv(&config.output.events_csv, &stats.rows).await?;
        reporter.finish_spinner(
            &spinner,
            &format!(
                "{} internal meetings written to {}",
                stats.rows.len(),
                config.output.events_csv.display()
            ),
        );

        Some(EntityReport {
            path: config.output.events_csv.clone(),
            rows_written: stats.rows.len(),
            per_year: stats.per_year,
        })
    };

    let emails = if skip_emails {
        None
    } else {
        let spinner = reporter.add_spinner("Fetching email threads...");
        orchestrator.set_progress(ProgressReporter::spinner_callback(&spinner));
        let stats = orchestrator.build_email_stats(&client).await?;
        output::write_csv(&config.output.emails_csv, &stats.rows).await?;
        reporter.finish_spinner(
            &spinner,
            &format!(
                "{} internal messages written to {}",
                stats.rows.len(),
                config.output.emails_csv.display()
            ),
        );

        Some(EntityReport {
            path: config.output.emails_csv.clone(),
            rows_written: stats.rows.len(),
            per_year: stats.per_year,
        })
    };

    let completed_at = Utc::now();
    Ok(Report {
        run_id,
        started_at,
        completed_at,
        duration_seconds: (completed_at - started_at).num_seconds(),
        events,
        emails,
    })
}
