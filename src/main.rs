use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use interaction_stats::auth::{self, GMAIL_READONLY_SCOPE};
use interaction_stats::cli::{self, Cli, Commands};
use interaction_stats::config::Config;
use interaction_stats::error::StatsError;
use std::io::{self, Write};
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock_buffer(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        self.buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log buffer lock poisoned"))
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock_buffer()?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut buffer = self.lock_buffer()?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: interaction-stats --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("interaction_stats=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("interaction_stats=info,warn"))
    };

    // Logs print above progress spinners
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.effective_command() {
        Commands::Run {
            skip_events,
            skip_emails,
        } => {
            if skip_events && skip_emails {
                println!("Both --skip-events and --skip-emails given; nothing to do");
                return Ok(());
            }

            let report =
                cli::run_pipeline(&cli, skip_events, skip_emails, (*multi_progress).clone())
                    .await?;

            println!("\n{}", report);
            Ok(())
        }

        Commands::Auth { force } => {
            tracing::info!("Authorizing with Google...");

            let hubs = auth::authorize(&cli.credentials, &cli.token_cache, force).await?;

            println!("Successfully authorized");
            println!("Credentials saved at: {:?}", cli.token_cache);

            // Must pass a granted scope to avoid triggering another authorization
            let (_, profile) = hubs
                .gmail
                .users()
                .get_profile("me")
                .add_scope(GMAIL_READONLY_SCOPE)
                .doit()
                .await
                .map_err(StatsError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(StatsError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file before running. Key settings:");
            println!("  - identity.self_email: your address; its domain is the home domain");
            println!("  - scan.years: calendar years to scan");
            println!("  - exclusions.from / exclusions.to: addresses or *@domain entries to skip");
            println!("  - output.events_csv / output.emails_csv: where the CSV files go");

            Ok(())
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(stats_err) = error.downcast_ref::<StatsError>() {
        match stats_err {
            StatsError::AuthError(_) | StatsError::CredentialError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: interaction-stats auth --force");
            }
            StatsError::RateLimitExceeded { .. } | StatsError::ServerError { .. } => {
                eprintln!("\nHint: This may be a temporary API error.");
                eprintln!("      Try running the command again, or raise retry.max_retries.");
            }
            StatsError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: interaction-stats init-config --force");
            }
            _ => {}
        }
    }
}
