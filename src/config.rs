use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::address::Address;
use crate::error::{Result, StatsError};

/// Largest page the Calendar API returns for events.list
pub const MAX_EVENT_PAGE_SIZE: u32 = 2500;

/// Largest page the Gmail API returns for threads.list
pub const MAX_THREAD_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub exclusions: ExclusionsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// The account owner's address; its domain is the home domain
    #[serde(default)]
    pub self_email: String,
    /// Treat `first.last@` and `firstlast@` as the same sender
    #[serde(default = "default_ignore_local_part_dots")]
    pub ignore_local_part_dots: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            self_email: String::new(),
            ignore_local_part_dots: default_ignore_local_part_dots(),
        }
    }
}

impl IdentityConfig {
    /// Domain portion of `self_email`, lower-cased
    pub fn home_domain(&self) -> Option<String> {
        Address::parse(&self.self_email).map(|address| address.domain().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_years")]
    pub years: Vec<i32>,
    #[serde(default = "default_event_page_size")]
    pub event_page_size: u32,
    #[serde(default = "default_thread_page_size")]
    pub thread_page_size: u32,
    #[serde(default = "default_thread_fetch_concurrency")]
    pub thread_fetch_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            years: default_years(),
            event_page_size: default_event_page_size(),
            thread_page_size: default_thread_page_size(),
            thread_fetch_concurrency: default_thread_fetch_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ScanConfig {
    /// Configured years in ascending order
    pub fn sorted_years(&self) -> Vec<i32> {
        let mut years = self.years.clone();
        years.sort_unstable();
        years
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionsConfig {
    /// Senders to drop (exact address or `*@domain`)
    #[serde(default)]
    pub from: Vec<String>,
    /// Recipients to drop (exact address or `*@domain`)
    #[serde(default)]
    pub to: Vec<String>,
    /// Subject phrases excluded from the mail search
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Attachment file type excluded from the mail search; empty disables it
    #[serde(default = "default_attachment_type")]
    pub attachment_type: String,
}

impl Default for ExclusionsConfig {
    fn default() -> Self {
        Self {
            from: Vec::new(),
            to: Vec::new(),
            subjects: Vec::new(),
            attachment_type: default_attachment_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_events_csv")]
    pub events_csv: PathBuf,
    #[serde(default = "default_emails_csv")]
    pub emails_csv: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            events_csv: default_events_csv(),
            emails_csv: default_emails_csv(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_ignore_local_part_dots() -> bool {
    true
}

fn default_years() -> Vec<i32> {
    let current = Local::now().year();
    (current - 4..=current).collect()
}

fn default_event_page_size() -> u32 {
    MAX_EVENT_PAGE_SIZE
}

fn default_thread_page_size() -> u32 {
    MAX_THREAD_PAGE_SIZE
}

fn default_thread_fetch_concurrency() -> usize {
    1
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_attachment_type() -> String {
    "ics".to_string()
}

fn default_events_csv() -> PathBuf {
    PathBuf::from("events.csv")
}

fn default_emails_csv() -> PathBuf {
    PathBuf::from("emails.csv")
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    30
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StatsError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| StatsError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StatsError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| StatsError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| StatsError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    ///
    /// Loading does not validate: `self_email` has no usable default, so an
    /// example config must still load. The pipeline validates before any
    /// API call.
    pub fn validate(&self) -> Result<()> {
        if self.identity.home_domain().is_none() {
            return Err(StatsError::ConfigError(format!(
                "identity.self_email must be a full address (got '{}')",
                self.identity.self_email
            )));
        }

        if self.scan.years.is_empty() {
            return Err(StatsError::ConfigError(
                "scan.years must list at least one year".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for year in &self.scan.years {
            if !(1970..=9999).contains(year) {
                return Err(StatsError::ConfigError(format!(
                    "scan.years contains out-of-range year {}",
                    year
                )));
            }
            if !seen.insert(*year) {
                return Err(StatsError::ConfigError(format!(
                    "scan.years lists {} more than once",
                    year
                )));
            }
        }

        if self.scan.event_page_size == 0 || self.scan.event_page_size > MAX_EVENT_PAGE_SIZE {
            return Err(StatsError::ConfigError(format!(
                "scan.event_page_size must be between 1 and {}",
                MAX_EVENT_PAGE_SIZE
            )));
        }
        if self.scan.thread_page_size == 0 || self.scan.thread_page_size > MAX_THREAD_PAGE_SIZE {
            return Err(StatsError::ConfigError(format!(
                "scan.thread_page_size must be between 1 and {}",
                MAX_THREAD_PAGE_SIZE
            )));
        }

        if self.scan.thread_fetch_concurrency == 0 {
            return Err(StatsError::ConfigError(
                "scan.thread_fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan.thread_fetch_concurrency > 50 {
            return Err(StatsError::ConfigError(
                "scan.thread_fetch_concurrency cannot exceed 50 (Gmail per-user rate limits)"
                    .to_string(),
            ));
        }
        if self.scan.request_timeout_secs == 0 {
            return Err(StatsError::ConfigError(
                "scan.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (field, entries) in [
            ("exclusions.from", &self.exclusions.from),
            ("exclusions.to", &self.exclusions.to),
            ("exclusions.subjects", &self.exclusions.subjects),
        ] {
            if entries.iter().any(|entry| entry.trim().is_empty()) {
                return Err(StatsError::ConfigError(format!(
                    "{} cannot contain empty strings",
                    field
                )));
            }
        }
        if self.exclusions.attachment_type.contains(char::is_whitespace) {
            return Err(StatsError::ConfigError(
                "exclusions.attachment_type cannot contain whitespace".to_string(),
            ));
        }

        if self.output.events_csv.as_os_str().is_empty()
            || self.output.emails_csv.as_os_str().is_empty()
        {
            return Err(StatsError::ConfigError(
                "output paths cannot be empty".to_string(),
            ));
        }
        if self.output.events_csv == self.output.emails_csv {
            return Err(StatsError::ConfigError(
                "output.events_csv and output.emails_csv must differ".to_string(),
            ));
        }

        if self.retry.max_retries > 10 {
            return Err(StatsError::ConfigError(
                "retry.max_retries cannot exceed 10".to_string(),
            ));
        }
        if self.retry.initial_delay_ms == 0 || self.retry.max_delay_secs == 0 {
            return Err(StatsError::ConfigError(
                "retry delays must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let mut config = Self::default();
        config.identity.self_email = "you@example.com".to_string();
        config.exclusions.from = vec!["notifications@example.com".to_string()];
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.identity.self_email = "u@h.com".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.identity.self_email.is_empty());
        assert!(config.identity.ignore_local_part_dots);

        let current = Local::now().year();
        assert_eq!(config.scan.years.len(), 5);
        assert_eq!(config.scan.years.last(), Some(&current));
        assert_eq!(config.scan.event_page_size, 2500);
        assert_eq!(config.scan.thread_page_size, 500);
        assert_eq!(config.scan.thread_fetch_concurrency, 1);

        assert!(config.exclusions.from.is_empty());
        assert_eq!(config.exclusions.attachment_type, "ics");

        assert_eq!(config.output.events_csv, PathBuf::from("events.csv"));
        assert_eq!(config.output.emails_csv, PathBuf::from("emails.csv"));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_home_domain_derived_from_self_email() {
        let config = valid_config();
        assert_eq!(config.identity.home_domain(), Some("h.com".to_string()));

        let mut config = valid_config();
        config.identity.self_email = "U@H.Com".to_string();
        assert_eq!(config.identity.home_domain(), Some("h.com".to_string()));
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_self_email() {
        let result = Config::default().validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("identity.self_email"));
    }

    #[test]
    fn test_config_validation_years() {
        let mut config = valid_config();
        config.scan.years = vec![];
        assert!(config.validate().unwrap_err().to_string().contains("at least one year"));

        config.scan.years = vec![1969];
        assert!(config.validate().unwrap_err().to_string().contains("out-of-range"));

        config.scan.years = vec![2020, 2021, 2020];
        assert!(config.validate().unwrap_err().to_string().contains("more than once"));

        config.scan.years = vec![2023, 2013];
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.sorted_years(), vec![2013, 2023]);
    }

    #[test]
    fn test_config_validation_page_sizes() {
        let mut config = valid_config();
        config.scan.event_page_size = 2501;
        assert!(config.validate().unwrap_err().to_string().contains("event_page_size"));

        let mut config = valid_config();
        config.scan.thread_page_size = 0;
        assert!(config.validate().unwrap_err().to_string().contains("thread_page_size"));

        let mut config = valid_config();
        config.scan.event_page_size = 1;
        config.scan.thread_page_size = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_concurrency_bounds() {
        let mut config = valid_config();
        config.scan.thread_fetch_concurrency = 0;
        assert!(config.validate().unwrap_err().to_string().contains("at least 1"));

        config.scan.thread_fetch_concurrency = 51;
        assert!(config.validate().unwrap_err().to_string().contains("cannot exceed 50"));

        config.scan.thread_fetch_concurrency = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_exclusion_entry() {
        let mut config = valid_config();
        config.exclusions.to.push("  ".to_string());
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("exclusions.to cannot contain empty strings"));
    }

    #[test]
    fn test_config_validation_output_paths() {
        let mut config = valid_config();
        config.output.emails_csv = config.output.events_csv.clone();
        assert!(config.validate().unwrap_err().to_string().contains("must differ"));
    }

    #[test]
    fn test_config_validation_retry() {
        let mut config = valid_config();
        config.retry.max_retries = 11;
        assert!(config.validate().unwrap_err().to_string().contains("cannot exceed 10"));

        let mut config = valid_config();
        config.retry.initial_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = valid_config();
        config.scan.years = vec![2013, 2014];
        config.exclusions.from = vec!["notifications@h.com".to_string()];
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.identity.self_email, "u@h.com");
        assert_eq!(loaded.scan.years, vec![2013, 2014]);
        assert_eq!(loaded.exclusions.from, config.exclusions.from);
        assert_eq!(loaded.output.events_csv, config.output.events_csv);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-interaction-stats-config-12345.toml");
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.scan.thread_page_size, 500);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[identity]
self_email = "benbalter@github.com"

[scan]
years = [2013, 2014, 2015]

[exclusions]
from = ["notifications@github.com", "*@lists.github.com"]
"#;
        tokio::fs::write(temp_file.path(), partial_config).await.unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();
        assert_eq!(config.identity.home_domain(), Some("github.com".to_string()));
        assert_eq!(config.scan.years, vec![2013, 2014, 2015]);
        assert_eq!(config.exclusions.from.len(), 2);

        assert_eq!(config.scan.event_page_size, 2500);
        assert_eq!(config.exclusions.attachment_type, "ics");
        assert!(config.identity.ignore_local_part_dots);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.identity.self_email, "you@example.com");
        assert!(config.validate().is_ok());
    }
}
