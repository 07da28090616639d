use thiserror::Error;

/// Type alias for Result with StatsError
pub type Result<T> = std::result::Result<T, StatsError>;

/// Error types for the extraction pipeline
#[derive(Error, Debug)]
pub enum StatsError {
    /// Google API returned an error
    #[error("Google API error: {0}")]
    ApiError(String),

    /// Interactive authorization failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Cached credential store is missing, unreadable or not an authorized-user record
    #[error("Credential store error: {0}")]
    CredentialError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// CSV rendering failed
    #[error("Output error: {0}")]
    OutputError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StatsError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StatsError::RateLimitExceeded { .. }
                | StatsError::ServerError { .. }
                | StatsError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl From<csv::Error> for StatsError {
    fn from(error: csv::Error) -> Self {
        StatsError::OutputError(error.to_string())
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Accepts delay-seconds ("120") or an HTTP-date. Missing, invalid or past
/// values fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

// google-calendar3 re-exports the same google-apis-common error type, so this
// conversion covers both hubs.
impl From<google_gmail1::Error> for StatsError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        StatsError::RateLimitExceeded { retry_after }
                    }
                    404 => StatsError::NotFound("Resource not found".to_string()),
                    400 => StatsError::BadRequest(message),
                    401 => StatsError::AuthError(message),
                    403 => StatsError::Forbidden(message),
                    500..=599 => StatsError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => StatsError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => StatsError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                StatsError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => StatsError::NetworkError(err.to_string()),
            _ => StatsError::ApiError(error.to_string()),
        }
    }
}
