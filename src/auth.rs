//! OAuth2 authorization for the Calendar and Gmail APIs
//!
//! A saved `authorized_user` credential store is tried first. When it is
//! missing, unreadable or rejected, the installed-app flow runs in the browser
//! and a new store is written from the refresh token it yields.

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, StatsError};

pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Scopes requested for every run
pub const REQUIRED_SCOPES: &[&str] = &[CALENDAR_READONLY_SCOPE, GMAIL_READONLY_SCOPE];

const AUTHORIZED_USER_TYPE: &str = "authorized_user";

pub type Connector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type GmailHub = Gmail<Connector>;
pub type CalendarHub = google_calendar3::CalendarHub<Connector>;
type Authenticator = yup_oauth2::authenticator::Authenticator<Connector>;

/// Authorized API hubs sharing one HTTP client and one authenticator
pub struct ApiHubs {
    pub gmail: GmailHub,
    pub calendar: CalendarHub,
}

/// Saved credential store (`token.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUserCredentials {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl AuthorizedUserCredentials {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            kind: AUTHORIZED_USER_TYPE.to_string(),
            client_id,
            client_secret,
            refresh_token,
        }
    }
}

/// Read the credential store
///
/// Every failure (missing file, bad JSON, wrong `type`) is a
/// [`StatsError::CredentialError`], which callers recover from by running the
/// interactive flow.
pub async fn load_credential_store(path: &Path) -> Result<AuthorizedUserCredentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        StatsError::CredentialError(format!("Cannot read {}: {}", path.display(), e))
    })?;

    let credentials: AuthorizedUserCredentials = serde_json::from_str(&content).map_err(|e| {
        StatsError::CredentialError(format!("Invalid credential store {}: {}", path.display(), e))
    })?;

    if credentials.kind != AUTHORIZED_USER_TYPE {
        return Err(StatsError::CredentialError(format!(
            "Credential store {} has type '{}', expected '{}'",
            path.display(),
            credentials.kind,
            AUTHORIZED_USER_TYPE
        )));
    }

    Ok(credentials)
}

/// Write the credential store, readable by the owner only
pub async fn save_credential_store(path: &Path, credentials: &AuthorizedUserCredentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(credentials)?;
    tokio::fs::write(path, json).await?;
    secure_token_file(path).await?;
    Ok(())
}

/// Token cache used by the interactive flow, next to the credential store
pub fn flow_cache_path(token_path: &Path) -> PathBuf {
    token_path.with_extension("flow.json")
}

/// Authorize and build the API hubs
///
/// With `force`, the saved store is ignored and the interactive flow always
/// runs.
pub async fn authorize(credentials_path: &Path, token_path: &Path, force: bool) -> Result<ApiHubs> {
    if !force {
        match saved_authenticator(token_path).await {
            Ok(auth) => {
                info!("Using saved credentials from {}", token_path.display());
                return build_hubs(auth);
            }
            Err(e) => warn!("Saved credentials unavailable ({}); starting browser authorization", e),
        }
    }

    let auth = interactive_authenticator(credentials_path, token_path).await?;
    build_hubs(auth)
}

async fn saved_authenticator(token_path: &Path) -> Result<Authenticator> {
    load_credential_store(token_path).await?;

    let secret = yup_oauth2::read_authorized_user_secret(token_path)
        .await
        .map_err(|e| StatsError::CredentialError(format!("Failed to read credential store: {}", e)))?;

    let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
        .build()
        .await
        .map_err(|e| StatsError::CredentialError(format!("Failed to build authenticator: {}", e)))?;

    // A revoked or expired refresh token fails here
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| StatsError::CredentialError(format!("Saved refresh token rejected: {}", e)))?;

    Ok(auth)
}

async fn interactive_authenticator(credentials_path: &Path, token_path: &Path) -> Result<Authenticator> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| {
            StatsError::AuthError(format!(
                "Failed to read client credentials {}: {}",
                credentials_path.display(),
                e
            ))
        })?;

    let flow_cache = flow_cache_path(token_path);
    if let Some(parent) = flow_cache.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret.clone(),
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(&flow_cache)
    .build()
    .await
    .map_err(|e| StatsError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| StatsError::AuthError(format!("Failed to obtain token: {}", e)))?;

    secure_token_file(&flow_cache).await?;

    match read_refresh_token(&flow_cache).await? {
        Some(refresh_token) => {
            let credentials =
                AuthorizedUserCredentials::new(secret.client_id, secret.client_secret, refresh_token);
            save_credential_store(token_path, &credentials).await?;
            info!("Saved credentials to {}", token_path.display());
        }
        None => warn!("Authorization returned no refresh token; credentials were not saved"),
    }

    Ok(auth)
}

/// Pull the refresh token out of the interactive flow's token cache
async fn read_refresh_token(flow_cache: &Path) -> Result<Option<String>> {
    let content = match tokio::fs::read_to_string(flow_cache).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let cache: serde_json::Value = serde_json::from_str(&content)?;
    Ok(find_refresh_token(&cache))
}

fn find_refresh_token(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(token) = map.get("refresh_token").and_then(|t| t.as_str()) {
                return Some(token.to_string());
            }
            map.values().find_map(find_refresh_token)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_refresh_token),
        _ => None,
    }
}

fn build_hubs(auth: Authenticator) -> Result<ApiHubs> {
    debug!("Building API hubs");

    // HTTP/1 for compatibility with the generated API clients
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| StatsError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(ApiHubs {
        gmail: Gmail::new(client.clone(), auth.clone()),
        calendar: google_calendar3::CalendarHub::new(client, auth),
    })
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; permissions are left as created
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
