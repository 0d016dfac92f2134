//! Sync core configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TALLY_BACKEND_URL` - Base URL of the backend server
//!
//! ## Optional
//! - `TALLY_CREDENTIALS_FILE` - Path to the credentials JSON file
//!   (default: credentials.json)
//! - `TALLY_STATE_DIR` - Directory for the offline snapshot and pending
//!   ledger files (default: current directory)
//! - `TALLY_PROBE_INTERVAL_SECS` - Seconds between reachability probes
//!   (default: 10)
//! - `TALLY_RECONCILE_INTERVAL_SECS` - Seconds between reconciliation
//!   cycles (default: 300)
//! - `TALLY_STARTUP_GRACE_SECS` - Seconds to wait before the startup
//!   probe and authentication (default: 5)
//! - `TALLY_REQUEST_TIMEOUT_SECS` - Timeout for every outbound HTTP call
//!   (default: 5)

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Credentials file {0}: {1}")]
    CredentialsFile(PathBuf, String),
}

/// Sync core configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the backend server.
    pub backend_url: Url,
    /// Path to the credentials JSON file.
    pub credentials_path: PathBuf,
    /// Directory holding `cached_data.json` and `pending_ledger.json`.
    pub state_dir: PathBuf,
    /// Interval between reachability probes.
    pub probe_interval: Duration,
    /// Interval between reconciliation cycles.
    pub reconcile_interval: Duration,
    /// Grace period before the startup probe and authentication.
    pub startup_grace: Duration,
    /// Timeout applied to every outbound HTTP call.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `TALLY_BACKEND_URL` is missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend_url = get_required_env("TALLY_BACKEND_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TALLY_BACKEND_URL".to_string(), e.to_string())
            })?;

        Ok(Self {
            backend_url,
            credentials_path: get_env_or_default("TALLY_CREDENTIALS_FILE", "credentials.json")
                .into(),
            state_dir: get_env_or_default("TALLY_STATE_DIR", ".").into(),
            probe_interval: get_duration_secs("TALLY_PROBE_INTERVAL_SECS", 10)?,
            reconcile_interval: get_duration_secs("TALLY_RECONCILE_INTERVAL_SECS", 300)?,
            startup_grace: get_duration_secs("TALLY_STARTUP_GRACE_SECS", 5)?,
            request_timeout: get_duration_secs("TALLY_REQUEST_TIMEOUT_SECS", 5)?,
        })
    }

    /// Path of the offline read-cache snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("cached_data.json")
    }

    /// Path of the pending-write ledger file.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("pending_ledger.json")
    }
}

/// Backend login credentials, read once at startup.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct Credentials {
    /// Account email used to authenticate the terminal.
    pub email: String,
    /// Account password.
    pub password: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    email: String,
    password: String,
}

impl Credentials {
    /// Load credentials from a JSON file `{ "email": ..., "password": ... }`.
    ///
    /// The absence of this file is a fatal configuration error: without it
    /// there is no way to authenticate, so the caller is expected to exit.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CredentialsFile` if the file is missing,
    /// unreadable or not valid JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::CredentialsFile(path.to_path_buf(), e.to_string()))?;

        let parsed: CredentialsFile = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::CredentialsFile(path.to_path_buf(), e.to_string()))?;

        Ok(Self {
            email: parsed.email,
            password: SecretString::from(parsed.password),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a seconds-valued environment variable into a `Duration`.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_credentials_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"email": "terminal@example.com", "password": "hunter2"}}"#
        )
        .unwrap();

        let credentials = Credentials::load(file.path()).unwrap();
        assert_eq!(credentials.email, "terminal@example.com");
    }

    #[test]
    fn test_credentials_missing_file_is_error() {
        let result = Credentials::load(Path::new("/nonexistent/credentials.json"));
        assert!(matches!(result, Err(ConfigError::CredentialsFile(_, _))));
    }

    #[test]
    fn test_credentials_malformed_json_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let result = Credentials::load(file.path());
        assert!(matches!(result, Err(ConfigError::CredentialsFile(_, _))));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            email: "terminal@example.com".to_string(),
            password: SecretString::from("hunter2".to_string()),
        };

        let debug_output = format!("{credentials:?}");
        assert!(debug_output.contains("terminal@example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
    }

    #[test]
    fn test_paths_join_state_dir() {
        let config = SyncConfig {
            backend_url: "http://localhost:8181/".parse().unwrap(),
            credentials_path: "credentials.json".into(),
            state_dir: "/var/lib/tally".into(),
            probe_interval: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(300),
            startup_grace: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        };

        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("/var/lib/tally/cached_data.json")
        );
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/var/lib/tally/pending_ledger.json")
        );
    }
}
