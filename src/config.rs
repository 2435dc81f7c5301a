//! Application configuration loaded from environment variables.
//!
//! Values are read once when the host process starts and shared by handle
//! through [`crate::AppState`].

use std::env;
use std::time::Duration;

/// Default minimum spacing between two applied room snapshots.
pub const DEFAULT_SYNC_MIN_SPACING_MS: u64 = 300;
/// Default upper bound on the number of days a single schedule may span.
pub const DEFAULT_MAX_SCHEDULE_SPAN_DAYS: usize = 3660;
/// Default number of invite codes tried before room creation gives up.
pub const DEFAULT_INVITE_CODE_ATTEMPTS: u32 = 5;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project hosting Firestore, Auth and Storage
    pub gcp_project_id: String,
    /// Firebase Web API key (Identity Toolkit)
    pub firebase_api_key: String,
    /// Cloud Storage bucket for profile images
    pub storage_bucket: String,
    /// Minimum spacing between applied room snapshots
    pub sync_min_spacing: Duration,
    /// Sanity cap on schedule length in days
    pub max_schedule_span_days: usize,
    /// How many invite codes to try before giving up on room creation
    pub invite_code_attempts: u32,
}

impl Config {
    /// Offline configuration for tests.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            firebase_api_key: "test_api_key".to_string(),
            storage_bucket: "test-project.appspot.com".to_string(),
            sync_min_spacing: Duration::from_millis(DEFAULT_SYNC_MIN_SPACING_MS),
            max_schedule_span_days: DEFAULT_MAX_SCHEDULE_SPAN_DAYS,
            invite_code_attempts: DEFAULT_INVITE_CODE_ATTEMPTS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let gcp_project_id =
            env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string());
        let storage_bucket = env::var("FIREBASE_STORAGE_BUCKET")
            .unwrap_or_else(|_| format!("{}.appspot.com", gcp_project_id));

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            storage_bucket,
            sync_min_spacing: Duration::from_millis(parse_or(
                "ROOM_SYNC_MIN_SPACING_MS",
                DEFAULT_SYNC_MIN_SPACING_MS,
            )?),
            max_schedule_span_days: parse_or(
                "MAX_SCHEDULE_SPAN_DAYS",
                DEFAULT_MAX_SCHEDULE_SPAN_DAYS,
            )?,
            invite_code_attempts: parse_or("INVITE_CODE_ATTEMPTS", DEFAULT_INVITE_CODE_ATTEMPTS)?,
            gcp_project_id,
        })
    }
}

/// Read a numeric variable, falling back to `default` when it is unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
