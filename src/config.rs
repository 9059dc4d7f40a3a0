//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honored for local development.

use std::env;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase/GCP project ID (also the Firestore project)
    pub firebase_project_id: String,
    /// Firebase Web API key used by the Auth REST endpoints
    pub firebase_api_key: String,
    /// Base URL of the Identity Toolkit API (overridable for the auth emulator)
    pub auth_base_url: String,
    /// How often the Firestore feed subscription re-checks the query
    pub feed_poll_interval: Duration,
    /// Maximum number of posts in the feed query
    pub feed_page_limit: u32,

    // --- Feed watcher credentials (optional) ---
    pub watcher_email: Option<String>,
    pub watcher_password: Option<String>,
}

const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_PAGE_LIMIT: u32 = 100;

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            firebase_project_id: "test-project".to_string(),
            firebase_api_key: "test_api_key".to_string(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            feed_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            feed_page_limit: DEFAULT_PAGE_LIMIT,
            watcher_email: None,
            watcher_password: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let feed_poll_interval = match env::var("FEED_POLL_INTERVAL_MS") {
            Ok(raw) => Duration::from_millis(positive("FEED_POLL_INTERVAL_MS", raw)?),
            Err(_) => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        };
        let feed_page_limit = match env::var("FEED_PAGE_LIMIT") {
            Ok(raw) => positive("FEED_PAGE_LIMIT", raw)?,
            Err(_) => DEFAULT_PAGE_LIMIT,
        };

        Ok(Self {
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .map_err(|_| ConfigError::Missing("FIREBASE_PROJECT_ID"))?,
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            auth_base_url: env::var("FIREBASE_AUTH_URL")
                .unwrap_or_else(|_| DEFAULT_AUTH_BASE_URL.to_string()),
            feed_poll_interval,
            feed_page_limit,
            watcher_email: env::var("FITFEED_EMAIL").ok(),
            watcher_password: env::var("FITFEED_PASSWORD").ok(),
        })
    }
}

/// Parse a strictly positive integer setting.
fn positive<T>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid(name, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
