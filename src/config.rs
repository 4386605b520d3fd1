//! Configuration parsed from environment variables.
//!
//! The seven connection parameters mirror the hosted database's web config.
//! Only the database URL is required by the REST adapter; the rest are carried
//! through untouched so a deployment can ship the same `.env` it uses elsewhere.

use std::path::PathBuf;

pub const DEFAULT_COLLECTION: &str = "games";
pub const DEFAULT_STORAGE_PATH: &str = ".gamevote/local_storage.json";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::InvalidUrl(_) => "E_CONFIG_URL",
        }
    }
}

/// Connection parameters for the hosted realtime database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub database_url: String,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    /// Optional database secret or ID token, sent as the `auth` query parameter.
    pub auth_token: Option<String>,
    pub connect_timeout_secs: u64,
}

impl StoreConfig {
    /// Build typed store config from environment variables.
    ///
    /// Required:
    /// - `FIREBASE_DATABASE_URL`
    ///
    /// Optional:
    /// - `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID`,
    ///   `FIREBASE_STORAGE_BUCKET`, `FIREBASE_MESSAGING_SENDER_ID`, `FIREBASE_APP_ID`
    /// - `FIREBASE_AUTH_TOKEN`
    /// - `FIREBASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without a database URL and
    /// [`ConfigError::InvalidUrl`] when it is not an http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env_opt("FIREBASE_DATABASE_URL").ok_or(ConfigError::Missing { var: "FIREBASE_DATABASE_URL" })?;
        let database_url = normalize_database_url(&database_url)?;

        Ok(Self {
            api_key: env_opt("FIREBASE_API_KEY"),
            auth_domain: env_opt("FIREBASE_AUTH_DOMAIN"),
            database_url,
            project_id: env_opt("FIREBASE_PROJECT_ID"),
            storage_bucket: env_opt("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: env_opt("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: env_opt("FIREBASE_APP_ID"),
            auth_token: env_opt("FIREBASE_AUTH_TOKEN"),
            connect_timeout_secs: env_parse("FIREBASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        })
    }
}

/// Client-side options: which collection to mirror and where the local
/// key-value storage lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub collection: String,
    pub storage_path: PathBuf,
}

impl ClientConfig {
    /// Read `GAMEVOTE_COLLECTION` and `GAMEVOTE_STORAGE_PATH`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            collection: env_opt("GAMEVOTE_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            storage_path: env_opt("GAMEVOTE_STORAGE_PATH").map_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH), PathBuf::from),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { collection: DEFAULT_COLLECTION.to_string(), storage_path: PathBuf::from(DEFAULT_STORAGE_PATH) }
    }
}

fn normalize_database_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidUrl(raw.to_string()))
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
