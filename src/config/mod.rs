//! Service configuration.
//!
//! Non-secret settings come from a TOML file with serde defaults; secrets
//! (encryption keys, provider client credentials) come from environment
//! variables only and never appear in config files.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete grantor configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GrantorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OauthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the API server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL used to build default OAuth redirect URIs
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_url: default_base_url(),
        }
    }
}

/// OAuth flow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OauthConfig {
    /// How long unconsumed CSRF states remain valid (seconds)
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// Interval of the background expired-state sweep (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Timeout applied to token-endpoint requests (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_state_ttl() -> i64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: default_state_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "credentials.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<GrantorConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: GrantorConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}

/// Read the at-rest encryption keys from the environment.
///
/// `GRANTOR_ENCRYPTION_KEY` is required; `GRANTOR_ENCRYPTION_KEY_PREVIOUS`
/// is optional and enables decryption of records written before a rotation.
pub fn encryption_keys_from_env() -> Result<(String, Option<String>)> {
    let current = std::env::var("GRANTOR_ENCRYPTION_KEY")
        .context("GRANTOR_ENCRYPTION_KEY must be set (base64, 32 bytes)")?;
    let previous = std::env::var("GRANTOR_ENCRYPTION_KEY_PREVIOUS").ok();

    Ok((current, previous))
}
