//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the store URL and API key) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::store::TableNames;

/// Default config path when `OPUS_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub dashboard: DashboardConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_title")]
    pub title: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Env var holding the project base URL, e.g. `https://xyz.supabase.co`.
    pub url_env: String,
    /// Env var holding the anon/service API key.
    pub api_key_env: String,
    #[serde(default = "default_signals_table")]
    pub signals_table: String,
    #[serde(default = "default_picks_table")]
    pub picks_table: String,
    /// Rows held in memory per collection.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl StoreConfig {
    pub fn tables(&self) -> TableNames {
        TableNames {
            signals: self.signals_table.clone(),
            picks: self.picks_table.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    pub enabled: bool,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: default_schema(),
            heartbeat_secs: default_heartbeat(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

fn default_title() -> String {
    "Opus Quant Dashboard".to_string()
}

fn default_signals_table() -> String {
    "session_analysis".to_string()
}

fn default_picks_table() -> String {
    "model_predictions".to_string()
}

fn default_fetch_limit() -> usize {
    20
}

fn default_request_timeout() -> u64 {
    15
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_heartbeat() -> u64 {
    25
}

fn default_reconnect_delay() -> u64 {
    5
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        anyhow::ensure!(config.store.fetch_limit > 0, "store.fetch_limit must be positive");
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
