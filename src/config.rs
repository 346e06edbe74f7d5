//! Environment-driven configuration.
//!
//! Every TTL, the search-cache bound, and all retry tuning knobs are plain
//! environment variables -- overridable per deployment without code changes.
//! Durations accept human-friendly strings (`24h`, `5m`, `500ms`); bare
//! numbers are seconds.

use crate::cache::CacheSettings;
use crate::retry::RetryPolicy;
use crate::web::auth::AuthSettings;
use anyhow::Context;
use figment::providers::Env;
use figment::Figment;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Built-in secret for local development only; a warning is logged when it
/// is in use.
pub const DEV_AUTH_SECRET: &str = "skybook-dev-secret-do-not-deploy";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Base URL of a real flight-data provider. The in-process mock is used
    /// when unset.
    #[serde(default)]
    pub provider_base_url: Option<String>,
    #[serde(default = "default_provider_timeout", deserialize_with = "duration_str")]
    pub provider_timeout: Duration,
    /// Simulated latency of the mock provider.
    #[serde(default = "default_mock_latency", deserialize_with = "duration_str")]
    pub mock_latency: Duration,

    #[serde(default = "default_reference_ttl", deserialize_with = "duration_str")]
    pub route_map_ttl: Duration,
    #[serde(default = "default_reference_ttl", deserialize_with = "duration_str")]
    pub stations_ttl: Duration,
    #[serde(default = "default_search_ttl", deserialize_with = "duration_str")]
    pub search_ttl: Duration,
    #[serde(default = "default_search_capacity")]
    pub search_cache_capacity: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        default = "default_initial_retry_delay",
        deserialize_with = "duration_str"
    )]
    pub initial_retry_delay: Duration,
    #[serde(default = "default_max_retry_delay", deserialize_with = "duration_str")]
    pub max_retry_delay: Duration,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    #[serde(default = "default_auth_secret")]
    pub auth_secret: String,
    #[serde(default = "default_access_token_ttl", deserialize_with = "duration_str")]
    pub access_token_ttl: Duration,
    #[serde(
        default = "default_refresh_token_ttl",
        deserialize_with = "duration_str"
    )]
    pub refresh_token_ttl: Duration,

    #[serde(default = "default_shutdown_timeout", deserialize_with = "duration_str")]
    pub shutdown_timeout: Duration,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_mock_latency() -> Duration {
    Duration::from_millis(150)
}

fn default_reference_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_search_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_search_capacity() -> usize {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.25
}

fn default_auth_secret() -> String {
    DEV_AUTH_SECRET.to_owned()
}

fn default_access_token_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_refresh_token_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Parse a human-friendly duration string (`500ms`, `5m`, `24h`; bare
/// numbers are seconds).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    use fundu::DurationParser;
    DurationParser::with_all_time_units()
        .parse(raw.trim())
        .map_err(|err| format!("invalid duration '{raw}': {err}"))
        .and_then(|d| {
            Duration::try_from(d).map_err(|err| format!("duration '{raw}' out of range: {err}"))
        })
}

fn duration_str<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Figment::new()
            .merge(Env::raw())
            .extract()
            .context("Failed to load config")
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            route_map_ttl: self.route_map_ttl,
            stations_ttl: self.stations_ttl,
            search_ttl: self.search_ttl,
            search_capacity: self.search_cache_capacity,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_retry_delay,
            max_delay: self.max_retry_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_ttl: self.access_token_ttl,
            refresh_ttl: self.refresh_token_ttl,
        }
    }
}
