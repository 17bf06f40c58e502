//! Sync configuration.
//!
//! Values come from `TASKDECK_*` environment variables (see
//! [`SyncSettings::from_env`]) or from a serialized profile.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::SchedulerSettings;
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SYNC_ENABLED: &str = "TASKDECK_SYNC_ENABLED";
pub const ENV_DEBOUNCE_MS: &str = "TASKDECK_SYNC_DEBOUNCE_MS";
pub const ENV_POLL_INTERVAL_SECS: &str = "TASKDECK_SYNC_POLL_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TASKDECK_HTTP_TIMEOUT_SECS";
pub const ENV_BACKUP_URL: &str = "TASKDECK_BACKUP_URL";
pub const ENV_TOKEN_URL: &str = "TASKDECK_TOKEN_URL";
pub const ENV_CLIENT_ID: &str = "TASKDECK_CLIENT_ID";

const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub poll_interval_secs: u64,
    pub http_timeout_secs: u64,
    /// URL of the backup blob (GET/PUT/DELETE/HEAD)
    pub backup_url: Option<String>,
    /// OAuth-style token endpoint for sign-in and silent refresh
    pub token_url: Option<String>,
    pub client_id: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            backup_url: None,
            token_url: None,
            client_id: None,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Build settings from a variable lookup; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::default().overlay_lookup(lookup)
    }

    /// Apply variables found by `lookup` on top of `self`.
    pub fn overlay_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = optional_trimmed(&lookup, ENV_SYNC_ENABLED) {
            self.enabled = parse_bool(&value).ok_or_else(|| {
                ConfigError::Invalid(format!("{ENV_SYNC_ENABLED} must be true or false"))
            })?;
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_DEBOUNCE_MS) {
            self.debounce_ms = parse_u64(&value, ENV_DEBOUNCE_MS)?;
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_POLL_INTERVAL_SECS) {
            self.poll_interval_secs = parse_u64(&value, ENV_POLL_INTERVAL_SECS)?;
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_HTTP_TIMEOUT_SECS) {
            self.http_timeout_secs = parse_u64(&value, ENV_HTTP_TIMEOUT_SECS)?;
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_BACKUP_URL) {
            self.backup_url = Some(value);
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_TOKEN_URL) {
            self.token_url = Some(value);
        }
        if let Some(value) = optional_trimmed(&lookup, ENV_CLIENT_ID) {
            self.client_id = Some(value);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=60_000).contains(&self.debounce_ms) {
            return Err(ConfigError::Invalid(
                "debounce must be between 100 ms and 60000 ms".to_string(),
            ));
        }
        if !(10..=86_400).contains(&self.poll_interval_secs) {
            return Err(ConfigError::Invalid(
                "poll interval must be between 10 and 86400 seconds".to_string(),
            ));
        }
        if !(1..=600).contains(&self.http_timeout_secs) {
            return Err(ConfigError::Invalid(
                "HTTP timeout must be between 1 and 600 seconds".to_string(),
            ));
        }
        for (name, url) in [
            ("backup URL", &self.backup_url),
            ("token URL", &self.token_url),
        ] {
            if let Some(url) = url.as_deref() {
                if !is_http_url(url) {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must start with http:// or https://"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Backup URL, required for any remote operation
    pub fn require_backup_url(&self) -> Result<&str, ConfigError> {
        self.backup_url
            .as_deref()
            .ok_or(ConfigError::MissingVar(ENV_BACKUP_URL))
    }

    /// Token endpoint and client id, when both are configured
    #[must_use]
    pub fn token_endpoint(&self) -> Option<(String, String)> {
        match (
            normalize_text_option(self.token_url.clone()),
            normalize_text_option(self.client_id.clone()),
        ) {
            (Some(url), Some(client_id)) => Some((url, client_id)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub const fn scheduler(&self) -> SchedulerSettings {
        SchedulerSettings {
            enabled: self.enabled,
            debounce: self.debounce(),
            poll_interval: self.poll_interval(),
        }
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

fn parse_u64(value: &str, name: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer")))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
