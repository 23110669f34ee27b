//! Environment-sourced configuration.
//!
//! The trigger loads a fresh `SweeperConfig` on every invocation and passes it
//! down explicitly. Nothing here is global or mutable.

use std::fmt;

use thiserror::Error;

use crate::app::SweepOptions;
use crate::domain::{RetentionPolicy, SweepMode};

pub const REGISTRY_URL: &str = "RegistryUrl";
pub const TENANT_ID: &str = "TenantId";
pub const CLIENT_ID: &str = "ClientId";
pub const CLIENT_SECRET: &str = "ClientSecret";
pub const RETENTION_DAYS: &str = "RetentionDays";
pub const DRY_RUN: &str = "SweepDryRun";
pub const EARLY_STOP: &str = "SweepEarlyStop";

/// Roughly ten thousand years. Anything longer cannot mean a real retention window.
pub const MAX_RETENTION_DAYS: u32 = 3_650_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Everything one sweep needs from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// e.g. `https://myregistry.azurecr.io`
    pub registry_endpoint: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub retention_days: u32,
    pub dry_run: bool,
    pub early_stop: bool,
}

impl fmt::Debug for SweeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweeperConfig")
            .field("registry_endpoint", &self.registry_endpoint)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("retention_days", &self.retention_days)
            .field("dry_run", &self.dry_run)
            .field("early_stop", &self.early_stop)
            .finish()
    }
}

impl SweeperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let registry_endpoint = required(REGISTRY_URL)?;
        validate_endpoint(&registry_endpoint)?;

        let retention_days = required(RETENTION_DAYS)?
            .parse::<u32>()
            .map_err(|e| ConfigError::Invalid {
                key: RETENTION_DAYS,
                message: format!("expected a non-negative whole number of days ({e})"),
            })?;
        if retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Invalid {
                key: RETENTION_DAYS,
                message: format!("{retention_days} days exceeds the maximum of {MAX_RETENTION_DAYS}"),
            });
        }

        let dry_run = match get(DRY_RUN) {
            Some(v) => parse_bool(DRY_RUN, &v)?,
            None => false,
        };
        let early_stop = match get(EARLY_STOP) {
            Some(v) => parse_bool(EARLY_STOP, &v)?,
            None => false,
        };

        Ok(Self {
            registry_endpoint,
            tenant_id: required(TENANT_ID)?,
            client_id: required(CLIENT_ID)?,
            client_secret: required(CLIENT_SECRET)?,
            retention_days,
            dry_run,
            early_stop,
        })
    }

    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_days)
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            mode: if self.dry_run {
                SweepMode::DryRun
            } else {
                SweepMode::Execute
            },
            early_stop: self.early_stop,
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
        key: REGISTRY_URL,
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            key: REGISTRY_URL,
            message: format!("expected an http(s) URL, got {endpoint}"),
        });
    }
    Ok(())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected true/false, got {value}"),
        }),
    }
}
