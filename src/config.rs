use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub fallbacks: FallbackConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Deadline for a single store call
    pub op_timeout_ms: u64,
    /// Artificial latency of the in-memory store
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub unknown_user: String,
    pub default_profile_pic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

pub const DEFAULT_UNKNOWN_USER: &str = "Unknown User";
pub const DEFAULT_PROFILE_PIC: &str = "defaultProfilePic";

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                op_timeout_ms: 10_000,
                latency_ms: 0,
            },
            fallbacks: FallbackConfig::default(),
            logging: LoggingConfig {
                filter: "info".to_string(),
            },
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            unknown_user: DEFAULT_UNKNOWN_USER.to_string(),
            default_profile_pic: DEFAULT_PROFILE_PIC.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let op_timeout_ms = parse_millis(
            "SOCIAL_SYNC_OP_TIMEOUT_MS",
            env::var("SOCIAL_SYNC_OP_TIMEOUT_MS").ok(),
            10_000,
        )?;
        if op_timeout_ms == 0 {
            return Err(AppError::ConfigurationError(
                "SOCIAL_SYNC_OP_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            store: StoreConfig {
                op_timeout_ms,
                latency_ms: parse_millis(
                    "SOCIAL_SYNC_STORE_LATENCY_MS",
                    env::var("SOCIAL_SYNC_STORE_LATENCY_MS").ok(),
                    0,
                )?,
            },
            fallbacks: FallbackConfig {
                unknown_user: env::var("SOCIAL_SYNC_UNKNOWN_USER")
                    .unwrap_or_else(|_| DEFAULT_UNKNOWN_USER.to_string()),
                default_profile_pic: env::var("SOCIAL_SYNC_DEFAULT_PROFILE_PIC")
                    .unwrap_or_else(|_| DEFAULT_PROFILE_PIC.to_string()),
            },
            logging: LoggingConfig {
                filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.store.op_timeout_ms)
    }

    pub fn store_latency(&self) -> Option<Duration> {
        match self.store.latency_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Millisecond setting from an env value; absent means `default`
fn parse_millis(name: &str, raw: Option<String>, default: u64) -> AppResult<u64> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            AppError::ConfigurationError(format!(
                "{} must be a whole number of milliseconds, got {:?}",
                name, value
            ))
        }),
    }
}
