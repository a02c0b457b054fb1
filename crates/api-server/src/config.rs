//! Environment-driven configuration

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use taskhub_core::batch::BatchConfig;
use taskhub_core::db::DatabaseConfig;
use thiserror::Error;

/// `DATABASE_URL` value selecting the in-memory store
pub const MEMORY_STORE_URL: &str = "memory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Where tasks are kept
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory,
    Sqlite(DatabaseConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub environment: String,
    pub debug: bool,
    pub log_format: LogFormat,
    pub store: StoreBackend,
    pub batch: BatchConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = env_flag(&lookup, "APP_DEBUG", true)?;

        let log_format = match lookup("APP_LOG_FORMAT") {
            None => LogFormat::Text,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "text" | "" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "APP_LOG_FORMAT",
                        value: raw,
                        reason: "expected text or json".to_string(),
                    })
                }
            },
        };

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DatabaseConfig::default().url);
        let store = if database_url.trim() == MEMORY_STORE_URL {
            StoreBackend::Memory
        } else {
            let defaults = DatabaseConfig::default();
            StoreBackend::Sqlite(DatabaseConfig {
                url: database_url,
                max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
                acquire_timeout: Duration::from_secs(parse_var(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    defaults.acquire_timeout.as_secs(),
                )?),
                busy_timeout: defaults.busy_timeout,
                log_statements: debug,
            })
        };

        let batch_defaults = BatchConfig::default();
        let batch = BatchConfig {
            max_batch_size: parse_var(&lookup, "BATCH_MAX_SIZE", batch_defaults.max_batch_size)?,
            max_concurrency: parse_var(
                &lookup,
                "BATCH_MAX_CONCURRENCY",
                batch_defaults.max_concurrency,
            )?,
        };
        if batch.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "BATCH_MAX_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: parse_var(&lookup, "APP_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: parse_var(&lookup, "APP_PORT", 8000)?,
            environment: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            debug,
            log_format,
            store,
            batch,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_flag<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        },
        None => Ok(default),
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
