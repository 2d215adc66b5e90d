//! Runtime configuration read from the environment (after `.env`, if present).

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use crate::api::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE};
use crate::inventory::DEFAULT_RETRY_LIMIT;

pub const DEFAULT_PORT: u16 = 8083;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Postgres Document Store when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub stock_retry_limit: u32,
    pub seed_catalog: bool,
    pub blob_base_url: String,
    /// Accounts signing up with this email become admins.
    pub admin_email: Option<String>,
    pub session_idle: Duration,
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let port = parse(&var, "PORT")?.unwrap_or(DEFAULT_PORT);
        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            stock_retry_limit: parse(&var, "STOCK_RETRY_LIMIT")?.unwrap_or(DEFAULT_RETRY_LIMIT),
            seed_catalog: var("SEED_CATALOG").map(|v| parse_flag("SEED_CATALOG", &v)).transpose()?.unwrap_or(false),
            blob_base_url: var("BLOB_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}/blobs")),
            admin_email: var("ADMIN_EMAIL"),
            session_idle: parse(&var, "SESSION_IDLE_MINUTES")?.map_or(DEFAULT_SESSION_IDLE, |minutes: u64| Duration::from_secs(minutes.saturating_mul(60))),
            max_sessions: parse(&var, "MAX_SESSIONS")?.unwrap_or(DEFAULT_MAX_SESSIONS),
        })
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}

fn parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    var(name).map(|value| value.parse().map_err(|_| ConfigError::Invalid { name, value })).transpose()
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value: value.to_string() }),
    }
}
