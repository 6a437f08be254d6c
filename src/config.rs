use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub management_rps: u32,
    pub webhook_timeout_ms: u64,
    pub dispatcher_workers: usize,
    pub dispatcher_batch_size: i64,
    pub dispatcher_poll_interval_ms: u64,
    pub event_claim_timeout_secs: i64,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Outbound delivery settings shared by the dispatcher, redelivery and ping.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("consent-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on concurrent outbound deliveries.
    pub workers: usize,
    /// Envelopes claimed from the queue per poll.
    pub batch_size: i64,
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            batch_size: 32,
            poll_interval: Duration::from_millis(750),
        }
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            jwt_secret: get_env("JWT_SECRET")?,
            management_rps: get_env_parse_or("MANAGEMENT_RPS", 50)?,
            webhook_timeout_ms: get_env_parse_or("WEBHOOK_TIMEOUT_MS", 10_000)?,
            dispatcher_workers: get_env_parse_or("DISPATCHER_WORKERS", 16)?,
            dispatcher_batch_size: get_env_parse_or("DISPATCHER_BATCH_SIZE", 32)?,
            dispatcher_poll_interval_ms: get_env_parse_or("DISPATCHER_POLL_INTERVAL_MS", 750)?,
            event_claim_timeout_secs: get_env_parse_or("EVENT_CLAIM_TIMEOUT_SECS", 300)?,
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            timeout: Duration::from_millis(self.webhook_timeout_ms),
            ..DeliveryConfig::default()
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.dispatcher_workers.max(1),
            batch_size: self.dispatcher_batch_size.max(1),
            poll_interval: Duration::from_millis(self.dispatcher_poll_interval_ms),
        }
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
