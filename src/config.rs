//! Process configuration, read from the environment after loading `.env`.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::event_sourcing::PostgresConfig;
use crate::relay::{DeliveryMode, RelayConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    /// Comma separated `host:port` list
    pub brokers: String,
    pub topic: String,
    pub relay: RelayConfig,
    pub metrics_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env is fine; real deployments set the variables directly.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Unset keys take their defaults,
    /// malformed values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL not set"))?;
        let postgres = PostgresConfig::new(&url)
            .with_max_connections(parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?)
            .with_acquire_timeout(Duration::from_secs(parse_or(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                5,
            )?));

        let defaults = RelayConfig::default();
        let retain: bool = parse_or(&lookup, "RELAY_RETAIN_DELIVERED", false)?;
        let relay = RelayConfig {
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            batch_size: parse_or(&lookup, "RELAY_BATCH_SIZE", defaults.batch_size)?,
            operation_timeout: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_OPERATION_TIMEOUT_MS",
                defaults.operation_timeout.as_millis() as u64,
            )?),
            delivery: if retain {
                DeliveryMode::MarkDelivered
            } else {
                DeliveryMode::Delete
            },
        };
        if relay.batch_size == 0 {
            return Err(anyhow!("RELAY_BATCH_SIZE must be at least 1"));
        }

        Ok(Self {
            postgres,
            brokers: lookup("REDPANDA_BROKERS").unwrap_or_else(|| "127.0.0.1:9092".to_string()),
            topic: lookup("OUTBOX_TOPIC").unwrap_or_else(|| "survey-events".to_string()),
            relay,
            metrics_port: parse_or(&lookup, "METRICS_PORT", 9090)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
