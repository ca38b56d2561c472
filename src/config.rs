use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://myacademics.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_QUEUE_CONCURRENCY: usize = 3;
pub const DEFAULT_PRESENCE_TTL_SECS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "myacademics=debug,tower_http=info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: String },

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: String, value: String },

    #[error("{key} must be at least 1")]
    Zero { key: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub queue_concurrency: usize,
    pub presence_ttl: Duration,
    pub log_filter: String,
}

impl AppConfig {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let bind_addr: SocketAddr = parse_var(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;

        let queue_concurrency: usize =
            parse_var(&lookup, "CALC_QUEUE_CONCURRENCY", Some(DEFAULT_QUEUE_CONCURRENCY))?;
        if queue_concurrency == 0 {
            return Err(ConfigError::Zero { key: "CALC_QUEUE_CONCURRENCY".to_string() });
        }

        let ttl_secs: u64 = parse_var(&lookup, "PRESENCE_TTL_SECS", Some(DEFAULT_PRESENCE_TTL_SECS))?;
        if ttl_secs == 0 {
            return Err(ConfigError::Zero { key: "PRESENCE_TTL_SECS".to_string() });
        }

        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_url,
            bind_addr,
            queue_concurrency,
            presence_ttl: Duration::from_secs(ttl_secs),
            log_filter,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
            }),
        None => default.ok_or_else(|| ConfigError::Missing { key: key.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.queue_concurrency, 3);
        assert_eq!(config.presence_ttl, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(|key| match key {
            "CALC_QUEUE_CONCURRENCY" => Some("5".to_string()),
            "PRESENCE_TTL_SECS" => Some("10".to_string()),
            "BIND_ADDR" => Some("0.0.0.0:8080".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.queue_concurrency, 5);
        assert_eq!(config.presence_ttl, Duration::from_secs(10));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = AppConfig::from_lookup(|key| {
            (key == "CALC_QUEUE_CONCURRENCY").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Zero { .. })));
    }

    #[test]
    fn garbage_values_are_rejected() {
        let result = AppConfig::from_lookup(|key| {
            (key == "PRESENCE_TTL_SECS").then(|| "soon".to_string())
        });
        match result {
            Err(e @ ConfigError::Invalid { .. }) => {
                assert_eq!(e.to_string(), "PRESENCE_TTL_SECS has an invalid value: soon");
            }
            other => panic!("expected an invalid value error, got {:?}", other),
        }
    }
}
