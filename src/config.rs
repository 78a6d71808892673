// config.rs
use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::db::query_timeout::QueryTimeout;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(ConfigError::Invalid {
                name: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapAdmin {
    pub account_id: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub store_timeout_ms: u64,
    pub store_max_retries: u32,
    pub store_backoff_ms: u64,
    pub blob_dir: String,
    pub blob_base_url: String,
    pub push_webhook_url: Option<String>,
    pub payment_webhook_secret: String,
    pub cors_origins: Vec<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn parse<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Config {
    /// Read the process environment. Call `dotenv().ok()` first to pick up a
    /// local `.env`.
    pub fn init() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let jwt_secret = var("JWT_SECRET_KEY").ok_or(ConfigError::Missing("JWT_SECRET_KEY"))?;
        let payment_webhook_secret = var("PAYMENT_WEBHOOK_SECRET")
            .ok_or(ConfigError::Missing("PAYMENT_WEBHOOK_SECRET"))?;

        let store_backend = match var("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::Memory,
        };
        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let port: u16 = parse("PORT", var("PORT"), 8000)?;
        let blob_base_url = var("BLOB_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}/uploads", port));

        let bootstrap_admin = match (var("BOOTSTRAP_ADMIN_ID"), var("BOOTSTRAP_ADMIN_EMAIL")) {
            (Some(account_id), Some(email)) => Some(BootstrapAdmin { account_id, email }),
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL")),
            _ => None,
        };

        Ok(Config {
            port,
            jwt_secret,
            jwt_maxage: parse("JWT_MAXAGE", var("JWT_MAXAGE"), 60)?,
            store_backend,
            database_url,
            store_timeout_ms: parse("STORE_TIMEOUT_MS", var("STORE_TIMEOUT_MS"), 5000)?,
            store_max_retries: parse("STORE_MAX_RETRIES", var("STORE_MAX_RETRIES"), 3)?,
            store_backoff_ms: parse("STORE_BACKOFF_MS", var("STORE_BACKOFF_MS"), 50)?,
            blob_dir: var("BLOB_DIR").unwrap_or_else(|| "./uploads".to_string()),
            blob_base_url,
            push_webhook_url: var("PUSH_WEBHOOK_URL"),
            payment_webhook_secret,
            cors_origins: var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]),
            bootstrap_admin,
        })
    }

    pub fn query_timeout(&self) -> QueryTimeout {
        QueryTimeout::new(
            Duration::from_millis(self.store_timeout_ms),
            self.store_max_retries.max(1),
            Duration::from_millis(self.store_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("JWT_SECRET_KEY", "s"), ("PAYMENT_WEBHOOK_SECRET", "p")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.jwt_maxage, 60);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.store_timeout_ms, 5000);
        assert_eq!(config.store_max_retries, 3);
        assert_eq!(config.store_backoff_ms, 50);
        assert_eq!(config.blob_base_url, "http://localhost:8000/uploads");
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn secrets_are_required() {
        assert_eq!(
            config(&[("PAYMENT_WEBHOOK_SECRET", "p")]).unwrap_err(),
            ConfigError::Missing("JWT_SECRET_KEY")
        );
        assert_eq!(
            config(&[("JWT_SECRET_KEY", "s")]).unwrap_err(),
            ConfigError::Missing("PAYMENT_WEBHOOK_SECRET")
        );
    }

    #[test]
    fn postgres_needs_database_url() {
        let err = config(&[
            ("JWT_SECRET_KEY", "s"),
            ("PAYMENT_WEBHOOK_SECRET", "p"),
            ("STORE_BACKEND", "postgres"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[
            ("JWT_SECRET_KEY", "s"),
            ("PAYMENT_WEBHOOK_SECRET", "p"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn cors_origins_are_split() {
        let config = config(&[
            ("JWT_SECRET_KEY", "s"),
            ("PAYMENT_WEBHOOK_SECRET", "p"),
            ("CORS_ORIGINS", "https://etancheconnect.fr, http://localhost:5173,"),
        ])
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://etancheconnect.fr", "http://localhost:5173"]
        );
    }
}
