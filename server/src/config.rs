//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use ledgerbank_ledger::store::PgStoreConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Which account store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via `DATABASE_URL`.
    Postgres,
    /// Process-local store. State is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Account store backend.
    pub store: StoreBackend,
    /// Database URL.
    pub database_url: String,
    /// Database pool size.
    pub max_connections: u32,
    /// How long a transaction waits for a row lock.
    pub lock_timeout: Duration,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            store: StoreBackend::Postgres,
            database_url: String::new(),
            max_connections: 10,
            lock_timeout: Duration::from_millis(5000),
            cors_origins: vec!["http://localhost:3000".to_string()],
            log_json: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("LEDGER_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("LEDGER_LISTEN_PORT") {
            config.listen_port = parse("LEDGER_LISTEN_PORT", port)?;
        }

        if let Some(store) = lookup("LEDGER_STORE") {
            config.store = store.parse().map_err(|()| ConfigError::InvalidValue {
                name: "LEDGER_STORE",
                value: store,
            })?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(max) = lookup("LEDGER_DB_MAX_CONNECTIONS") {
            config.max_connections = parse("LEDGER_DB_MAX_CONNECTIONS", max)?;
        }

        if let Some(ms) = lookup("LEDGER_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(parse("LEDGER_LOCK_TIMEOUT_MS", ms)?);
        }

        if let Some(origins) = lookup("LEDGER_CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(json) = lookup("LEDGER_LOG_JSON") {
            config.log_json = parse("LEDGER_LOG_JSON", json)?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("Listen port cannot be 0".to_string()));
        }

        if self.store == StoreBackend::Postgres && self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DATABASE_URL is required for the postgres store".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.lock_timeout.is_zero() {
            return Err(ConfigError::Invalid("Lock timeout cannot be 0".to_string()));
        }

        Ok(())
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// Settings for [`ledgerbank_ledger::store::PgStore::connect`].
    pub fn pg_store_config(&self) -> PgStoreConfig {
        let mut pg = PgStoreConfig::new(self.database_url.clone());
        pg.max_connections = self.max_connections;
        pg.lock_timeout = self.lock_timeout;
        pg
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let mut config = ServerConfig::default();
        config.store = StoreBackend::Memory;
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_err());

        config.database_url = "postgres://localhost/ledgerbank".to_string();
        assert!(config.validate().is_ok());

        config.listen_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("LEDGER_LISTEN_PORT", "9000"),
            ("LEDGER_STORE", "memory"),
            ("LEDGER_LOCK_TIMEOUT_MS", "250"),
            ("LEDGER_CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("LEDGER_LOG_JSON", "false"),
        ]))
        .unwrap();

        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!config.log_json);
    }

    #[test]
    fn test_bad_values_are_reported() {
        let err = ServerConfig::from_lookup(lookup(&[("LEDGER_LISTEN_PORT", "eighty")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "LEDGER_LISTEN_PORT",
                value: "eighty".to_string(),
            }
        );

        assert!(ServerConfig::from_lookup(lookup(&[("LEDGER_STORE", "redis")])).is_err());
    }
}
