//! Store configuration.

use std::time::Duration;

use tradevault_core::{Error, Result};

/// Environment variable holding the PostgreSQL connection string. The
/// configured role must not hold `BYPASSRLS` or `SUPERUSER`; connection
/// fails otherwise (see [`crate::rolecheck`]).
pub const DATABASE_URL_ENV: &str = "TRADEVAULT_DATABASE_URL";

/// Connection-pool and retry settings for the credential store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Bounded retry for transient pool exhaustion only. Security-relevant
    /// failures are never retried.
    pub acquire_attempts: usize,
    pub acquire_backoff: Duration,
}

impl StoreConfig {
    pub fn new<T: Into<String>>(database_url: T) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            acquire_attempts: 3,
            acquire_backoff: Duration::from_millis(200),
        }
    }

    /// Reads the connection string from [`DATABASE_URL_ENV`].
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(DATABASE_URL_ENV).map_err(|_| {
            Error::configuration(format!("{DATABASE_URL_ENV} is not set"))
        })?;
        if url.trim().is_empty() {
            return Err(Error::configuration(format!("{DATABASE_URL_ENV} is empty")));
        }
        Ok(Self::new(url))
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = StoreConfig::new("postgres://vault@localhost/vault");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_attempts, 3);
        assert!(config.acquire_backoff < config.acquire_timeout);
    }
}
