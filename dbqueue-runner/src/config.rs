use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use dbqueue_core::RetryPolicy;

use crate::error::RunnerError;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub port: u16,

    #[envconfig(from = "DBQUEUE_CHANNEL_NAME", default = "dbqueue_notifications")]
    pub channel_name: String,

    #[envconfig(from = "DBQUEUE_DATABASE_ALIAS", default = "default")]
    pub database_alias: String,

    #[envconfig(from = "DBQUEUE_MAX_PG_CONNECTIONS", default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(from = "DBQUEUE_RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub retry_backoff_coefficient: u32,

    #[envconfig(from = "DBQUEUE_RETRY_MAXIMUM_INTERVAL_MS", default = "100000")]
    pub retry_maximum_interval: EnvMsDuration,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the connection URL for the configured database alias.
    ///
    /// The alias `default` reads `DATABASE_URL`; any other alias reads
    /// `DATABASE_URL_<ALIAS>`, so one process environment can carry several
    /// connection profiles.
    pub fn database_url(&self) -> Result<String, RunnerError> {
        let var = if self.database_alias == "default" {
            "DATABASE_URL".to_owned()
        } else {
            format!("DATABASE_URL_{}", self.database_alias.to_uppercase())
        };

        std::env::var(&var)
            .map_err(|_| RunnerError::ConfigurationError(format!("{var} is not set")))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_backoff_coefficient,
            Some(self.retry_maximum_interval.0),
        )
    }
}

/// Whether the store behind this URL can push notifications. Only the
/// Postgres engines carry LISTEN/NOTIFY; anything else must rely on the
/// periodic rescan.
pub fn supports_notifications(database_url: &str) -> bool {
    database_url.starts_with("postgres://") || database_url.starts_with("postgresql://")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
