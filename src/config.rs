use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_RECOGNITION_URL: &str = "http://localhost:5000";
pub const DEFAULT_RECOGNITION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub recognition_url: String,
    pub recognition_timeout: Duration,
    pub max_connections: u32,
}

impl AppConfig {
    /// Reads configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let recognition_url =
            lookup("RECOGNITION_URL").unwrap_or_else(|| DEFAULT_RECOGNITION_URL.to_string());

        let timeout_secs = match lookup("RECOGNITION_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("RECOGNITION_TIMEOUT_SECS is not a number: {value}"))?,
            None => DEFAULT_RECOGNITION_TIMEOUT_SECS,
        };

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {value}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            recognition_url,
            recognition_timeout: Duration::from_secs(timeout_secs),
            max_connections,
        })
    }
}
