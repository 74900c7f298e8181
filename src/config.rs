use std::env;
use std::time::Duration;

use crate::services::retry::RetryConfig;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Deadline applied to each engine dispatch within a batch.
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8088".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let request_timeout_secs: u64 = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| "REQUEST_TIMEOUT_SECS must be a valid u64".to_string())?;

        let max_attempts: u32 = env::var("ENGINE_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| "ENGINE_MAX_RETRIES must be a valid u32".to_string())?;

        Ok(Config {
            database_url,
            host,
            port,
            request_timeout: Duration::from_secs(request_timeout_secs),
            retry: RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            },
        })
    }
}
