use std::env;

use crate::broker::retry::DEFAULT_MAX_RETRIES;
use crate::broker::topology::DEFAULT_MESSAGE_TTL_MS;

#[derive(Debug, Clone)]
pub struct Config {
    pub amqp_url: String,
    pub database_url: String,
    pub http_port: u16,
    pub default_workers: i32,
    pub max_retries: i32,
    pub message_ttl_ms: i32,
    pub shutdown_grace_secs: u64,
    pub heartbeat_stale_secs: i64,
    pub health_check_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let amqp_url =
            env::var("AMQP_URL").map_err(|_| ConfigError::MissingEnvVar("AMQP_URL".to_string()))?;
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let http_port = parse_or_default("HTTP_PORT", 8080)?;
        let default_workers = parse_or_default("DEFAULT_WORKERS", 3)?;
        let max_retries = parse_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES as i32)?;
        let message_ttl_ms = parse_or_default("MESSAGE_TTL_MS", DEFAULT_MESSAGE_TTL_MS)?;
        let shutdown_grace_secs = parse_or_default("SHUTDOWN_GRACE_SECS", 10)?;
        let heartbeat_stale_secs = parse_or_default("HEARTBEAT_STALE_SECS", 60)?;
        let health_check_interval_secs = parse_or_default("HEALTH_CHECK_INTERVAL_SECS", 30)?;

        Ok(Config {
            amqp_url,
            database_url,
            http_port,
            default_workers,
            max_retries,
            message_ttl_ms,
            shutdown_grace_secs,
            heartbeat_stale_secs,
            health_check_interval_secs,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.amqp_url.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "AMQP_URL".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        if self.database_url.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "DATABASE_URL".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        if self.default_workers < 1 {
            return Err(ConfigError::InvalidEnvVar(
                "DEFAULT_WORKERS".to_string(),
                "must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var affects the whole process; serialize these tests so they
    // don't interleave with each other across threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "AMQP_URL",
            "DATABASE_URL",
            "HTTP_PORT",
            "DEFAULT_WORKERS",
            "MAX_RETRIES",
            "MESSAGE_TTL_MS",
            "SHUTDOWN_GRACE_SECS",
            "HEARTBEAT_STALE_SECS",
            "HEALTH_CHECK_INTERVAL_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("AMQP_URL", "amqp://localhost:5672");
        env::set_var("DATABASE_URL", "postgres://localhost/db");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.default_workers, 3);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.message_ttl_ms, 86_400_000);
        clear_env();
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/db");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingEnvVar(_))
        ));
        clear_env();
    }

    #[test]
    fn validate_rejects_non_positive_worker_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("AMQP_URL", "amqp://localhost:5672");
        env::set_var("DATABASE_URL", "postgres://localhost/db");
        env::set_var("DEFAULT_WORKERS", "0");
        let cfg = Config::from_env().unwrap();
        assert!(cfg.validate().is_err());
        clear_env();
    }
}
