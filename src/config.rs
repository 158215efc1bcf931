use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_OVERDUE_SWEEP_SECS: u64 = 300;
const DEFAULT_MAX_IMPORT_BYTES: usize = 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Runtime settings read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub token_ttl_days: i64,
    /// `None` when the overdue sweeper is disabled (`OVERDUE_SWEEP_SECS=0`).
    pub overdue_sweep_interval: Option<Duration>,
    pub max_import_bytes: usize,
    pub db_max_connections: u32,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Empty(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Empty(key) => write!(f, "{} cannot be empty", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            let value = lookup(key).ok_or(ConfigError::Missing(key))?;
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(key));
            }
            Ok(value)
        };

        let sweep_secs: u64 = parse_or(&lookup, "OVERDUE_SWEEP_SECS", DEFAULT_OVERDUE_SWEEP_SECS)?;

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            token_ttl_days: parse_or(&lookup, "TOKEN_TTL_DAYS", DEFAULT_TOKEN_TTL_DAYS)?,
            overdue_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            max_import_bytes: parse_or(&lookup, "MAX_IMPORT_BYTES", DEFAULT_MAX_IMPORT_BYTES)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw.clone())),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/taskdesk_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            overdue_sweep_interval: None,
            max_import_bytes: 64,
            db_max_connections: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.token_ttl_days, 7);
        assert_eq!(config.overdue_sweep_interval, Some(Duration::from_secs(300)));
        assert_eq!(config.max_import_bytes, 1024 * 1024);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Empty("JWT_SECRET"));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", "x")])).unwrap_err();
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn zero_sweep_interval_disables_sweeper() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "s3cret"),
            ("OVERDUE_SWEEP_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.overdue_sweep_interval, None);
    }

    #[test]
    fn malformed_number_is_invalid() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_DAYS", "seven"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Invalid("TOKEN_TTL_DAYS", "seven".to_string()));
    }
}
