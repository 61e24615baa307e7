use crate::domain::defaults::seed_school_year_labels;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StorageBackend::Postgres),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// `None` lets the driver resolve `PGHOST`, `PGUSER`, ... itself.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub bind_addr: String,
    pub storage: StorageBackend,
    pub seed_school_years: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => addr.to_string(),
            None => format!("0.0.0.0:{}", get("PORT").unwrap_or("3000")),
        };

        let storage = match get("STORAGE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "STORAGE",
                value: raw.to_string(),
            })?,
            None => StorageBackend::Postgres,
        };

        let seed_school_years = match get("SEED_SCHOOL_YEARS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(str::to_string)
                .collect(),
            None => seed_school_year_labels(chrono::Local::now().date_naive()),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").map(str::to_string),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout_secs: parse_or(get("DB_ACQUIRE_TIMEOUT_SECS"), "DB_ACQUIRE_TIMEOUT_SECS", 30)?,
            bind_addr,
            storage,
            seed_school_years,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<&str>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_vars(&HashMap::new()).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.seed_school_years.len(), 2);
    }

    #[test]
    fn test_explicit_values() {
        let config = AppConfig::from_vars(&vars(&[
            ("DATABASE_URL", "postgres://localhost/evalbook"),
            ("PORT", "8080"),
            ("STORAGE", "memory"),
            ("SEED_SCHOOL_YEARS", "2030-2031, 2031-2032,"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/evalbook"));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.seed_school_years, vec!["2030-2031", "2031-2032"]);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::from_vars(&vars(&[("DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
    }
}
