//! OdmConfig - Runtime knobs
//!
//! TigerStyle: Constants are the defaults. The environment may override
//! them, within the same limits the constants assert.

use crate::constants::{
    KEYGEN_ATTEMPTS_MAX_DEFAULT, KEYGEN_LENGTH_DEFAULT, KEYGEN_LENGTH_MAX,
    RESULT_SET_BATCH_SIZE_DEFAULT, RESULT_SET_BATCH_SIZE_MAX,
};

/// Environment variable for the generated key length.
pub const ENV_KEYGEN_LENGTH: &str = "QUARRY_KEYGEN_LENGTH";
/// Environment variable for the key generation retry cap (`unbounded` lifts it).
pub const ENV_KEYGEN_ATTEMPTS_MAX: &str = "QUARRY_KEYGEN_ATTEMPTS_MAX";
/// Environment variable for the result set batch size.
pub const ENV_BATCH_SIZE: &str = "QUARRY_BATCH_SIZE";
/// Environment variable for the log filter.
pub const ENV_LOG_LEVEL: &str = "QUARRY_LOG_LEVEL";
/// Environment variable for the Postgres URL.
pub const ENV_DATABASE_URL: &str = "QUARRY_DATABASE_URL";

const UNBOUNDED: &str = "unbounded";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {var}={value:?}: {reason}")]
pub struct ConfigError {
    /// Variable name
    pub var: &'static str,
    /// Offending value
    pub value: String,
    /// What was expected
    pub reason: &'static str,
}

/// Session and CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdmConfig {
    /// Characters per generated key
    pub keygen_length: usize,
    /// Insert attempts before key generation gives up; `None` is unbounded
    pub keygen_attempts_max: Option<u32>,
    /// Records fetched per result set round trip
    pub batch_size: u64,
    /// Default log filter for binaries
    pub log_level: String,
    /// Postgres connection URL
    pub database_url: Option<String>,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            keygen_length: KEYGEN_LENGTH_DEFAULT,
            keygen_attempts_max: Some(KEYGEN_ATTEMPTS_MAX_DEFAULT),
            batch_size: RESULT_SET_BATCH_SIZE_DEFAULT,
            log_level: "info".to_string(),
            database_url: None,
        }
    }
}

impl OdmConfig {
    /// Defaults overridden by `QUARRY_*` environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError` for a value that does not parse or is out of
    /// range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    ///
    /// # Errors
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_KEYGEN_LENGTH) {
            match value.trim().parse::<usize>() {
                Ok(n) if (1..=KEYGEN_LENGTH_MAX).contains(&n) => config.keygen_length = n,
                _ => return Err(invalid(ENV_KEYGEN_LENGTH, value, "expected 1..=32")),
            }
        }

        if let Some(value) = lookup(ENV_KEYGEN_ATTEMPTS_MAX) {
            let trimmed = value.trim();
            if trimmed.eq_ignore_ascii_case(UNBOUNDED) {
                config.keygen_attempts_max = None;
            } else {
                match trimmed.parse::<u32>() {
                    Ok(n) if n > 0 => config.keygen_attempts_max = Some(n),
                    _ => {
                        return Err(invalid(
                            ENV_KEYGEN_ATTEMPTS_MAX,
                            value,
                            "expected a positive integer or \"unbounded\"",
                        ))
                    }
                }
            }
        }

        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            match value.trim().parse::<u64>() {
                Ok(n) if (1..=RESULT_SET_BATCH_SIZE_MAX).contains(&n) => config.batch_size = n,
                _ => return Err(invalid(ENV_BATCH_SIZE, value, "expected 1..=10000")),
            }
        }

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            config.log_level = value;
        }

        config.database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.is_empty());

        Ok(config)
    }

    /// Override the key length.
    #[must_use]
    pub fn with_keygen_length(mut self, length: usize) -> Self {
        self.keygen_length = length;
        self
    }

    /// Override the key generation retry cap.
    #[must_use]
    pub fn with_keygen_attempts_max(mut self, attempts_max: Option<u32>) -> Self {
        self.keygen_attempts_max = attempts_max;
        self
    }

    /// Override the result set batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }
}

fn invalid(var: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError { var, value, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = OdmConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OdmConfig::default());
        assert_eq!(config.keygen_attempts_max, Some(KEYGEN_ATTEMPTS_MAX_DEFAULT));
    }

    #[test]
    fn test_overrides() {
        let config = OdmConfig::from_lookup(lookup(&[
            (ENV_KEYGEN_LENGTH, "8"),
            (ENV_KEYGEN_ATTEMPTS_MAX, "unbounded"),
            (ENV_BATCH_SIZE, "25"),
            (ENV_LOG_LEVEL, "quarry_core=debug"),
            (ENV_DATABASE_URL, "postgres://localhost/quarry"),
        ]))
        .unwrap();

        assert_eq!(config.keygen_length, 8);
        assert_eq!(config.keygen_attempts_max, None);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.log_level, "quarry_core=debug");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/quarry"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = OdmConfig::from_lookup(lookup(&[(ENV_KEYGEN_LENGTH, "40")])).unwrap_err();
        assert_eq!(err.var, ENV_KEYGEN_LENGTH);

        let err = OdmConfig::from_lookup(lookup(&[(ENV_KEYGEN_ATTEMPTS_MAX, "0")])).unwrap_err();
        assert_eq!(err.var, ENV_KEYGEN_ATTEMPTS_MAX);

        let err = OdmConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "lots")])).unwrap_err();
        assert_eq!(err.var, ENV_BATCH_SIZE);
    }
}
