//! Runtime configuration for drivers and the in-memory backend.
//!
//! Configuration is plain data: it is parsed and validated once, then
//! copied into the components that need it. Nothing here reads the
//! environment or the filesystem.


use crate::{
    db::codec::DEFAULT_MAX_MUTATION_BYTES,
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error as ThisError;

///
/// Constants
///

pub const DEFAULT_RECOVERY_TABLE: &str = "XA_RECOVERY";
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 16;
const MAX_TABLE_NAME_LEN: usize = 128;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("recovery table name is empty")]
    EmptyRecoveryTable,

    #[error("recovery table name '{name}' must be an ASCII identifier of at most {max} chars")]
    InvalidRecoveryTable { name: String, max: usize },

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Config, err.to_string())
    }
}

///
/// DriverConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Initial autocommit mode of new connections.
    pub autocommit: bool,

    /// Table holding prepared-transaction recovery records.
    pub recovery_table: String,

    /// Upper bound on one serialized mutation, in bytes.
    pub max_mutation_bytes: usize,

    /// Shared keep-alive period; zero disables the timer.
    pub keep_alive_interval_ms: u64,
}

impl DriverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.recovery_table)?;
        if self.max_mutation_bytes == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_mutation_bytes",
            });
        }

        Ok(())
    }

    #[must_use]
    pub const fn keep_alive_interval(&self) -> Option<Duration> {
        if self.keep_alive_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.keep_alive_interval_ms))
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            autocommit: true,
            recovery_table: DEFAULT_RECOVERY_TABLE.to_string(),
            max_mutation_bytes: DEFAULT_MAX_MUTATION_BYTES,
            keep_alive_interval_ms: 0,
        }
    }
}

///
/// BackendConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Closure invocations allowed for one logical commit before giving up.
    pub max_commit_attempts: u32,
}

impl BackendConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_commit_attempts == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_commit_attempts",
            });
        }

        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyRecoveryTable);
    }

    let valid = name.len() <= MAX_TABLE_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConfigError::InvalidRecoveryTable {
            name: name.to_string(),
            max: MAX_TABLE_NAME_LEN,
        });
    }

    Ok(())
}
