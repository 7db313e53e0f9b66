//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::ValidationError;

/// Environment variable overriding `auth.username`.
pub const ENV_USERNAME: &str = "PROXY_USERNAME";
/// Environment variable overriding `auth.password`.
pub const ENV_PASSWORD: &str = "PROXY_PASSWORD";
/// Environment variable overriding `listener.port`.
pub const ENV_PORT: &str = "PROXY_PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply `PROXY_*` overrides from the process environment.
pub fn apply_env(config: &mut ProxyConfig) -> Result<(), ConfigError> {
    apply_env_from(config, |var| std::env::var(var).ok())
}

/// Apply `PROXY_*` overrides using `lookup` to read variables.
///
/// Unset and empty variables leave the current value in place.
pub fn apply_env_from<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|value| !value.is_empty());

    if let Some(username) = get(ENV_USERNAME) {
        config.auth.username = username;
    }
    if let Some(password) = get(ENV_PASSWORD) {
        config.auth.password = password;
    }
    if let Some(port) = get(ENV_PORT) {
        config.listener.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: ENV_PORT, value: port })?;
    }
    Ok(())
}
