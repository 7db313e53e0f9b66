//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, port valid)
//! - Reject credentials that would lock every client out
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auth.username must not be empty")]
    EmptyUsername,

    #[error("auth.password must not be empty")]
    EmptyPassword,

    #[error("auth.realm {0:?} must be printable ASCII without double quotes")]
    InvalidRealm(String),

    #[error("listener.port must not be 0")]
    ZeroPort,

    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("timeouts.{0} must be greater than 0")]
    ZeroTimeout(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.username.is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if config.auth.password.is_empty() {
        errors.push(ValidationError::EmptyPassword);
    }
    if !is_valid_realm(&config.auth.realm) {
        errors.push(ValidationError::InvalidRealm(config.auth.realm.clone()));
    }

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// The realm ends up inside a quoted header parameter.
fn is_valid_realm(realm: &str) -> bool {
    realm.bytes().all(|b| (b' '..=b'~').contains(&b) && b != b'"')
}
