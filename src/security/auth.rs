//! Proxy credential checking.
//!
//! Clients present `Proxy-Authorization: Basic base64(user:pass)`; the pair
//! must match the configured [`ProxyIdentity`] exactly. Every way a credential
//! can be wrong produces the same `false`, so callers cannot tell a missing
//! header from a bad password.

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::error::ProxyError;
use crate::observability::metrics;

const BASIC_PREFIX: &[u8] = b"Basic ";

/// The single username/password pair accepted by this proxy.
///
/// Built once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    username: String,
    password: String,
}

impl ProxyIdentity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password with every character replaced by `*`, for startup logs.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }

    /// Byte-for-byte comparison of both fields.
    ///
    /// Both fields are always compared so the time taken does not reveal
    /// which one differed.
    fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        let user_ok = constant_time_eq(username, self.username.as_bytes());
        let pass_ok = constant_time_eq(password, self.password.as_bytes());
        user_ok & pass_ok
    }
}

impl std::fmt::Debug for ProxyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyIdentity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Validates `Proxy-Authorization` headers and builds the matching challenge.
#[derive(Debug, Clone)]
pub struct Authenticator {
    identity: ProxyIdentity,
    challenge: HeaderValue,
}

impl Authenticator {
    pub fn new(identity: ProxyIdentity, realm: &str) -> Self {
        let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm))
            .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"Proxy Server\""));
        Self { identity, challenge }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            ProxyIdentity::new(config.username.as_str(), config.password.as_str()),
            &config.realm,
        )
    }

    pub fn identity(&self) -> &ProxyIdentity {
        &self.identity
    }

    /// Value of the `Proxy-Authenticate` header sent with 407 responses.
    pub fn challenge(&self) -> &HeaderValue {
        &self.challenge
    }

    /// Check a raw `Proxy-Authorization` value.
    pub fn authenticate(&self, value: Option<&HeaderValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        let Some(encoded) = value.as_bytes().strip_prefix(BASIC_PREFIX) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded) else {
            return false;
        };
        // Split on the first separator only; passwords may contain ':'.
        let Some(sep) = decoded.iter().position(|&b| b == b':') else {
            return false;
        };
        self.identity.matches(&decoded[..sep], &decoded[sep + 1..])
    }

    /// Gate a request, producing the 407 error on any credential failure.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        if self.authenticate(headers.get(header::PROXY_AUTHORIZATION)) {
            return Ok(());
        }
        tracing::debug!("Proxy credentials rejected");
        metrics::record_auth_failure();
        Err(ProxyError::AuthRequired {
            challenge: self.challenge.clone(),
        })
    }
}
