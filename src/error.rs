//! Error types for request relaying.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response;

/// Everything that can end a proxied request early.
///
/// The `Display` text is for logs. Clients only ever see the fixed
/// diagnostic from [`ProxyError::client_message`].
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Any credential problem. Deliberately carries no reason.
    #[error("proxy authentication required")]
    AuthRequired { challenge: HeaderValue },

    #[error("upstream request to {target} failed: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    #[error("tunnel dial to {target} failed: {reason}")]
    TunnelDial { target: String, reason: String },

    #[error("connection does not support takeover")]
    TransportUnsupported,

    #[error("cannot build outbound request: {0}")]
    RequestConstruction(String),

    /// Mid-flight I/O failure; logged, never turned into a status.
    #[error("stream copy failed: {0}")]
    StreamCopy(#[from] std::io::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::AuthRequired { .. } => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            ProxyError::UpstreamUnreachable { .. } | ProxyError::TunnelDial { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::TransportUnsupported
            | ProxyError::RequestConstruction(_)
            | ProxyError::StreamCopy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            ProxyError::AuthRequired { .. } => "Proxy Authentication Required",
            ProxyError::UpstreamUnreachable { .. } => "Error making proxy request",
            ProxyError::TunnelDial { .. } => "Error connecting to destination",
            ProxyError::TransportUnsupported => "Hijacking not supported",
            ProxyError::RequestConstruction(_) => "Error creating proxy request",
            ProxyError::StreamCopy(_) => "Stream interrupted",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = response::plain_text(self.status(), self.client_message());
        if let ProxyError::AuthRequired { challenge } = self {
            response
                .headers_mut()
                .insert(axum::http::header::PROXY_AUTHENTICATE, challenge);
        }
        response
    }
}
