//! Response construction helpers.
//!
//! # Responsibilities
//! - Build the short plain-text diagnostics the proxy produces itself
//! - Build the empty `200` that confirms an established tunnel
//! - Wrap upstream responses so body failures are logged, not escalated
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Upstream status and headers are passed through untouched

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::observability::metrics;

/// A `text/plain` response with a one-line diagnostic body.
pub fn plain_text(status: StatusCode, message: &'static str) -> Response {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// The `200` sent once a CONNECT target has been dialed.
pub fn connection_established() -> Response {
    Response::new(Body::empty())
}

/// Hand an upstream response back to the client without buffering it.
///
/// Errors while the body streams are logged against `target`; the client
/// sees a truncated body.
pub fn stream_upstream(upstream: Response<Incoming>, target: String) -> Response {
    let (parts, body) = upstream.into_parts();
    let body = body.map_err(move |err| {
        tracing::warn!(upstream = %target, error = %err, "Upstream body interrupted");
        metrics::record_stream_error("http");
        err
    });
    Response::from_parts(parts, Body::new(body))
}
