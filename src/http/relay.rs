//! Plain HTTP relay.
//!
//! # Responsibilities
//! - Authenticate before touching the network
//! - Strip proxy-only headers and rebuild the request for the origin
//! - Stream the request body up and the response body down
//!
//! # Design Decisions
//! - One attempt per request; failures become 502, never retries
//! - Bodies are never buffered, so size is unbounded
//! - The outbound client keeps no idle connections

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::uri::Scheme;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::Instant;

use crate::error::ProxyError;
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::strip_proxy_headers;

/// Axum handler for every non-CONNECT request.
pub async fn relay(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = match forward(&state, request).await {
        Ok(response) => response,
        Err(err @ ProxyError::AuthRequired { .. }) => err.into_response(),
        Err(err) => {
            tracing::warn!(
                client = %peer,
                method = %method,
                uri = %uri,
                error = %err,
                "Relay failed"
            );
            err.into_response()
        }
    };

    metrics::record_request("http", response.status().as_u16(), start);
    response
}

/// Forward `request` to the origin named in its absolute URI.
///
/// Returns the origin's response with status, headers and a streaming body
/// passed through unchanged.
pub async fn forward(state: &AppState, request: Request<Body>) -> Result<Response, ProxyError> {
    state.authenticator.verify(request.headers())?;

    let (parts, body) = request.into_parts();
    let target = parts.uri.to_string();
    if parts.uri.scheme() != Some(&Scheme::HTTP) || parts.uri.authority().is_none() {
        return Err(ProxyError::RequestConstruction(format!(
            "target {target:?} is not an absolute http URI"
        )));
    }

    let mut headers = parts.headers;
    strip_proxy_headers(&mut headers);

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(parts.uri)
        .body(body)
        .map_err(|e| ProxyError::RequestConstruction(e.to_string()))?;
    *outbound.headers_mut() = headers;

    let upstream = match tokio::time::timeout(state.request_timeout, state.client.request(outbound)).await {
        Ok(Ok(upstream)) => upstream,
        Ok(Err(e)) => {
            return Err(ProxyError::UpstreamUnreachable {
                target,
                reason: format!("{e:?}"),
            })
        }
        Err(_) => {
            return Err(ProxyError::UpstreamUnreachable {
                target,
                reason: format!("no response within {:?}", state.request_timeout),
            })
        }
    };

    tracing::debug!(
        upstream = %target,
        status = %upstream.status(),
        "Upstream responded"
    );
    Ok(response::stream_upstream(upstream, target))
}
