//! Request dispatch.
//!
//! Every request on every connection enters [`dispatch`]. `CONNECT` goes to
//! the tunnel relay; everything else goes through the axum router to the
//! plain relay.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use hyper::body::Incoming;
use std::convert::Infallible;
use std::net::SocketAddr;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::http::server::AppState;
use crate::http::{relay, tunnel};

/// Router for non-CONNECT requests. Any method, any target.
pub fn plain_router(state: AppState) -> Router {
    Router::new()
        .fallback(relay::relay)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Route one inbound request by method.
pub async fn dispatch(
    state: AppState,
    router: Router,
    peer: SocketAddr,
    request: Request<Incoming>,
) -> Result<Response, Infallible> {
    tracing::info!(
        client = %peer,
        method = %request.method(),
        uri = %request.uri(),
        "Proxy request"
    );

    if request.method() == Method::CONNECT {
        return Ok(tunnel::handle_connect(&state, request).await);
    }

    let mut request = request.map(Body::new);
    request.extensions_mut().insert(ConnectInfo(peer));
    router.oneshot(request).await
}
