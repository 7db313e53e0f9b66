//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared, read-only request state
//! - Accept connections from the bounded listener
//! - Serve each connection with hyper's HTTP/1.1 server (upgrades enabled)
//! - Hand every request to the dispatcher
//! - Stop accepting on shutdown and drain in-flight connections

use axum::body::Body;
use axum::Router;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::config::ProxyConfig;
use crate::http::dispatch;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::security::Authenticator;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every request. Nothing in it is mutated per request.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    /// Outbound client for plain relays. Idle connections are never kept.
    pub client: Client<HttpConnector, Body>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown: Shutdown,
    /// Accepted client connections.
    pub tracker: ConnectionTracker,
    /// Established CONNECT sessions.
    pub tunnels: ConnectionTracker,
}

impl AppState {
    pub fn new(config: &ProxyConfig, shutdown: Shutdown) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.connect()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .http1_title_case_headers(true)
            .build(connector);

        Self {
            authenticator: Arc::new(Authenticator::from_config(&config.auth)),
            client,
            connect_timeout: config.timeouts.connect(),
            request_timeout: config.timeouts.request(),
            shutdown,
            tracker: ConnectionTracker::new(),
            tunnels: ConnectionTracker::with_gauge(metrics::set_active_tunnels),
        }
    }
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    state: AppState,
    router: Router,
    shutdown_grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig, shutdown: Shutdown) -> Self {
        let state = AppState::new(&config, shutdown);
        let router = dispatch::plain_router(state.clone());
        Self {
            state,
            router,
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown signal fires.
    ///
    /// After the signal, connections and tunnels get `shutdown_grace` to
    /// finish. Connection tasks still running after that are aborted, which
    /// drops their in-flight relays and the origin connections behind them.
    pub async fn run(self, listener: Listener) -> Result<(), ListenerError> {
        let addr = listener
            .local_addr()
            .map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let mut connections = JoinSet::new();
        let mut stop = self.state.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        self.spawn_connection(&mut connections, stream, peer, permit)
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                }
                _ = stop.recv() => {
                    tracing::info!("HTTP server no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let deadline = Instant::now() + self.shutdown_grace;
        let state = &self.state;
        let drained = state.tracker.wait_for_drain(self.shutdown_grace).await
            && state
                .tunnels
                .wait_for_drain(deadline.saturating_duration_since(Instant::now()))
                .await;
        if !drained {
            tracing::warn!(
                connections = state.tracker.active_count(),
                tunnels = state.tunnels.active_count(),
                "Shutdown grace period elapsed, aborting remaining connections"
            );
        }
        connections.shutdown().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        permit: ConnectionPermit,
    ) {
        let guard = self.state.tracker.track();
        let state = self.state.clone();
        let router = self.router.clone();
        let mut stop = self.state.shutdown.subscribe();

        connections.spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();

            let service = service_fn(move |request| {
                dispatch::dispatch(state.clone(), router.clone(), peer, request)
            });

            let conn = http1::Builder::new()
                .preserve_header_case(true)
                .title_case_headers(true)
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = stop.recv() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(e) = result {
                tracing::debug!(
                    connection_id = %connection_id,
                    peer_addr = %peer,
                    error = %e,
                    "Connection ended with error"
                );
            }
            drop(guard);
        });
    }
}
