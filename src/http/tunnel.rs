//! CONNECT tunnel relay.
//!
//! # Responsibilities
//! - Authenticate while the connection still speaks HTTP
//! - Dial the requested `host:port`
//! - Take over the client connection once `200` has been sent
//! - Copy bytes both ways until either side is done
//!
//! # Data Flow
//! ```text
//! Client ←──── opaque bytes ────→ Proxy ←──── opaque bytes ────→ Target
//! ```
//!
//! # Design Decisions
//! - Taking over the raw connection is a capability ([`Takeover`]) so the
//!   relay logic does not depend on hyper
//! - One spawned task per session copies client → target; the session task
//!   copies target → client. When either finishes, the other is aborted and
//!   both streams are shut down and dropped
//! - No timeout once established; only EOF, errors or shutdown end a session

use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::error::ProxyError;
use crate::http::response;
use crate::http::server::AppState;
use crate::net::ConnectionGuard;
use crate::observability::metrics;

const COPY_BUFFER_SIZE: usize = 16 * 1024;

type ConnectRequest = axum::http::Request<Incoming>;

/// The ability to detach the raw byte stream beneath an HTTP connection.
pub trait Takeover: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Resolve to the client's duplex stream. Only called after the
    /// `200` response has been handed to the transport.
    fn take_over(self) -> impl Future<Output = io::Result<Self::Io>> + Send;
}

/// [`Takeover`] backed by hyper's upgrade mechanism.
pub struct HyperTakeover(OnUpgrade);

impl Takeover for HyperTakeover {
    type Io = TokioIo<hyper::upgrade::Upgraded>;

    fn take_over(self) -> impl Future<Output = io::Result<Self::Io>> + Send {
        async move { self.0.await.map(TokioIo::new).map_err(io::Error::other) }
    }
}

/// Handle a `CONNECT` request arriving on a hyper connection.
pub async fn handle_connect(state: &AppState, mut request: ConnectRequest) -> Response {
    let start = Instant::now();
    // Present only when the connection was served with upgrades enabled.
    let takeover = request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .map(HyperTakeover);

    let response = match open(state, request.uri(), request.headers(), takeover).await {
        Ok(response) => response,
        Err(err @ ProxyError::AuthRequired { .. }) => err.into_response(),
        Err(err) => {
            tracing::warn!(uri = %request.uri(), error = %err, "Tunnel failed");
            err.into_response()
        }
    };

    metrics::record_request("connect", response.status().as_u16(), start);
    response
}

/// Authenticate, dial and, on success, start the tunnel session.
///
/// The returned response is what the client sees before the takeover: `200`
/// on success, otherwise the error's status.
pub async fn open<T: Takeover>(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    takeover: Option<T>,
) -> Result<Response, ProxyError> {
    state.authenticator.verify(headers)?;

    let target = connect_target(uri)?;
    let upstream = dial(&target, state.connect_timeout).await?;

    let Some(takeover) = takeover else {
        drop(upstream);
        return Err(ProxyError::TransportUnsupported);
    };

    let session = TunnelSession {
        target,
        shutdown: state.shutdown.subscribe(),
        guard: state.tunnels.track(),
    };
    tokio::spawn(session.run(takeover, upstream));

    Ok(response::connection_established())
}

/// `host:port` from an authority-form target.
fn connect_target(uri: &Uri) -> Result<String, ProxyError> {
    let Some(authority) = uri.authority() else {
        return Err(ProxyError::TunnelDial {
            target: uri.to_string(),
            reason: "missing host".to_string(),
        });
    };
    if authority.port_u16().is_none() {
        return Err(ProxyError::TunnelDial {
            target: authority.to_string(),
            reason: "missing port".to_string(),
        });
    }
    Ok(authority.as_str().to_string())
}

async fn dial(target: &str, timeout: Duration) -> Result<TcpStream, ProxyError> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(ProxyError::TunnelDial {
            target: target.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(ProxyError::TunnelDial {
            target: target.to_string(),
            reason: format!("connect timed out after {:?}", timeout),
        }),
    }
}

/// One established CONNECT session.
struct TunnelSession {
    target: String,
    shutdown: broadcast::Receiver<()>,
    guard: ConnectionGuard,
}

impl TunnelSession {
    async fn run<T: Takeover>(mut self, takeover: T, upstream: TcpStream) {
        let client = tokio::select! {
            taken = takeover.take_over() => match taken {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(upstream = %self.target, error = %e, "Connection takeover failed");
                    return;
                }
            },
            _ = stopped(&mut self.shutdown) => return,
        };

        tracing::debug!(
            connection_id = %self.guard.id(),
            upstream = %self.target,
            "Tunnel established"
        );

        let stats = pipe(client, upstream, self.shutdown).await;

        metrics::tunnel_closed(stats.to_target, stats.to_client);
        tracing::debug!(
            connection_id = %self.guard.id(),
            upstream = %self.target,
            to_target = stats.to_target,
            to_client = stats.to_client,
            "Tunnel closed"
        );
    }
}

/// Bytes moved by a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub to_target: u64,
    pub to_client: u64,
}

/// Copy bytes between `client` and `target` until either side finishes,
/// then close both.
///
/// Returns once every copy has stopped and both streams have been dropped.
pub async fn pipe<C, U>(client: C, target: U, mut shutdown: broadcast::Receiver<()>) -> TunnelStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut target_rd, mut target_wr) = tokio::io::split(target);

    let to_target = Arc::new(AtomicU64::new(0));
    let to_client = AtomicU64::new(0);

    let counter = Arc::clone(&to_target);
    let mut upstream = tokio::spawn(async move {
        let result = copy_counted(&mut client_rd, &mut target_wr, &counter).await;
        let _ = target_wr.shutdown().await;
        result
    });

    let mut upstream_joined = false;
    tokio::select! {
        joined = &mut upstream => {
            upstream_joined = true;
            match joined {
                Ok(result) => log_copy_end("client", result),
                Err(e) => tracing::warn!(error = %e, "Tunnel copy task failed"),
            }
        }
        result = copy_counted(&mut target_rd, &mut client_wr, &to_client) => {
            log_copy_end("target", result);
        }
        _ = stopped(&mut shutdown) => {
            tracing::debug!("Tunnel closed by shutdown");
        }
    }

    if !upstream_joined {
        upstream.abort();
        let _ = upstream.await;
    }
    let _ = client_wr.shutdown().await;
    drop((client_wr, target_rd));

    TunnelStats {
        to_target: to_target.load(Ordering::Relaxed),
        to_client: to_client.load(Ordering::Relaxed),
    }
}

// Counts as it goes so a direction that gets aborted still reports what it
// moved. Each chunk is flushed before the next read can block.
async fn copy_counted<R, W>(reader: &mut R, writer: &mut W, counter: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

fn log_copy_end(source: &'static str, result: io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(source, "Tunnel side closed"),
        Err(e) => {
            metrics::record_stream_error("tunnel");
            tracing::debug!(source, error = %ProxyError::from(e), "Tunnel side failed");
        }
    }
}

/// Resolves on a shutdown signal. A dropped coordinator never fires.
async fn stopped(rx: &mut broadcast::Receiver<()>) {
    if let Err(broadcast::error::RecvError::Closed) = rx.recv().await {
        std::future::pending::<()>().await;
    }
}
