//! Shared utilities for integration testing.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use forward_proxy::config::ProxyConfig;
use forward_proxy::http::HttpServer;
use forward_proxy::lifecycle::Shutdown;
use forward_proxy::net::{Listener, ListenerError};

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "s3cret-pass";
pub const LARGE_BODY_LEN: usize = 1024 * 1024;

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

impl TestProxy {
    /// Trigger shutdown and wait for the server loop to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked");
        assert!(result.is_ok(), "server returned an error: {result:?}");
    }
}

/// Proxy config using the test credentials and short timeouts.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.auth.username = USERNAME.to_string();
    config.auth.password = PASSWORD.to_string();
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

/// Start the proxy with `config`, ignoring its listener address.
pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, shutdown.clone());
    let handle = tokio::spawn(server.run(listener));

    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// `Proxy-Authorization` value for the given pair.
pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// reqwest client that sends plain HTTP through `proxy` with the given credentials.
pub fn client_via(proxy: SocketAddr, credentials: Option<(&str, &str)>) -> reqwest::Client {
    let mut proxy = reqwest::Proxy::http(format!("http://{proxy}")).unwrap();
    if let Some((username, password)) = credentials {
        proxy = proxy.basic_auth(username, password);
    }
    reqwest::Client::builder()
        .proxy(proxy)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// reqwest client authenticated with the test credentials.
pub fn authed_client(proxy: SocketAddr) -> reqwest::Client {
    client_via(proxy, Some((USERNAME, PASSWORD)))
}

/// Origin that echoes what it received.
///
/// The body lists `method`, `path`, `body-length` and then every request
/// header as `name: value`, one per line. `/large` answers with
/// [`LARGE_BODY_LEN`] bytes instead. Returns the address and a hit counter.
pub async fn start_echo_origin() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));

    let echo_hits = Arc::clone(&hits);
    let large_hits = Arc::clone(&hits);
    let app = Router::new()
        .route(
            "/large",
            get(move || {
                large_hits.fetch_add(1, Ordering::SeqCst);
                async { vec![b'x'; LARGE_BODY_LEN] }
            }),
        )
        .fallback(move |request: Request<Body>| {
            echo_hits.fetch_add(1, Ordering::SeqCst);
            echo(request)
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hits)
}

async fn echo(request: Request<Body>) -> impl IntoResponse {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut report = format!(
        "method: {}\npath: {}\nbody-length: {}\n",
        parts.method,
        parts.uri.path(),
        body.len()
    );
    for (name, value) in parts.headers.iter() {
        report.push_str(&format!(
            "{}: {}\n",
            name,
            value.to_str().unwrap_or("<binary>")
        ));
    }

    let status = if parts.method == Method::POST {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut headers = HeaderMap::new();
    headers.insert("x-origin", "echo".parse().unwrap());
    headers.append("x-multi", "a".parse().unwrap());
    headers.append("x-multi", "b".parse().unwrap());
    (status, headers, report)
}

/// Raw TCP server that echoes every byte back until the peer closes.
pub async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
                let _ = wr.shutdown().await;
            });
        }
    });
    addr
}

/// Raw TCP server that writes `greeting` to each connection and closes it.
pub async fn start_tcp_greeter(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(greeting).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Origin that sends a chunked `200` with one `hello` chunk and then stalls.
///
/// The receiver fires once the proxy closes the origin connection.
pub async fn start_stalling_origin() -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n")
            .await
            .unwrap();
        // Nothing more is sent; wait for the proxy to hang up.
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });
    (addr, closed_rx)
}

/// An address on which nothing is listening.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Send a raw `CONNECT` and read the response head.
///
/// Reads one byte at a time so no tunnelled bytes are consumed with the head.
pub async fn connect_via(
    proxy: SocketAddr,
    target: &str,
    authorization: Option<&str>,
) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(value) = authorization {
        request.push_str(&format!("Proxy-Authorization: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }
    (stream, String::from_utf8_lossy(&head).to_string())
}

/// Status code from a raw response head.
pub fn status_of(head: &str) -> u16 {
    head.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}
