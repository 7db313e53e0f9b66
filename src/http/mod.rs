//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 connection, upgrades enabled)
//!     → dispatch.rs (log request line, route by method)
//!         CONNECT → tunnel.rs (authenticate, dial, take over, copy bytes)
//!         other   → relay.rs  (authenticate, strip headers, forward, stream back)
//!     → response.rs (diagnostics, streaming passthrough)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod relay;
pub mod response;
pub mod server;
pub mod tunnel;

pub use server::{AppState, HttpServer};
pub use tunnel::{HyperTakeover, Takeover, TunnelStats};
