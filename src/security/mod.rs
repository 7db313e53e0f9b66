//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (Proxy-Authorization against the configured identity)
//!     → headers.rs (strip proxy-only headers before forwarding)
//!     → Pass to relay
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any credential problem
//! - No trust in client input
//! - Rejections are indistinguishable from one another

pub mod auth;
pub mod headers;

pub use auth::{Authenticator, ProxyIdentity};
pub use headers::strip_proxy_headers;
