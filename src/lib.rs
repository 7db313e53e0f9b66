//! Single-tenant authenticating forward proxy.
//!
//! Plain HTTP requests are relayed to the origin named in their absolute URI;
//! `CONNECT` requests become opaque TCP tunnels. Every request must carry the
//! configured Basic credentials in `Proxy-Authorization`.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{Authenticator, ProxyIdentity};
