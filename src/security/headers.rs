//! Header hygiene for forwarded requests.
//!
//! # Responsibilities
//! - Strip the headers that only mean something between client and proxy
//!
//! # Design Decisions
//! - Only `Proxy-Authorization` and `Proxy-Connection` are removed; every
//!   other header is forwarded untouched, including repeated values
//! - Removal happens in place so value order of the remaining headers is kept

use axum::http::{header, HeaderMap, HeaderName};

/// `Proxy-Connection` is non-standard and has no constant in `http`.
pub static PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Remove proxy-only headers (all of their values) from `headers`.
pub fn strip_proxy_headers(headers: &mut HeaderMap) {
    headers.remove(header::PROXY_AUTHORIZATION);
    headers.remove(&PROXY_CONNECTION);
}
