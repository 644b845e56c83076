//! HTTP connection handling
//!
//! [`HttpConnection`] drives one client stream: it decodes requests with the
//! server codec, runs the handler against a standard request/response pair and
//! encodes what the handler wrote.
//!
//! - keep-alive, bounded by [`ConnectionConfig::max_requests`]
//! - `Expect: 100-continue`
//! - read and write timeouts
//! - protocol errors answered with the matching status before closing
//! - handler panics answered with `500 Internal Server Error`
//! - hijacking, which hands the raw stream over to the handler, bytes
//!   already buffered behind the request included

mod http_connection;
mod rewind;

pub use http_connection::{ConnectionConfig, HttpConnection};
pub use rewind::Rewind;
