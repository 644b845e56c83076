//! The TCP/TLS engine.
//!
//! [`HttpEngine`] implements [`micro_engine::Engine`]: it binds the configured
//! address (or adopts a pre-bound listener), optionally terminates TLS, and
//! serves each accepted stream with an [`HttpConnection`](crate::connection::HttpConnection).

mod engine;
mod limit;
mod tls;

pub use engine::HttpEngine;
pub use limit::{ConnLimiter, ConnPermit};
pub use tls::load_acceptor;
