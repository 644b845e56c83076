//! An asynchronous HTTP/1.1 engine for `micro-engine`
//!
//! This crate implements the [`micro_engine::Engine`] contract on top of tokio:
//! a codec that decodes requests and encodes responses, a connection driver
//! that runs handlers against the standard request/response pair of
//! `micro-engine`, and [`server::HttpEngine`] which owns the listener.
//!
//! # Example
//!
//! ```no_run
//! use micro_engine::{handler_fn, Config, Engine, Request, Response};
//! use micro_http::server::HttpEngine;
//! use std::sync::Arc;
//! use tracing::{error, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let config = Config::builder().address("127.0.0.1:8080").build().expect("invalid config");
//!     let mut engine = HttpEngine::new(config);
//!
//!     let handler = handler_fn(|req: &mut dyn Request, res: &mut dyn Response| {
//!         Box::pin(async move {
//!             let body = format!("Hello {}!\r\n", req.url().path());
//!             let _ = res.write_all(body.as_bytes());
//!         })
//!     });
//!     engine.set_handler(Arc::new(handler)).expect("engine is already started");
//!
//!     if let Err(e) = engine.start().await {
//!         error!(cause = %e, "engine stopped with error");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: request heads, response frames, payload messages and errors
//! - [`codec`]: the HTTP/1.1 wire format
//! - [`connection`]: one client stream, from the first byte to close
//! - [`server`]: the listener, TLS, per address limits and graceful shutdown
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - request bodies are buffered before the handler runs
//! - maximum header size: 8KB
//! - maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod date;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
