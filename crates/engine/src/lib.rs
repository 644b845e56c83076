//! The engine abstraction layer of micro http
//!
//! This crate defines the capabilities a request handling pipeline is written
//! against, without tying it to a concrete server implementation:
//!
//! - [`Header`], [`Url`], [`Request`] and [`Response`]: the request/response
//!   capabilities every transport backend implements
//! - [`Handler`] and [`HandlerFn`]: the unit of request processing, plus the
//!   adapter that lets a plain closure act as a handler
//! - [`Middleware`] and [`Chain`]: handler-to-handler transforms, composed in
//!   onion order
//! - [`Engine`]: the listen/serve lifecycle contract a server backend fulfils
//! - [`Config`]: the immutable engine configuration
//!
//! The [`standard`] module carries the adapters built on the `http` crate
//! types, which the bundled `micro-http` backend uses.
//!
//! # Example
//!
//! ```no_run
//! use micro_engine::{handler_fn, Chain, Handler, Request, Response};
//! use micro_engine::middleware::middleware_fn;
//! use std::sync::Arc;
//!
//! let hello = handler_fn(|_req: &mut dyn Request, res: &mut dyn Response| {
//!     Box::pin(async move {
//!         let _ = res.write_all(b"hello world");
//!     })
//! });
//!
//! let chain = Chain::builder()
//!     .add_last(middleware_fn(|next| next))
//!     .build();
//!
//! let handler: Arc<dyn Handler> = chain.then(hello);
//! ```

pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod handler;
pub mod header;
pub mod middleware;
pub mod multipart;
pub mod request;
pub mod response;
pub mod standard;
pub mod url;
pub mod values;

pub use config::Config;
pub use cookie::Cookie;
pub use engine::{Engine, EngineState, ShutdownHandle};
pub use error::{BoxError, EngineError, RequestError, StatusError};
pub use handler::{handler_fn, BoxHandler, Handler, HandlerFn};
pub use header::Header;
pub use middleware::{Chain, Middleware};
pub use request::Request;
pub use response::{Connection, Response};
pub use url::Url;
pub use values::Values;
