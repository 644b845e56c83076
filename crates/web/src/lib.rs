//! Middleware and template rendering on top of `micro-engine`.
//!
//! - [`middleware::log`]: access logging with centralised error reporting
//! - [`render`]: the [`render::Driver`] abstraction, a name keyed
//!   [`render::DriverRegistry`] and the minijinja backed `jinja` driver
//!
//! ```no_run
//! use micro_engine::{handler_fn, Chain, Config, Engine, Request, Response};
//! use micro_http::server::HttpEngine;
//! use micro_web::middleware::log;
//!
//! # async fn run() -> Result<(), micro_engine::EngineError> {
//! let chain = Chain::builder().add_last(log()).build();
//! let handler = chain.then(handler_fn(|_req: &mut dyn Request, res: &mut dyn Response| {
//!     Box::pin(async move {
//!         let _ = res.write_all(b"hello world");
//!     })
//! }));
//!
//! let mut engine = HttpEngine::new(Config::builder().address("127.0.0.1:8080").build()?);
//! engine.set_handler(handler)?;
//! engine.start().await
//! # }
//! ```

pub mod middleware;
pub mod render;
