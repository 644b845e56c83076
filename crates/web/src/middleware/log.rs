//! Access logging middleware.
//!
//! [`Log`] wraps the next handler, measures how long it took, hands any error
//! the handler left on the response to an [`ErrorReporter`] and then emits one
//! INFO line per exchange:
//!
//! ```text
//! <remote-addr> <method> <path> <status> <latency> <size>
//! ```

use std::any::Any;
use std::fmt;
use std::fmt::Display;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use micro_engine::header::{X_FORWARDED_FOR, X_REAL_IP};
use micro_engine::{BoxError, BoxHandler, Handler, Middleware, Request, Response, StatusError};
use thiserror::Error;
use tracing::{error, info, warn};

/// Creates the access logging middleware with the [`DefaultErrorReporter`].
pub fn log() -> Log {
    Log::new()
}

#[derive(Clone)]
pub struct Log {
    reporter: Arc<dyn ErrorReporter>,
}

impl Log {
    pub fn new() -> Self {
        Self { reporter: Arc::new(DefaultErrorReporter) }
    }

    pub fn with_reporter<R: ErrorReporter + 'static>(reporter: R) -> Self {
        Self { reporter: Arc::new(reporter) }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log").finish_non_exhaustive()
    }
}

impl Middleware for Log {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(LogHandler { next, reporter: Arc::clone(&self.reporter) })
    }
}

struct LogHandler {
    next: BoxHandler,
    reporter: Arc<dyn ErrorReporter>,
}

#[async_trait]
impl Handler for LogHandler {
    async fn serve_http(&self, req: &mut dyn Request, res: &mut dyn Response) {
        let remote_addr = real_ip(req);

        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.next.serve_http(req, res)).catch_unwind().await;
        let latency = start.elapsed();

        if let Err(panic) = outcome {
            res.error(Box::new(PanicError::from_payload(panic)));
        }
        if let Some(e) = res.take_error() {
            self.reporter.report(e, req, res);
        }

        let method = req.method().clone();
        let path = match req.url().path() {
            "" => "/",
            path => path,
        };
        // an untouched response goes out as 200
        let status = match res.status() {
            0 => 200,
            status => status,
        };
        let size = res.size();
        let tier = StatusTier::from(status);

        info!(
            remote_addr = %remote_addr,
            method = %method,
            path,
            status,
            latency = ?latency,
            size,
            tier = %tier,
            "{remote_addr} {method} {path} {status} {latency:?} {size}"
        );
    }
}

/// The client address: `X-Real-IP`, else the first `X-Forwarded-For` entry,
/// else the transport address without its port.
pub fn real_ip(req: &dyn Request) -> String {
    let header = req.header();

    let ip = header.get(X_REAL_IP).trim();
    if !ip.is_empty() {
        return ip.to_string();
    }

    let forwarded = header.get(X_FORWARDED_FOR);
    if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    strip_port(req.remote_address())
}

fn strip_port(address: &str) -> String {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
        _ => address.to_string(),
    }
}

/// Coarse classification of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTier {
    Success,
    Redirect,
    Warning,
    Error,
}

impl From<u16> for StatusTier {
    fn from(status: u16) -> Self {
        match status {
            500..=u16::MAX => StatusTier::Error,
            400..=499 => StatusTier::Warning,
            300..=399 => StatusTier::Redirect,
            _ => StatusTier::Success,
        }
    }
}

impl Display for StatusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusTier::Success => "success",
            StatusTier::Redirect => "redirect",
            StatusTier::Warning => "warning",
            StatusTier::Error => "error",
        };
        f.write_str(name)
    }
}

/// A panic raised by a handler, turned into an error.
#[derive(Error, Debug)]
#[error("handler panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "unknown panic".to_string(),
            },
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receives the errors handlers leave on the response.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: BoxError, req: &dyn Request, res: &mut dyn Response);
}

/// Logs the error and, unless the response is already committed, answers with
/// the status of a [`StatusError`] or `500`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorReporter;

impl ErrorReporter for DefaultErrorReporter {
    fn report(&self, error: BoxError, req: &dyn Request, res: &mut dyn Response) {
        let status_error = error.downcast_ref::<StatusError>();
        let status = status_error.map(StatusError::status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(cause = %error, path = req.url().path(), status = status.as_u16(), "request failed");
        } else {
            warn!(cause = %error, path = req.url().path(), status = status.as_u16(), "request failed");
        }

        if res.committed() {
            return;
        }

        let message = match status_error {
            Some(e) => e.message().to_string(),
            None => status.canonical_reason().unwrap_or_default().to_string(),
        };
        res.write_header(status);
        if let Err(e) = res.write_all(message.as_bytes()) {
            warn!(cause = %e, "can't write error response");
        }
    }
}
