use std::error::Error;
use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineState;

/// The error type crossing the handler boundary
pub type BoxError = Box<dyn Error + Send + Sync>;

/// An error that knows which HTTP status it should be answered with.
///
/// Handlers report it through [`Response::error`](crate::Response::error); error
/// reporters answer with [`StatusError::status`] instead of a plain 500.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct StatusError {
    status: StatusCode,
    message: String,
}

impl StatusError {
    pub fn new<S: ToString>(status: StatusCode, message: S) -> Self {
        Self { status, message: message.to_string() }
    }

    pub fn bad_request<S: ToString>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<S: ToString>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request content type is not multipart/form-data")]
    NotMultipart,

    #[error("invalid multipart body: {reason}")]
    InvalidMultipart { reason: String },

    #[error("no file uploaded for form field {name}")]
    MissingFile { name: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl RequestError {
    pub fn invalid_multipart<S: ToString>(str: S) -> Self {
        Self::InvalidMultipart { reason: str.to_string() }
    }

    pub fn missing_file<S: ToString>(name: S) -> Self {
        Self::MissingFile { name: name.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bind {address} error: {source}")]
    Bind { address: String, source: io::Error },

    #[error("accept connection error: {source}")]
    Accept { source: io::Error },

    #[error("tls error: {reason}")]
    Tls { reason: String },

    #[error("invalid config: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("handler must be set before start")]
    MissingHandler,

    #[error("can't {operation} when engine is {state}")]
    InvalidState { operation: &'static str, state: EngineState },
}

impl EngineError {
    pub fn tls<S: ToString>(str: S) -> Self {
        Self::Tls { reason: str.to_string() }
    }

    pub fn invalid_state(operation: &'static str, state: EngineState) -> Self {
        Self::InvalidState { operation, state }
    }
}
