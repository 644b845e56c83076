//! Engine configuration.
//!
//! A [`Config`] is built once through [`Config::builder`] and handed to an
//! engine, which consumes it at startup.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Body size limit used when none is configured
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("either an address or a pre-bound listener is required")]
    MissingAddress,

    #[error("tls needs both cert and key file, {missing} file is missing")]
    IncompleteTls { missing: &'static str },
}

#[derive(Debug)]
pub struct Config {
    address: String,
    listener: Option<TcpListener>,
    tls_cert_file: Option<PathBuf>,
    tls_key_file: Option<PathBuf>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_conns_per_ip: usize,
    max_requests_per_conn: usize,
    max_request_body_size: u64,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Takes the pre-bound listener out; the engine calls this once at start.
    pub fn take_listener(&mut self) -> Option<TcpListener> {
        self.listener.take()
    }

    /// The cert and key files when TLS is enabled.
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Concurrent connections allowed per client ip, `0` means unlimited.
    pub fn max_conns_per_ip(&self) -> usize {
        self.max_conns_per_ip
    }

    /// Requests served on one connection before closing it, `0` means unlimited.
    pub fn max_requests_per_conn(&self) -> usize {
        self.max_requests_per_conn
    }

    pub fn max_request_body_size(&self) -> u64 {
        self.max_request_body_size
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    address: Option<String>,
    listener: Option<TcpListener>,
    tls_cert_file: Option<PathBuf>,
    tls_key_file: Option<PathBuf>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_conns_per_ip: usize,
    max_requests_per_conn: usize,
    max_request_body_size: u64,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Serves on an already bound listener instead of binding the address.
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn tls_cert_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tls_cert_file = Some(path.into());
        self
    }

    pub fn tls_key_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tls_key_file = Some(path.into());
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn max_conns_per_ip(mut self, max: usize) -> Self {
        self.max_conns_per_ip = max;
        self
    }

    pub fn max_requests_per_conn(mut self, max: usize) -> Self {
        self.max_requests_per_conn = max;
        self
    }

    pub fn max_request_body_size(mut self, max: u64) -> Self {
        self.max_request_body_size = max;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let address = match (self.address, &self.listener) {
            (Some(address), _) => address,
            (None, Some(listener)) => listener.local_addr().map(|addr| addr.to_string()).unwrap_or_default(),
            (None, None) => return Err(ConfigError::MissingAddress),
        };

        match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(_), None) => return Err(ConfigError::IncompleteTls { missing: "key" }),
            (None, Some(_)) => return Err(ConfigError::IncompleteTls { missing: "cert" }),
            _ => {}
        }

        let max_request_body_size = match self.max_request_body_size {
            0 => DEFAULT_MAX_REQUEST_BODY_SIZE,
            max => max,
        };

        Ok(Config {
            address,
            listener: self.listener,
            tls_cert_file: self.tls_cert_file,
            tls_key_file: self.tls_key_file,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_conns_per_ip: self.max_conns_per_ip,
            max_requests_per_conn: self.max_requests_per_conn,
            max_request_body_size,
        })
    }
}
