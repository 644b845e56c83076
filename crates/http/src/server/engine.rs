use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use micro_engine::engine::Lifecycle;
use micro_engine::{BoxHandler, Config, Engine, EngineError, EngineState, ShutdownHandle};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::select;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Dispatch};

use crate::connection::{ConnectionConfig, HttpConnection};
use crate::date::DateService;
use crate::server::limit::{ConnLimiter, ConnPermit};
use crate::server::tls::load_acceptor;

/// An [`Engine`] serving HTTP/1.1 over TCP, with optional TLS.
///
/// ```no_run
/// use micro_engine::{handler_fn, Config, Engine, Request, Response};
/// use micro_http::server::HttpEngine;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), micro_engine::EngineError> {
/// let config = Config::builder().address("127.0.0.1:8080").build()?;
/// let mut engine = HttpEngine::new(config);
/// engine.set_handler(Arc::new(handler_fn(|_req: &mut dyn Request, res: &mut dyn Response| {
///     Box::pin(async move {
///         let _ = res.write_all(b"hello");
///     })
/// })))?;
///
/// let shutdown = engine.shutdown_handle();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.shutdown();
/// });
/// engine.start().await
/// # }
/// ```
pub struct HttpEngine {
    config: Config,
    handler: Option<BoxHandler>,
    logger: Option<Dispatch>,
    lifecycle: Lifecycle,
    shutdown: ShutdownHandle,
}

#[derive(Clone)]
struct ConnectionContext {
    handler: BoxHandler,
    config: ConnectionConfig,
    date_service: Arc<DateService>,
    shutdown: CancellationToken,
}

impl fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEngine")
            .field("config", &self.config)
            .field("has_handler", &self.handler.is_some())
            .field("logger", &self.logger)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("config", &self.config)
            .field("date_service", &self.date_service)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl HttpEngine {
    pub fn new(config: Config) -> Self {
        Self { config, handler: None, logger: None, lifecycle: Lifecycle::new(), shutdown: ShutdownHandle::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn bind(&mut self) -> Result<TcpListener, EngineError> {
        let address = self.config.address().to_string();

        match self.config.take_listener() {
            Some(listener) => {
                listener.set_nonblocking(true).map_err(|source| EngineError::Bind { address: address.clone(), source })?;
                TcpListener::from_std(listener).map_err(|source| EngineError::Bind { address, source })
            }
            None => TcpListener::bind(&address).await.map_err(|source| EngineError::Bind { address, source }),
        }
    }

    async fn serve(&mut self, handler: BoxHandler) -> Result<(), EngineError> {
        let acceptor = match self.config.tls_files() {
            Some((cert_file, key_file)) => Some(load_acceptor(cert_file, key_file)?),
            None => None,
        };
        let listener = self.bind().await?;
        info!(address = %self.config.address(), tls = acceptor.is_some(), "start listening");

        let context = ConnectionContext {
            handler,
            config: ConnectionConfig::from(&self.config),
            date_service: Arc::new(DateService::new()),
            shutdown: self.shutdown.child_token(),
        };
        let limiter = ConnLimiter::new(self.config.max_conns_per_ip());
        let tracker = TaskTracker::new();
        let shutdown = self.shutdown.clone();

        let result = loop {
            let accepted = select! {
                biased;
                _ = shutdown.wait() => None,
                accepted = listener.accept() => Some(accepted),
            };

            let (stream, remote_addr) = match accepted {
                None => break Ok(()),
                Some(Ok(stream_and_addr)) => stream_and_addr,
                Some(Err(e)) if is_transient(&e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
                Some(Err(e)) => {
                    error!(cause = %e, "accept loop stopped");
                    break Err(EngineError::Accept { source: e });
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(cause = %e, "can't set nodelay");
            }

            let permit = limiter.acquire(remote_addr.ip());
            let acceptor = acceptor.clone();
            let context = context.clone();

            tracker.spawn(
                async move {
                    match acceptor {
                        Some(acceptor) => match accept_tls(&acceptor, stream, &context.config).await {
                            Ok(stream) => serve_connection(stream, remote_addr, true, context, permit).await,
                            Err(e) => warn!(cause = %e, %remote_addr, "tls handshake failed"),
                        },
                        None => serve_connection(stream, remote_addr, false, context, permit).await,
                    }
                }
                .with_current_subscriber(),
            );
        };

        shutdown.shutdown();
        tracker.close();
        info!(connections = tracker.len(), "stop accepting, waiting for open connections");
        tracker.wait().await;
        info!("engine stopped");

        result
    }
}

#[async_trait]
impl Engine for HttpEngine {
    fn set_handler(&mut self, handler: BoxHandler) -> Result<(), EngineError> {
        self.lifecycle.handler_bound()?;
        self.handler = Some(handler);
        Ok(())
    }

    fn set_logger(&mut self, logger: Dispatch) -> Result<(), EngineError> {
        self.lifecycle.ensure_configurable("set logger")?;
        self.logger = Some(logger);
        Ok(())
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        self.lifecycle.listen()?;
        let handler = self.handler.clone().ok_or(EngineError::MissingHandler)?;

        let result = match self.logger.clone() {
            Some(logger) => self.serve(handler).with_subscriber(logger).await,
            None => self.serve(handler).await,
        };
        self.lifecycle.stop();

        result
    }
}

async fn accept_tls<S>(
    acceptor: &TlsAcceptor,
    stream: S,
    config: &ConnectionConfig,
) -> io::Result<tokio_rustls::server::TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handshake = acceptor.accept(stream);
    match config.read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timeout"))?,
        None => handshake.await,
    }
}

async fn serve_connection<S>(
    stream: S,
    remote_addr: SocketAddr,
    tls: bool,
    context: ConnectionContext,
    permit: Option<ConnPermit>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let connection = HttpConnection::new(stream, context.config)
        .remote_addr(remote_addr)
        .tls(tls)
        .shutdown(context.shutdown)
        .date_service(context.date_service);

    let Some(_permit) = permit else {
        warn!(%remote_addr, "too many connections from this address, reject");
        if let Err(e) = connection.reject(StatusCode::TOO_MANY_REQUESTS).await {
            debug!(cause = %e, %remote_addr, "can't send reject response");
        }
        return;
    };

    match connection.process(context.handler).await {
        Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
        Err(e) => warn!(cause = %e, %remote_addr, "service has error, connection shutdown"),
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_engine::{handler_fn, Request, Response};

    fn handler() -> BoxHandler {
        Arc::new(handler_fn(|_req: &mut dyn Request, res: &mut dyn Response| {
            Box::pin(async move {
                res.write_all(b"ok").unwrap();
            })
        }))
    }

    fn config() -> Config {
        Config::builder().address("127.0.0.1:0").build().unwrap()
    }

    #[tokio::test]
    async fn start_without_handler() {
        let mut engine = HttpEngine::new(config());
        assert!(matches!(engine.start().await, Err(EngineError::MissingHandler)));
        assert_eq!(engine.state(), EngineState::Unconfigured);
    }

    #[tokio::test]
    async fn stop_when_shutdown_before_start() {
        let mut engine = HttpEngine::new(config());
        engine.set_handler(handler()).unwrap();
        engine.shutdown_handle().shutdown();

        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(matches!(
            engine.set_handler(handler()),
            Err(EngineError::InvalidState { operation: "set handler", state: EngineState::Stopped })
        ));
        assert!(matches!(
            engine.start().await,
            Err(EngineError::InvalidState { operation: "start", state: EngineState::Stopped })
        ));
    }

    #[tokio::test]
    async fn bind_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let mut engine = HttpEngine::new(Config::builder().address(address.clone()).build().unwrap());
        engine.set_handler(handler()).unwrap();

        match engine.start().await {
            Err(EngineError::Bind { address: failed, .. }) => assert_eq!(failed, address),
            other => panic!("expect bind error, got {other:?}"),
        }
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn missing_tls_files() {
        let config = Config::builder()
            .address("127.0.0.1:0")
            .tls_cert_file("/no/such/cert.pem")
            .tls_key_file("/no/such/key.pem")
            .build()
            .unwrap();
        let mut engine = HttpEngine::new(config);
        engine.set_handler(handler()).unwrap();

        assert!(matches!(engine.start().await, Err(EngineError::Tls { .. })));
    }

    #[test]
    fn transient_accept_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn debug_hides_handler() {
        let mut engine = HttpEngine::new(config());
        assert!(format!("{engine:?}").contains("has_handler: false"));

        engine.set_handler(handler()).unwrap();
        let debug = format!("{engine:?}");
        assert!(debug.starts_with("HttpEngine {"));
        assert!(debug.contains("has_handler: true"));
        assert!(debug.contains("state: Configured"));
    }
}
