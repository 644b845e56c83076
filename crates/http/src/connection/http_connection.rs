use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{FutureExt, SinkExt, StreamExt};
use http::header::{CONNECTION, DATE};
use http::{HeaderValue, Method, StatusCode, Version};
use micro_engine::standard::{StandardRequest, StandardResponse};
use micro_engine::response::HijackFn;
use micro_engine::{BoxHandler, Config, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::ServerCodec;
use crate::connection::Rewind;
use crate::date::{http_date_now, DateService};
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead, ResponseFrame, ResponseHead, SendError,
};

const INIT_READ_CAPACITY: usize = 8 * 1024;

const MAX_BODY_PREALLOCATE: u64 = 64 * 1024;

const REJECT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const REJECT_DRAIN_LIMIT: usize = 64 * 1024;

/// Per connection limits, usually derived from the engine [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// `0` means unlimited
    pub max_requests: usize,
    /// `0` means unlimited
    pub max_body_size: u64,
}

impl From<&Config> for ConnectionConfig {
    fn from(config: &Config) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            max_requests: config.max_requests_per_conn(),
            max_body_size: config.max_request_body_size(),
        }
    }
}

/// An HTTP/1.1 connection dispatching each request to a handler.
///
/// Each request is read completely, body included, before the handler runs.
/// The handler writes into a [`StandardResponse`] which is encoded once the
/// handler returns. The connection is kept alive between requests unless the
/// client, the request limit, or a shutdown says otherwise.
pub struct HttpConnection<S> {
    framed: Framed<S, ServerCodec>,
    config: ConnectionConfig,
    remote_addr: Option<SocketAddr>,
    tls: bool,
    shutdown: CancellationToken,
    date_service: Option<Arc<DateService>>,
}

impl<S> fmt::Debug for HttpConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("config", &self.config)
            .field("remote_addr", &self.remote_addr)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

enum Outcome {
    KeepAlive,
    Close,
    Hijack(HijackFn),
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S, config: ConnectionConfig) -> Self {
        let codec = ServerCodec::new(config.max_body_size);
        Self {
            framed: Framed::with_capacity(stream, codec, INIT_READ_CAPACITY),
            config,
            remote_addr: None,
            tls: false,
            shutdown: CancellationToken::new(),
            date_service: None,
        }
    }

    pub fn remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Closes the connection between requests once `shutdown` is cancelled.
    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn date_service(mut self, date_service: Arc<DateService>) -> Self {
        self.date_service = Some(date_service);
        self
    }

    /// Answers with `status` without parsing any request, then closes.
    ///
    /// Whatever the client already sent is read and discarded for a short
    /// while, so closing does not reset the connection before the client has
    /// read the response.
    pub async fn reject(mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut frame = ResponseFrame::status(status, Version::HTTP_11);
        frame.head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        self.send(frame).await?;
        self.framed.get_mut().shutdown().await.map_err(SendError::io)?;
        self.drain().await;
        Ok(())
    }

    async fn drain(&mut self) {
        let io = self.framed.get_mut();
        let mut buf = [0u8; 1024];
        let mut drained = 0usize;

        let result = tokio::time::timeout(REJECT_DRAIN_TIMEOUT, async {
            while drained < REJECT_DRAIN_LIMIT {
                match io.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => drained += n,
                }
            }
        })
        .await;

        if result.is_err() {
            debug!(drained, "stop draining rejected connection");
        }
    }

    pub async fn process(mut self, handler: BoxHandler) -> Result<(), HttpError> {
        let shutdown = self.shutdown.clone();
        let mut served = 0usize;

        loop {
            let message = select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("engine shutdown, close idle connection");
                    return Ok(());
                }
                message = self.next_message() => message,
            };

            let (head, payload_size) = match message {
                Some(Ok(Message::Header(header))) => header,

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while expecting a request head");
                    let error = ParseError::invalid_body("need header while receive body");
                    return self.reject_request(error, Version::HTTP_11).await;
                }

                Some(Err(ParseError::ReadTimeout)) if self.framed.read_buffer().is_empty() => {
                    debug!("idle connection timeout");
                    return Ok(());
                }

                Some(Err(e)) => return self.reject_request(e, Version::HTTP_11).await,

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            };

            served += 1;
            let limit_reached = self.config.max_requests > 0 && served >= self.config.max_requests;

            match self.do_process(head, payload_size, &handler, limit_reached).await? {
                Outcome::KeepAlive => continue,
                Outcome::Close => {
                    if let Err(e) = self.framed.get_mut().shutdown().await {
                        debug!(cause = %e, "can't shutdown closed connection");
                    }
                    return Ok(());
                }
                Outcome::Hijack(hijack) => {
                    debug!("connection hijacked by handler");
                    let parts = self.framed.into_parts();
                    hijack(Box::new(Rewind::new(parts.read_buf.freeze(), parts.io))).await;
                    return Ok(());
                }
            }
        }
    }

    async fn do_process(
        &mut self,
        head: RequestHead,
        payload_size: PayloadSize,
        handler: &BoxHandler,
        limit_reached: bool,
    ) -> Result<Outcome, HttpError> {
        let version = head.version();
        let is_head = head.method() == Method::HEAD;
        let mut keep_alive = head.keep_alive() && !limit_reached;

        if head.expects_continue() && !payload_size.is_empty() {
            let writer = self.framed.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            debug!("receive expect request header, sent continue response");
        }

        let body = match self.read_body(payload_size).await {
            Ok(body) => body,
            Err(e) => {
                self.reject_request(e, version).await?;
                return Ok(Outcome::Close);
            }
        };

        let token = self.shutdown.child_token();
        let mut req = StandardRequest::new(head.body(body)).with_tls(self.tls).with_cancellation(token.clone());
        if let Some(remote_addr) = self.remote_addr {
            req = req.with_remote_addr(remote_addr);
        }
        let mut res = StandardResponse::new();

        let result = AssertUnwindSafe(handler.serve_http(&mut req, &mut res)).catch_unwind().await;
        token.cancel();

        let mut frame = match result {
            Ok(()) => {
                let committed = res.committed();
                let unreported = res.take_error();
                let parts = res.into_parts();

                if let Some(hijack) = parts.hijack {
                    return Ok(Outcome::Hijack(hijack));
                }

                match unreported {
                    Some(e) => {
                        error!(cause = %e, "handler error is not handled by any middleware");
                        if committed {
                            build_frame(parts.status, version, parts.header, parts.body)
                        } else {
                            ResponseFrame::status(StatusCode::INTERNAL_SERVER_ERROR, version)
                        }
                    }
                    None => build_frame(parts.status, version, parts.header, parts.body),
                }
            }
            Err(_) => {
                error!("handler panicked, response with internal server error");
                keep_alive = false;
                ResponseFrame::status(StatusCode::INTERNAL_SERVER_ERROR, version)
            }
        };

        if self.shutdown.is_cancelled() {
            keep_alive = false;
        }

        let headers = frame.head.headers_mut();
        if !headers.contains_key(DATE) {
            let date = self.date_service.as_ref().map(|service| service.header_value()).unwrap_or_else(http_date_now);
            headers.insert(DATE, date);
        }
        if !keep_alive {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        } else if version == Version::HTTP_10 {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        self.send(frame.skip_body(is_head)).await?;

        Ok(if keep_alive { Outcome::KeepAlive } else { Outcome::Close })
    }

    async fn next_message(&mut self) -> Option<Result<Message<(RequestHead, PayloadSize)>, ParseError>> {
        match self.config.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.framed.next()).await {
                Ok(message) => message,
                Err(_) => Some(Err(ParseError::ReadTimeout)),
            },
            None => self.framed.next().await,
        }
    }

    async fn read_body(&mut self, payload_size: PayloadSize) -> Result<Bytes, ParseError> {
        let capacity = payload_size.declared_length().unwrap_or(0).min(MAX_BODY_PREALLOCATE);
        let mut body = BytesMut::with_capacity(capacity as usize);

        loop {
            match self.next_message().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => body.extend_from_slice(&bytes),
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive header while reading body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::io(io::Error::from(io::ErrorKind::UnexpectedEof))),
            }
        }
    }

    /// Answers a request that can't be served with the status of `e`, then
    /// fails the connection with `e`.
    async fn reject_request(&mut self, e: ParseError, version: Version) -> Result<(), HttpError> {
        if let Some(status) = e.status() {
            warn!(cause = %e, status = status.as_u16(), "reject request");
            let mut frame = ResponseFrame::status(status, version);
            frame.head.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            frame.head.headers_mut().insert(DATE, http_date_now());
            self.send(frame).await?;
        }
        Err(e.into())
    }

    async fn send(&mut self, frame: ResponseFrame) -> Result<(), HttpError> {
        let send = self.framed.send(frame);
        match self.config.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send).await.map_err(|_| SendError::WriteTimeout)??,
            None => send.await?,
        }
        Ok(())
    }
}

fn build_frame(status: StatusCode, version: Version, header: http::HeaderMap, body: Bytes) -> ResponseFrame {
    let mut head = ResponseHead::new(());
    *head.status_mut() = status;
    *head.version_mut() = version;
    *head.headers_mut() = header;
    ResponseFrame::new(head, body)
}
