use std::any::Any;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{LOCATION, SET_COOKIE};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::cookie::Cookie;
use crate::error::BoxError;
use crate::header::Header;

/// The sink a response body is written to.
pub type Writer = Box<dyn io::Write + Send + Sync>;

/// A raw, bidirectional connection handed over by [`Response::hijack`].
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Takes over the connection once the current exchange is finished.
pub type HijackFn = Box<dyn FnOnce(Box<dyn Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The response capability a handler writes to.
///
/// The status line and headers are committed on the first [`Response::write_header`]
/// or [`Response::write`]; header changes after that are not sent.
#[async_trait]
pub trait Response: Send + Sync {
    fn header(&self) -> &dyn Header;

    fn header_mut(&mut self) -> &mut dyn Header;

    /// Commits `status` and the current headers. Only the first call takes effect.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes to the current writer, committing a 200 status first if
    /// nothing is committed yet.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// The committed status, `0` while nothing is committed.
    fn status(&self) -> u16;

    /// Number of body bytes written so far.
    fn size(&self) -> u64;

    fn committed(&self) -> bool;

    /// Replaces the body writer, returning the previous one.
    fn set_writer(&mut self, writer: Writer) -> Writer;

    fn writer(&mut self) -> &mut Writer;

    /// Registers `f` to take over the raw connection after the handler returns.
    ///
    /// Fails when the response is already committed or hijacked.
    fn hijack(&mut self, f: HijackFn) -> io::Result<()>;

    /// The bytes written to the default body buffer.
    fn body(&self) -> Bytes;

    fn redirect(&mut self, url: &str, status: StatusCode) {
        self.header_mut().set(LOCATION.as_str(), url);
        self.write_header(status);
    }

    fn not_found(&mut self) {
        self.write_header(StatusCode::NOT_FOUND);
        let _ = self.write_all(b"Not Found");
    }

    fn set_cookie(&mut self, cookie: &Cookie) {
        self.header_mut().add(SET_COOKIE.as_str(), &cookie.to_string());
    }

    /// Answers with the content of the file at `path`, or 404 when it can't be read.
    async fn serve_file(&mut self, path: &Path) -> io::Result<()>;

    /// Reports a handler error to the middleware above.
    fn error(&mut self, err: BoxError);

    fn take_error(&mut self) -> Option<BoxError>;

    /// Access to the backend's native response type.
    fn as_any(&self) -> &dyn Any;
}
