use std::any::Any;
use std::fmt;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use tracing::warn;

use crate::error::BoxError;
use crate::header::Header;
use crate::response::{HijackFn, Response, Writer};

/// The default response body sink, shared between the response and its writer.
#[derive(Debug, Clone, Default)]
pub struct BodyBuffer {
    inner: Arc<Mutex<BytesMut>>,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock())
    }

    pub fn take(&self) -> Bytes {
        self.lock().split().freeze()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl io::Write for BodyBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a finished [`StandardResponse`] hands back to the transport.
pub struct ResponseParts {
    pub status: StatusCode,
    pub header: HeaderMap,
    pub body: Bytes,
    pub hijack: Option<HijackFn>,
    pub error: Option<BoxError>,
}

impl fmt::Debug for ResponseParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseParts")
            .field("status", &self.status)
            .field("header", &self.header)
            .field("body_len", &self.body.len())
            .field("hijacked", &self.hijack.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// A [`Response`] buffering its body in memory.
///
/// Headers are snapshotted when the status is committed; changes made after
/// that are not part of [`StandardResponse::into_parts`].
pub struct StandardResponse {
    header: HeaderMap,
    sent_header: Option<HeaderMap>,
    status: u16,
    size: u64,
    buffer: BodyBuffer,
    writer: Writer,
    hijack: Option<HijackFn>,
    error: Option<BoxError>,
}

impl fmt::Debug for StandardResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardResponse")
            .field("status", &self.status)
            .field("header", &self.header)
            .field("size", &self.size)
            .field("committed", &self.sent_header.is_some())
            .field("hijacked", &self.hijack.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for StandardResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardResponse {
    pub fn new() -> Self {
        let buffer = BodyBuffer::new();
        Self {
            header: HeaderMap::new(),
            sent_header: None,
            status: 0,
            size: 0,
            writer: Box::new(buffer.clone()),
            buffer,
            hijack: None,
            error: None,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.header
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijack.is_some()
    }

    /// Finishes the exchange; an uncommitted response becomes a 200.
    pub fn into_parts(self) -> ResponseParts {
        let status = match self.status {
            0 => StatusCode::OK,
            status => StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        };

        ResponseParts {
            status,
            header: self.sent_header.unwrap_or(self.header),
            body: self.buffer.take(),
            hijack: self.hijack,
            error: self.error,
        }
    }
}

#[async_trait]
impl Response for StandardResponse {
    fn header(&self) -> &dyn Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut dyn Header {
        &mut self.header
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.hijack.is_some() {
            warn!(status = status.as_u16(), "response is hijacked, ignore write header");
            return;
        }
        if self.committed() {
            warn!(committed = self.status, status = status.as_u16(), "response already committed");
            return;
        }
        self.status = status.as_u16();
        self.sent_header = Some(self.header.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.hijack.is_some() {
            return Err(io::Error::other("response is hijacked"));
        }
        if !self.committed() {
            self.write_header(StatusCode::OK);
        }
        let n = self.writer.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn committed(&self) -> bool {
        self.status != 0
    }

    fn set_writer(&mut self, writer: Writer) -> Writer {
        std::mem::replace(&mut self.writer, writer)
    }

    fn writer(&mut self) -> &mut Writer {
        &mut self.writer
    }

    fn hijack(&mut self, f: HijackFn) -> io::Result<()> {
        if self.committed() {
            return Err(io::Error::other("can't hijack a committed response"));
        }
        if self.hijack.is_some() {
            return Err(io::Error::other("response is already hijacked"));
        }
        self.hijack = Some(f);
        Ok(())
    }

    fn body(&self) -> Bytes {
        self.buffer.to_bytes()
    }

    async fn serve_file(&mut self, path: &Path) -> io::Result<()> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                self.not_found();
                return Ok(());
            }
        };

        let content = tokio::fs::read(path).await?;

        if !self.header.contains_key(CONTENT_TYPE) {
            Header::set(&mut self.header, CONTENT_TYPE.as_str(), content_type(path));
        }
        if let Ok(modified) = metadata.modified() {
            Header::set(&mut self.header, LAST_MODIFIED.as_str(), &httpdate::fmt_http_date(modified));
        }

        self.write_header(StatusCode::OK);
        self.write_all(&content)
    }

    fn error(&mut self, err: BoxError) {
        if let Some(previous) = self.error.replace(err) {
            warn!(cause = %previous, "handler error replaced by a later one");
        }
    }

    fn take_error(&mut self) -> Option<BoxError> {
        self.error.take()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|s| s.to_str()).unwrap_or("").to_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;
    use crate::response::Connection;
    use futures::future::BoxFuture;

    fn noop_hijack() -> HijackFn {
        Box::new(|_conn: Box<dyn Connection>| -> BoxFuture<'static, ()> { Box::pin(async {}) })
    }

    #[test]
    fn second_write_header_is_ignored() {
        let mut res = StandardResponse::new();
        assert_eq!(res.status(), 0);
        assert!(!res.committed());

        res.write_header(StatusCode::CREATED);
        res.write_header(StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(res.status(), 201);
        assert_eq!(res.into_parts().status, StatusCode::CREATED);
    }

    #[test]
    fn write_commits_ok() {
        let mut res = StandardResponse::new();
        res.write_all(b"hello ").unwrap();
        res.write_all(b"world").unwrap();
        res.write_header(StatusCode::NOT_FOUND);

        assert_eq!(res.status(), 200);
        assert_eq!(res.size(), 11);
        assert_eq!(res.body(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn uncommitted_response_finishes_as_ok() {
        let res = StandardResponse::new();
        let parts = res.into_parts();
        assert_eq!(parts.status, StatusCode::OK);
        assert!(parts.body.is_empty());
    }

    #[test]
    fn header_changes_after_commit_are_not_sent() {
        let mut res = StandardResponse::new();
        res.header_mut().set("X-Before", "1");
        res.write_header(StatusCode::OK);
        res.header_mut().set("X-After", "1");

        assert_eq!(res.header().get("X-After"), "1");

        let parts = res.into_parts();
        assert_eq!(Header::get(&parts.header, "X-Before"), "1");
        assert!(!parts.header.contains_key("X-After"));
    }

    #[test]
    fn set_writer_captures_output() {
        let mut res = StandardResponse::new();
        let capture = BodyBuffer::new();
        let previous = res.set_writer(Box::new(capture.clone()));

        res.write_all(b"captured").unwrap();
        assert_eq!(capture.to_bytes(), Bytes::from_static(b"captured"));
        assert!(res.body().is_empty());

        res.set_writer(previous);
        res.writer().write_all(b"direct").unwrap();
        assert_eq!(res.body(), Bytes::from_static(b"direct"));
    }

    #[test]
    fn redirect_and_not_found() {
        let mut res = StandardResponse::new();
        res.redirect("/login", StatusCode::FOUND);
        assert_eq!(res.status(), 302);
        assert_eq!(res.header().get("Location"), "/login");

        let mut res = StandardResponse::new();
        res.not_found();
        assert_eq!(res.status(), 404);
        assert_eq!(res.body(), Bytes::from_static(b"Not Found"));
    }

    #[test]
    fn set_cookie_appends() {
        let mut res = StandardResponse::new();
        res.set_cookie(&Cookie::new("a", "1"));
        res.set_cookie(&Cookie::new("b", "2").http_only(true));

        assert_eq!(res.header().values("set-cookie"), vec!["a=1", "b=2; HttpOnly"]);
    }

    #[test]
    fn hijack_blocks_writes() {
        let mut res = StandardResponse::new();
        res.hijack(noop_hijack()).unwrap();

        assert!(res.is_hijacked());
        assert!(res.write(b"x").is_err());
        assert!(res.hijack(noop_hijack()).is_err());

        res.write_header(StatusCode::OK);
        assert_eq!(res.status(), 0);
        assert!(res.into_parts().hijack.is_some());
    }

    #[test]
    fn hijack_after_commit_fails() {
        let mut res = StandardResponse::new();
        res.write_header(StatusCode::OK);
        assert!(res.hijack(noop_hijack()).is_err());
    }

    #[test]
    fn error_slot() {
        let mut res = StandardResponse::new();
        res.error("first".into());
        res.error("second".into());

        assert_eq!(res.take_error().unwrap().to_string(), "second");
        assert!(res.take_error().is_none());
    }

    #[tokio::test]
    async fn serve_file_sets_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<h1>hi</h1>").unwrap();

        let mut res = StandardResponse::new();
        res.serve_file(&path).await.unwrap();

        assert_eq!(res.status(), 200);
        assert_eq!(res.header().get("Content-Type"), "text/html; charset=utf-8");
        assert!(res.header().contains("Last-Modified"));
        assert_eq!(res.body(), Bytes::from_static(b"<h1>hi</h1>"));
    }

    #[tokio::test]
    async fn serve_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let mut res = StandardResponse::new();
        res.serve_file(&dir.path().join("missing.txt")).await.unwrap();
        assert_eq!(res.status(), 404);

        let mut res = StandardResponse::new();
        res.serve_file(dir.path()).await.unwrap();
        assert_eq!(res.status(), 404);
    }
}
