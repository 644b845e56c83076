//! HTTP response encoder
//!
//! Encodes a complete [`ResponseFrame`]: the status line, the headers with a
//! `Content-Length` matching the body, and the body itself unless it must be
//! left off (`HEAD` requests, `204`, `304` and informational statuses).

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderValue, StatusCode, Version};
use tokio_util::codec::Encoder;

use crate::protocol::{ResponseFrame, SendError};

const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<ResponseFrame> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let ResponseFrame { mut head, body, skip_body } = item;
        let status = head.status();

        dst.reserve(INIT_HEADER_SIZE + body.len());

        let version = match head.version() {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let headers = head.headers_mut();
        headers.remove(TRANSFER_ENCODING);
        let has_body = match status {
            s if s.is_informational() || s == StatusCode::NO_CONTENT => {
                headers.remove(CONTENT_LENGTH);
                false
            }
            StatusCode::NOT_MODIFIED => false,
            _ => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
                !skip_body
            }
        };

        for (header_name, header_value) in headers.iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        if has_body {
            dst.put_slice(&body);
        }
        Ok(())
    }
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseHead;
    use bytes::Bytes;

    fn encode(frame: ResponseFrame) -> String {
        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(frame, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    fn head(status: StatusCode) -> ResponseHead {
        http::Response::builder().status(status).header("X-Test", "1").body(()).unwrap()
    }

    #[test]
    fn encode_with_body() {
        let encoded = encode(ResponseFrame::new(head(StatusCode::OK), Bytes::from_static(b"hello")));
        assert_eq!(encoded, "HTTP/1.1 200 OK\r\nx-test: 1\r\ncontent-length: 5\r\n\r\nhello");
    }

    #[test]
    fn encode_head_response_keeps_length() {
        let frame = ResponseFrame::new(head(StatusCode::OK), Bytes::from_static(b"hello")).skip_body(true);
        assert_eq!(encode(frame), "HTTP/1.1 200 OK\r\nx-test: 1\r\ncontent-length: 5\r\n\r\n");
    }

    #[test]
    fn encode_no_content() {
        let frame = ResponseFrame::new(head(StatusCode::NO_CONTENT), Bytes::from_static(b"ignored"));
        assert_eq!(encode(frame), "HTTP/1.1 204 No Content\r\nx-test: 1\r\n\r\n");
    }

    #[test]
    fn encode_http_10_status_only() {
        let frame = ResponseFrame::status(StatusCode::PAYLOAD_TOO_LARGE, Version::HTTP_10);
        assert_eq!(encode(frame), "HTTP/1.0 413 Payload Too Large\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn encode_unknown_reason() {
        let frame = ResponseFrame::new(head(StatusCode::from_u16(599).unwrap()), Bytes::new());
        assert!(encode(frame).starts_with("HTTP/1.1 599 \r\n"));
    }
}
