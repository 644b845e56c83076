use bytes::Bytes;
use http::{Response, StatusCode, Version};

pub type ResponseHead = Response<()>;

/// A complete response: the head, the whole body, and whether the body must
/// be left off the wire (`HEAD` requests).
#[derive(Debug)]
pub struct ResponseFrame {
    pub head: ResponseHead,
    pub body: Bytes,
    pub skip_body: bool,
}

impl ResponseFrame {
    pub fn new(head: ResponseHead, body: Bytes) -> Self {
        Self { head, body, skip_body: false }
    }

    /// A bodyless response with only a status, used for errors raised before
    /// any handler runs.
    pub fn status(status: StatusCode, version: Version) -> Self {
        let mut head = ResponseHead::new(());
        *head.status_mut() = status;
        *head.version_mut() = version;
        Self::new(head, Bytes::new())
    }

    pub fn skip_body(mut self, skip_body: bool) -> Self {
        self.skip_body = skip_body;
        self
    }
}
