//! HTTP request decoder
//!
//! Decodes a byte stream into a [`Message::Header`] followed by payload
//! messages, the last of which is always [`PayloadItem::Eof`]. The decoder then
//! goes back to waiting for the next request head on the same stream.
//!
//! The payload of a request may not exceed the configured body limit: a
//! `Content-Length` over the limit fails as soon as the head is decoded, a
//! chunked payload fails once the received bytes cross it.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::ensure;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    max_body_size: u64,
    received: u64,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Limits the payload of every request to `max_body_size` bytes, `0` means unlimited.
    pub fn with_max_body_size(max_body_size: u64) -> Self {
        Self { max_body_size, ..Default::default() }
    }

    /// Whether a request payload is being decoded.
    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }

    fn check_body_size(&self, size: u64) -> Result<(), ParseError> {
        ensure!(self.max_body_size == 0 || size <= self.max_body_size, ParseError::too_large_body(size, self.max_body_size));
        Ok(())
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None, max_body_size: 0, received: 0 }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(PayloadItem::Chunk(bytes)) => {
                    self.received += bytes.len() as u64;
                    self.check_body_size(self.received)?;
                    Some(Message::Payload(PayloadItem::Chunk(bytes)))
                }
                Some(PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(PayloadItem::Eof))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                if let PayloadSize::Length(length) = payload_size {
                    self.check_body_size(length)?;
                }
                self.received = 0;
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}
