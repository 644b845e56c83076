//! HTTP codec module for encoding and decoding HTTP messages
//!
//! - [`RequestDecoder`]: decodes request heads and payloads, built from the
//!   head decoder and the length/chunked payload decoders
//! - [`ResponseEncoder`]: encodes complete responses
//! - [`ServerCodec`]: both of them combined, for use with a `Framed` stream
//!
//! # Example
//!
//! ```
//! use micro_http::codec::RequestDecoder;
//! use micro_http::protocol::Message;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let message = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(message.is_header());
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;

use crate::protocol::{Message, ParseError, PayloadSize, RequestHead, ResponseFrame, SendError};

/// The server side of an HTTP/1.1 connection: decodes requests, encodes responses.
#[derive(Debug, Default)]
pub struct ServerCodec {
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
}

impl ServerCodec {
    pub fn new(max_body_size: u64) -> Self {
        Self { decoder: RequestDecoder::with_max_body_size(max_body_size), encoder: ResponseEncoder::new() }
    }

    pub fn decoder(&self) -> &RequestDecoder {
        &self.decoder
    }
}

impl Decoder for ServerCodec {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }
}

impl Encoder<ResponseFrame> for ServerCodec {
    type Error = SendError;

    fn encode(&mut self, item: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}
