//! `Transfer-Encoding: chunked` payload decoding.
//!
//! The decoder works line by line: a hex size line (extensions ignored), the
//! chunk data followed by CRLF, and after the zero sized chunk the trailer
//! lines up to an empty line. Trailer fields are dropped.

use std::cmp;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailer,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = match size {
                        0 => ChunkedState::Trailer,
                        remaining => ChunkedState::Data { remaining },
                    };
                }

                ChunkedState::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(remaining, src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    self.state = match remaining - len {
                        0 => ChunkedState::DataEnd,
                        remaining => ChunkedState::Data { remaining },
                    };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_body("chunk data must end with CRLF"));
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = ChunkedState::Done;
                    }
                }

                ChunkedState::Done => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
            }
        }
    }
}

/// Splits off one CRLF terminated line, without the CRLF.
fn take_line(src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
    match src.windows(2).position(|window| window == b"\r\n") {
        Some(pos) => {
            let mut line = src.split_to(pos + 2);
            line.truncate(pos);
            Ok(Some(line.freeze()))
        }
        None => {
            ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
            Ok(None)
        }
    }
}

fn parse_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();

    ensure!(
        !size.is_empty() && size.len() <= 16 && size.iter().all(u8::is_ascii_hexdigit),
        ParseError::invalid_body("invalid chunk size line")
    );

    size.iter()
        .try_fold(0u64, |acc, b| {
            let digit = (*b as char).to_digit(16)? as u64;
            acc.checked_mul(16)?.checked_add(digit)
        })
        .ok_or_else(|| ParseError::invalid_body("invalid overflow chunked length"))
}
