//! Decoder for chunked transfer encoding (RFC 7230 §4.1).
//!
//! Chunks arrive as a hex size line (optionally with extensions), the
//! chunk data, and a terminating CRLF; a zero-sized chunk ends the body,
//! optionally followed by trailer fields. The decoder steps byte by byte
//! through the framing and hands out the data portions as zero-copy
//! slices, so a chunk split across socket reads is forwarded in pieces.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Reading the chunk size in hex
    Size,
    /// Whitespace after the size, before extensions or CR
    SizeLws,
    /// Skipping chunk extensions up to CR
    Extension,
    /// LF finishing the size line
    SizeLf,
    /// Reading chunk data
    Data,
    /// CR after chunk data
    DataCr,
    /// LF after chunk data
    DataLf,
    /// Skipping a trailer field up to CR
    Trailer,
    /// LF finishing a trailer field
    TrailerLf,
    /// CR of the final empty line
    EndCr,
    /// LF of the final empty line
    EndLf,
    /// Message complete
    Done,
}

/// Streaming decoder for chunked bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(reason: &str) -> ParseError {
    ParseError::invalid_body(format!("chunked encoding: {reason}"))
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::Done {
                trace!("finished reading chunked body");
                return Ok(Some(PayloadItem::Eof));
            }

            // data is consumed without per-byte framing
            if self.state == State::Data {
                if self.remaining == 0 {
                    self.state = State::DataCr;
                    continue;
                }
                if src.is_empty() {
                    return Ok(None);
                }
                let len = self.remaining.min(src.len() as u64) as usize;
                let bytes = src.split_to(len).freeze();
                self.remaining -= bytes.len() as u64;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }
                trace!(len = bytes.len(), "read chunk bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            if src.is_empty() {
                return Ok(None);
            }
            let byte = src.get_u8();

            self.state = match self.state {
                State::Size => match byte {
                    b @ b'0'..=b'9' => self.push_size_digit((b - b'0') as u64)?,
                    b @ b'a'..=b'f' => self.push_size_digit((b - b'a' + 10) as u64)?,
                    b @ b'A'..=b'F' => self.push_size_digit((b - b'A' + 10) as u64)?,
                    b'\t' | b' ' => State::SizeLws,
                    b';' => State::Extension,
                    b'\r' => State::SizeLf,
                    _ => return Err(invalid("invalid character in chunk size")),
                },

                State::SizeLws => match byte {
                    // whitespace may follow the size, but no further digits
                    b'\t' | b' ' => State::SizeLws,
                    b';' => State::Extension,
                    b'\r' => State::SizeLf,
                    _ => return Err(invalid("invalid chunk size whitespace")),
                },

                State::Extension => match byte {
                    b'\r' => State::SizeLf,
                    // extensions must still end with a proper CRLF
                    b'\n' => return Err(invalid("bare LF in chunk extension")),
                    _ => State::Extension,
                },

                State::SizeLf => match byte {
                    b'\n' if self.remaining == 0 => State::EndCr,
                    b'\n' => State::Data,
                    _ => return Err(invalid("missing LF after chunk size")),
                },

                State::DataCr => match byte {
                    b'\r' => State::DataLf,
                    _ => return Err(invalid("missing CR after chunk data")),
                },

                State::DataLf => match byte {
                    b'\n' => State::Size,
                    _ => return Err(invalid("missing LF after chunk data")),
                },

                State::Trailer => match byte {
                    b'\r' => State::TrailerLf,
                    _ => State::Trailer,
                },

                State::TrailerLf => match byte {
                    b'\n' => State::EndCr,
                    _ => return Err(invalid("missing LF after trailer field")),
                },

                State::EndCr => match byte {
                    b'\r' => State::EndLf,
                    // anything else starts a trailer field
                    _ => State::Trailer,
                },

                State::EndLf => match byte {
                    b'\n' => State::Done,
                    _ => return Err(invalid("missing final LF")),
                },

                State::Data | State::Done => unreachable!("handled above"),
            };
        }
    }
}

impl ChunkedDecoder {
    fn push_size_digit(&mut self, digit: u64) -> Result<State, ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit))
            .ok_or_else(|| invalid("chunk size overflows u64"))?;
        Ok(State::Size)
    }
}
