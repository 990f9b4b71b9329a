//! Encoder for chunked transfer encoding of streamed response bodies.
//!
//! Each data chunk becomes three packet fragments: the hex size line, the
//! data itself (shared, not copied), and the trailing CRLF. The final
//! zero-length chunk closes the body.

use bytes::Bytes;

use crate::buffer::Packet;
use crate::protocol::PayloadItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    /// True once the final zero-length chunk has been encoded.
    pub fn is_finished(&self) -> bool {
        self.eof
    }

    /// Appends the chunked rendering of `item` to `out`.
    pub fn encode(&mut self, item: PayloadItem, out: &mut Packet) {
        if self.eof {
            return;
        }
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return;
                }
                out.append_bytes(Bytes::from(format!("{:X}\r\n", bytes.len())));
                out.append_bytes(bytes);
                out.append_static("\r\n");
            }
            PayloadItem::Eof => {
                self.eof = true;
                out.append_static("0\r\n\r\n");
            }
        }
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_chunks_and_terminator() {
        let mut encoder = ChunkedEncoder::new();
        let mut out = Packet::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut out);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(&[0_u8; 26])), &mut out);
        encoder.encode(PayloadItem::Eof, &mut out);

        let encoded = out.to_vec();
        assert!(encoded.starts_with(b"5\r\nhello\r\n1A\r\n"));
        assert!(encoded.ends_with(b"\r\n0\r\n\r\n"));
        assert!(encoder.is_finished());
    }

    #[test]
    fn nothing_is_written_after_eof() {
        let mut encoder = ChunkedEncoder::new();
        let mut out = Packet::new();
        encoder.encode(PayloadItem::Eof, &mut out);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut out);
        assert_eq!(out.to_vec(), b"0\r\n\r\n");
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let mut encoder = ChunkedEncoder::new();
        let mut out = Packet::new();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut out);
        assert!(out.is_empty());
        assert!(!encoder.is_finished());
    }
}
