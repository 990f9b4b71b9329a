//! Response serialization into a scatter-gather packet.
//!
//! The status line and header section are rendered into one freshly
//! reserved buffer (pre-sized from the header collection's `max_size`),
//! which becomes the first packet fragment; the accumulated body packet is
//! appended behind it without copying. The connection then flushes the
//! whole response with a single vectored write. Streamed bodies only get
//! the head here and are chunk-encoded separately.

use bytes::{BufMut, BytesMut};

use crate::buffer::{ByteStr, Packet, fmt_uint};
use crate::protocol::{PayloadSize, Response};

/// Rough bytes per serialized header line, used for pre-sizing.
const HEADER_SIZE_HINT: usize = 48;
/// Room for the status line.
const STATUS_LINE_HINT: usize = 64;

#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Serializes the response head (and, for non-chunked responses, the
    /// body packet) into `out`.
    ///
    /// Fills the framing header from `payload_size`: Content-Length for
    /// known lengths, Transfer-Encoding: chunked otherwise.
    pub fn encode(&self, response: &mut Response, payload_size: PayloadSize, out: &mut Packet) {
        self.encode_head(response, payload_size, out);
        if !payload_size.is_chunked() {
            let mut body = response.take_body();
            out.append_packet(&mut body);
        }
    }

    /// Serializes only the head, discarding any accumulated body. Used for
    /// HEAD responses, which keep the framing headers of the full body.
    pub fn encode_head_only(&self, response: &mut Response, payload_size: PayloadSize, out: &mut Packet) {
        self.encode_head(response, payload_size, out);
        response.take_body();
    }

    fn encode_head(&self, response: &mut Response, payload_size: PayloadSize, out: &mut Packet) {
        match payload_size {
            PayloadSize::Length(length) => {
                // SAFETY: the decimal rendering of an integer is ASCII
                let value = unsafe { ByteStr::from_utf8_unchecked(fmt_uint(length)) };
                response.headers_mut().set("Content-Length", value);
            }
            PayloadSize::Chunked => {
                response.headers_mut().set("Transfer-Encoding", "chunked");
            }
            PayloadSize::Empty => {
                response.headers_mut().set("Content-Length", "0");
            }
        }

        let mut buf =
            BytesMut::with_capacity(STATUS_LINE_HINT + response.headers().max_size() * HEADER_SIZE_HINT);

        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(response.status().as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(response.reason().as_bytes());
        buf.put_slice(b"\r\n");

        response.headers().for_each(|name, value| {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        });
        buf.put_slice(b"\r\n");

        out.append_bytes(buf.freeze());
    }
}
