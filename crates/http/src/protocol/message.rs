use bytes::Bytes;

use crate::protocol::request::Request;

/// One item produced by the request decoder: either a complete request head
/// or a piece of the request payload.
///
/// The decoder switches from header phase to payload phase after emitting a
/// [`Message::Header`], and back once the payload reports
/// [`PayloadItem::Eof`].
#[derive(Debug)]
pub enum Message {
    /// A fully parsed request head together with its payload size
    Header(Box<(Request, PayloadSize)>),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem),
}

impl Message {
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }
}

/// An item in the request payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// Marks the end of the payload stream
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// Size information of a request or response payload.
///
/// - Known length: read/write exactly that many bytes
/// - Chunked: transfer-encoded, length unknown up front
/// - Empty: no body at all
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// The exact length when known.
    pub fn length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Chunked | PayloadSize::Empty => None,
        }
    }
}
