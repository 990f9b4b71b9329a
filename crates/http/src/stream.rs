//! Lazy, chunked body readers.
//!
//! [`InputStream`] is the abstraction handlers use to consume a request
//! body (and, on the response side, to stream a body of unknown length).
//! Reads hand out shared [`Bytes`] without copying where possible.
//!
//! The interesting implementation is [`BodyStream`]: the connection keeps
//! ownership of the socket and its decoder and pumps decoded payload chunks
//! into a small channel, while the handler reads from the channel end that
//! is attached to the request. The stream therefore never outlives the
//! connection's read buffer, and a handler that stops reading simply leaves
//! the remaining bytes to the connection's drain step.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::{ParseError, PayloadItem};

/// One step of reading from an [`InputStream`].
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// The bytes read; may be empty on the final step.
    pub data: Bytes,
    /// True once the stream has ended. No data follows an end chunk.
    pub is_end: bool,
}

impl StreamChunk {
    pub fn end() -> Self {
        Self { data: Bytes::new(), is_end: true }
    }

    pub fn data(data: Bytes) -> Self {
        Self { data, is_end: false }
    }
}

/// A lazy, chunked reader over a byte stream.
#[async_trait]
pub trait InputStream: Send {
    /// Reads the next chunk. After a chunk with `is_end == true` every
    /// further read returns an empty end chunk.
    async fn read(&mut self) -> Result<StreamChunk, ParseError>;

    /// Total stream length when known up front (Content-Length bodies).
    fn size(&self) -> Option<u64>;
}

/// A stream with no data at all.
#[derive(Debug, Default)]
pub struct NullStream;

#[async_trait]
impl InputStream for NullStream {
    async fn read(&mut self) -> Result<StreamChunk, ParseError> {
        Ok(StreamChunk::end())
    }

    fn size(&self) -> Option<u64> {
        Some(0)
    }
}

/// A stream serving a single in-memory buffer.
///
/// Used for echo handlers, tests, and as a streaming response source.
#[derive(Debug)]
pub struct BufferStream {
    data: Option<Bytes>,
    size: u64,
}

impl BufferStream {
    pub fn new(data: Bytes) -> Self {
        let size = data.len() as u64;
        Self { data: Some(data), size }
    }
}

#[async_trait]
impl InputStream for BufferStream {
    async fn read(&mut self) -> Result<StreamChunk, ParseError> {
        match self.data.take() {
            Some(data) => Ok(StreamChunk { data, is_end: true }),
            None => Ok(StreamChunk::end()),
        }
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// Capacity of the connection-to-handler body channel. Small on purpose:
/// the pump must not run ahead of the handler by more than a chunk.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 2;

/// The handler-side end of a request body fed by the connection.
#[derive(Debug)]
pub struct BodyStream {
    receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    size: Option<u64>,
    ended: bool,
}

impl BodyStream {
    /// Creates the channel pair: the stream goes into the request, the
    /// sender stays with the connection's body pump.
    pub(crate) fn channel(
        size: Option<u64>,
    ) -> (BodyStream, mpsc::Sender<Result<PayloadItem, ParseError>>) {
        let (sender, receiver) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        (BodyStream { receiver, size, ended: false }, sender)
    }
}

#[async_trait]
impl InputStream for BodyStream {
    async fn read(&mut self) -> Result<StreamChunk, ParseError> {
        if self.ended {
            return Ok(StreamChunk::end());
        }
        match self.receiver.recv().await {
            Some(Ok(PayloadItem::Chunk(data))) => Ok(StreamChunk::data(data)),
            Some(Ok(PayloadItem::Eof)) => {
                self.ended = true;
                Ok(StreamChunk::end())
            }
            Some(Err(e)) => {
                self.ended = true;
                Err(e)
            }
            // the pump dropped the sender before EOF: the connection died
            None => {
                self.ended = true;
                Err(ParseError::invalid_body("connection closed before body end"))
            }
        }
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_stream_ends_immediately() {
        let mut stream = NullStream;
        let chunk = stream.read().await.unwrap();
        assert!(chunk.is_end);
        assert!(chunk.data.is_empty());
        assert_eq!(stream.size(), Some(0));
    }

    #[tokio::test]
    async fn buffer_stream_serves_data_once() {
        let mut stream = BufferStream::new(Bytes::from_static(b"hello"));
        assert_eq!(stream.size(), Some(5));

        let chunk = stream.read().await.unwrap();
        assert_eq!(&chunk.data[..], b"hello");
        assert!(chunk.is_end);

        let chunk = stream.read().await.unwrap();
        assert!(chunk.is_end);
        assert!(chunk.data.is_empty());
    }

    #[tokio::test]
    async fn body_stream_reads_until_eof() {
        let (mut stream, sender) = BodyStream::channel(Some(8));
        assert_eq!(stream.size(), Some(8));

        sender.send(Ok(PayloadItem::Chunk(Bytes::from_static(b"abcd")))).await.unwrap();
        sender.send(Ok(PayloadItem::Chunk(Bytes::from_static(b"efgh")))).await.unwrap();
        sender.send(Ok(PayloadItem::Eof)).await.unwrap();

        let chunk = stream.read().await.unwrap();
        assert_eq!(&chunk.data[..], b"abcd");
        assert!(!chunk.is_end);

        let chunk = stream.read().await.unwrap();
        assert_eq!(&chunk.data[..], b"efgh");

        let chunk = stream.read().await.unwrap();
        assert!(chunk.is_end);

        // reads after the end keep reporting the end
        let chunk = stream.read().await.unwrap();
        assert!(chunk.is_end);
    }

    #[tokio::test]
    async fn body_stream_surfaces_closed_connection() {
        let (mut stream, sender) = BodyStream::channel(None);
        drop(sender);
        let result = stream.read().await;
        assert!(result.is_err());
    }
}
