//! The response data object.
//!
//! A [`Response`] accumulates the outbound body as a [`Packet`] so the
//! whole response can leave in one vectored write. Handlers that do not
//! know their body length up front attach an [`InputStream`] instead,
//! which the connection drains with chunked transfer encoding.

use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use http::StatusCode;

use crate::buffer::{ByteStr, Packet};
use crate::protocol::ResponseHeaders;
use crate::stream::InputStream;

pub struct Response {
    status: StatusCode,
    reason: Option<ByteStr>,
    headers: ResponseHeaders,
    body: Packet,
    body_stream: Option<Box<dyn InputStream>>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: ResponseHeaders::new(),
            body: Packet::new(),
            body_stream: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The status message sent on the wire: a custom reason if one was set,
    /// otherwise the canonical reason phrase.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason.as_str(),
            None => self.status.canonical_reason().unwrap_or("Unknown"),
        }
    }

    pub fn set_reason(&mut self, reason: ByteStr) {
        self.reason = Some(reason);
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    /// The accumulated body packet.
    pub fn body(&self) -> &Packet {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Packet {
        &mut self.body
    }

    /// Takes the body packet, leaving an empty one behind.
    pub fn take_body(&mut self) -> Packet {
        std::mem::take(&mut self.body)
    }

    pub fn append_body(&mut self, bytes: Bytes) -> &mut Self {
        self.body.append_bytes(bytes);
        self
    }

    pub fn append_body_static(&mut self, s: &'static str) -> &mut Self {
        self.body.append_static(s);
        self
    }

    /// Attaches a streaming body of unknown length; serialized with
    /// chunked transfer encoding. Replaces any accumulated packet body.
    pub fn set_body_stream(&mut self, stream: Box<dyn InputStream>) {
        self.body_stream = Some(stream);
    }

    pub fn has_body_stream(&self) -> bool {
        self.body_stream.is_some()
    }

    pub fn take_body_stream(&mut self) -> Option<Box<dyn InputStream>> {
        self.body_stream.take()
    }

    /// Returns the response to its blank state for the next keep-alive
    /// cycle.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers.clear();
        self.body = Packet::new();
        self.body_stream = None;
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body_size", &self.body.size())
            .field("has_body_stream", &self.body_stream.is_some())
            .finish()
    }
}
