//! The HTTP/1.x connection state machine.
//!
//! One [`Http1Connection`] serves one socket for its whole lifetime:
//!
//! ```text
//! read head -> attach body stream -> dispatch pipeline -> drain body
//!           -> write response -> keep-alive? loop : close
//! ```
//!
//! The pipeline future and the body pump run concurrently under a biased
//! `select!`: the pump decodes payload chunks off the socket and feeds the
//! request's body channel, so a handler waiting for body data never
//! deadlocks against a connection waiting for the handler. Whatever the
//! handler leaves unread is drained afterwards (up to a safety cap) to
//! keep the framing intact for the next keep-alive request.
//!
//! Responses accumulate into a [`Packet`] and leave in one vectored
//! write; streaming bodies get their head first and are chunk-encoded as
//! they are read.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use http::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::Packet;
use crate::codec::body::ChunkedEncoder;
use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ServerConfig;
use crate::date::DateService;
use crate::handler::Pipeline;
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, Request, Response, SendError,
};
use crate::stream::BodyStream;

/// How many unread body bytes the connection drains after the handler
/// before giving up and closing instead.
const MAX_DRAIN_BYTES: u64 = 256 * 1024;

/// A single HTTP/1.0 / HTTP/1.1 connection.
pub struct Http1Connection {
    framed_read: FramedRead<OwnedReadHalf, RequestDecoder>,
    writer: OwnedWriteHalf,
    encoder: ResponseEncoder,
    pipeline: Arc<Pipeline>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    served: u64,
}

impl std::fmt::Debug for Http1Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1Connection").field("served", &self.served).finish()
    }
}

impl Http1Connection {
    pub fn new(
        stream: TcpStream,
        pipeline: Arc<Pipeline>,
        config: Arc<ServerConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        let framed_read = FramedRead::with_capacity(
            reader,
            RequestDecoder::new(config.decoder_limits()),
            config.max_initial_request_packet_size,
        );
        Self {
            framed_read,
            writer,
            encoder: ResponseEncoder::new(),
            pipeline,
            config,
            shutdown,
            served: 0,
        }
    }

    /// Drives the connection until the peer closes, a timeout or error
    /// ends it, or the server stops.
    pub async fn process(mut self) -> Result<(), HttpError> {
        // one response object per connection, reset between cycles so its
        // allocations are reused across keep-alive requests
        let mut response = Response::new();
        loop {
            // the first head read gets the request budget, later ones the
            // keep-alive idle budget
            let budget = if self.served == 0 {
                Duration::from_millis(self.config.request_timeout_ms)
            } else {
                Duration::from_millis(self.config.keepalive_timeout_ms)
            };

            let next = select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("server stopping, closing idle connection");
                    return Ok(());
                }
                next = timeout(budget, self.framed_read.next()) => next,
            };

            let head = match next {
                Err(_elapsed) => {
                    debug!(served = self.served, "request timed out, closing connection");
                    return Ok(());
                }
                Ok(None) => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Ok(Some(Err(e))) => {
                    warn!("can't parse next request, cause: {}", e);
                    let status = e.response_status();
                    self.send_error_response(status).await?;
                    return Err(e.into());
                }
                Ok(Some(Ok(Message::Payload(_)))) => {
                    error!("received body bytes while expecting a request head");
                    self.send_error_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receiving body").into());
                }
                Ok(Some(Ok(Message::Header(head)))) => head,
            };

            let (request, payload_size) = *head;
            let keep_alive = self.serve_one(request, payload_size, &mut response).await?;
            self.served += 1;

            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Serves one request cycle; returns whether the connection stays
    /// alive afterwards.
    async fn serve_one(
        &mut self,
        mut request: Request,
        payload_size: PayloadSize,
        response: &mut Response,
    ) -> Result<bool, HttpError> {
        response.reset();

        if let Some(length) = payload_size.length() {
            if length > self.config.max_request_body_size {
                warn!(length, limit = self.config.max_request_body_size, "request body over limit");
                let e = ParseError::too_large_body(length, self.config.max_request_body_size);
                self.send_error_response(e.response_status()).await?;
                return Err(e.into());
            }
        }

        let request_keep_alive = keep_alive_requested(&request);

        if !payload_size.is_empty() && request.headers().expect().as_bytes().starts_with(b"100-") {
            self.writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            debug!("acknowledged expect-continue");
        }

        let handler_result = if payload_size.is_empty() {
            self.pipeline.dispatch(&mut request, response).await
        } else {
            let (stream, sender) = BodyStream::channel(payload_size.length());
            request.set_body_stream(Box::new(stream));

            // run the handler and the body pump concurrently; the biased
            // select always prefers handler completion
            let pipeline = Arc::clone(&self.pipeline);
            let body_limit = self.config.max_request_body_size;
            let framed_read = &mut self.framed_read;
            let result = {
                tokio::pin! {
                    let handler_fut = pipeline.dispatch(&mut request, response);
                    let pump_fut = pump_body(framed_read, sender, body_limit);
                }
                let mut pump_done = false;
                loop {
                    select! {
                        biased;
                        result = &mut handler_fut => break result,
                        _ = &mut pump_fut, if !pump_done => {
                            pump_done = true;
                        }
                    }
                }
            };
            result
        };

        if let Err(e) = handler_result {
            error!("handler failed, cause: {}", e);
            response.reset();
            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            response.headers_mut().set("Content-Type", "text/plain");
            response.append_body_static("500 Internal Server Error");
        }

        // whatever the handler left unread must leave the socket before
        // the next head read
        let drained = match self.drain_request_body().await {
            Ok(drained) => drained,
            Err(e) => {
                warn!("failed draining request body, cause: {}", e);
                // the framing is broken; answer while we still can, then close
                self.finalize_and_send(&mut request, response, false).await?;
                return Err(e.into());
            }
        };

        let keep_alive = request_keep_alive && drained && !self.shutdown.is_cancelled();
        self.finalize_and_send(&mut request, response, keep_alive).await?;

        Ok(keep_alive)
    }

    /// Consumes payload items until the decoder returns to the head phase.
    /// Returns false when the safety cap was exceeded.
    async fn drain_request_body(&mut self) -> Result<bool, ParseError> {
        let mut drained: u64 = 0;
        while self.framed_read.decoder().is_reading_payload() {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    drained += bytes.len() as u64;
                    if drained > MAX_DRAIN_BYTES {
                        debug!(drained, "unread body exceeds drain cap, will close");
                        return Ok(false);
                    }
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => {}
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("unexpected head while draining body"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed before body end")),
            }
        }
        Ok(true)
    }

    /// Fills the default headers, serializes and flushes the response.
    async fn finalize_and_send(
        &mut self,
        request: &mut Request,
        response: &mut Response,
        keep_alive: bool,
    ) -> Result<(), HttpError> {
        let headers = response.headers_mut();
        if headers.date().is_empty() {
            headers.set("Date", DateService::global().http_date());
        }
        if headers.server().is_empty() {
            headers.set("Server", "coral");
        }
        headers.set("Connection", if keep_alive { "keep-alive" } else { "close" });

        // HEAD responses reuse the full framing but carry no payload bytes
        let suppress_body = request.method() == &Method::HEAD;

        let payload_size = if response.has_body_stream() {
            PayloadSize::Chunked
        } else if response.body().is_empty() {
            PayloadSize::Empty
        } else {
            PayloadSize::Length(response.body().size() as u64)
        };

        let mut packet = Packet::new();
        if suppress_body {
            self.encoder.encode_head_only(response, payload_size, &mut packet);
        } else {
            self.encoder.encode(response, payload_size, &mut packet);
        }
        self.writer.write_all_buf(&mut packet).await.map_err(|e| {
            info!("failed writing response, cause: {}", e);
            SendError::io(e)
        })?;

        if suppress_body {
            response.take_body_stream();
            return Ok(());
        }

        if let Some(mut stream) = response.take_body_stream() {
            let mut chunk_encoder = ChunkedEncoder::new();
            while !chunk_encoder.is_finished() {
                let chunk = stream
                    .read()
                    .await
                    .map_err(|e| SendError::invalid_body(format!("response body stream failed: {e}")))?;

                let mut out = Packet::new();
                if !chunk.data.is_empty() {
                    chunk_encoder.encode(PayloadItem::Chunk(chunk.data), &mut out);
                }
                if chunk.is_end {
                    chunk_encoder.encode(PayloadItem::Eof, &mut out);
                }
                if !out.is_empty() {
                    self.writer.write_all_buf(&mut out).await.map_err(SendError::io)?;
                }
            }
        }

        Ok(())
    }

    /// Answers a terminal error status with an empty body and closes.
    async fn send_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut response = Response::new();
        response.set_status(status);
        response.headers_mut().set("Date", DateService::global().http_date());
        response.headers_mut().set("Server", "coral");
        response.headers_mut().set("Connection", "close");

        let mut packet = Packet::new();
        self.encoder.encode(&mut response, PayloadSize::Empty, &mut packet);
        self.writer.write_all_buf(&mut packet).await.map_err(SendError::io)?;
        Ok(())
    }
}

/// Decodes payload items off the socket and feeds the request's body
/// channel until EOF, a failure, or the handler dropping its stream.
async fn pump_body(
    framed_read: &mut FramedRead<OwnedReadHalf, RequestDecoder>,
    sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    body_limit: u64,
) {
    let mut pumped: u64 = 0;
    loop {
        match framed_read.next().await {
            Some(Ok(Message::Payload(item))) => {
                let eof = item.is_eof();
                if let Some(bytes) = item.as_bytes() {
                    pumped += bytes.len() as u64;
                    if pumped > body_limit {
                        let e = ParseError::too_large_body(pumped, body_limit);
                        let _ = sender.send(Err(e)).await;
                        return;
                    }
                }
                if sender.send(Ok(item)).await.is_err() {
                    // the handler dropped its stream; leave the remaining
                    // bytes to the drain step
                    return;
                }
                if eof {
                    return;
                }
            }
            Some(Ok(Message::Header(_))) => {
                let _ = sender.send(Err(ParseError::invalid_body("unexpected head in request body"))).await;
                return;
            }
            Some(Err(e)) => {
                let _ = sender.send(Err(e)).await;
                return;
            }
            None => {
                let _ =
                    sender.send(Err(ParseError::invalid_body("connection closed before body end"))).await;
                return;
            }
        }
    }
}

/// Applies the keep-alive rules: HTTP/1.1 defaults on, HTTP/1.0 defaults
/// off, an explicit `Connection: close` always wins.
fn keep_alive_requested(request: &Request) -> bool {
    let connection = request.headers().connection();
    let has_token = |token: &str| {
        connection.split(',').any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
    };
    if has_token("close") {
        return false;
    }
    if has_token("keep-alive") {
        return true;
    }
    request.version().default_keep_alive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteStr;
    use crate::protocol::Version;

    fn request_with(version: Version, connection: &'static str) -> Request {
        let mut request = Request::new();
        request.set_version(version);
        if !connection.is_empty() {
            request.headers_mut().set("Connection", ByteStr::from_static(connection));
        }
        request
    }

    #[test]
    fn keep_alive_defaults_follow_version() {
        assert!(keep_alive_requested(&request_with(Version::Http11, "")));
        assert!(!keep_alive_requested(&request_with(Version::Http10, "")));
    }

    #[test]
    fn connection_header_overrides_defaults() {
        assert!(!keep_alive_requested(&request_with(Version::Http11, "close")));
        assert!(keep_alive_requested(&request_with(Version::Http10, "keep-alive")));
        assert!(!keep_alive_requested(&request_with(Version::Http11, "Close")));
        assert!(!keep_alive_requested(&request_with(Version::Http11, "upgrade, close")));
    }
}
