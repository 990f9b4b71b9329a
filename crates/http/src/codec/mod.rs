//! HTTP/1.x codec: streaming request decoding and response encoding.
//!
//! - [`RequestDecoder`]: head phase + payload phase state machine, driven
//!   by the connection through a `FramedRead`
//! - [`HeaderDecoder`]: zero-copy request head parsing with configured
//!   limits
//! - [`body`]: fixed-length and chunked body decoders, chunked encoder
//! - [`ResponseEncoder`]: serializes a response into one scatter-gather
//!   packet for a single vectored flush

pub mod body;
mod header_decoder;
mod request_decoder;
mod response_encoder;

pub use header_decoder::{DecoderLimits, HeaderDecoder};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
