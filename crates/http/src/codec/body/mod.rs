//! Body codecs: fixed-length and chunked decoding, chunked encoding.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;
