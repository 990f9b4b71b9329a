//! The streaming request decoder.
//!
//! Drives two phases over the connection's read buffer: the head phase
//! (request line + headers, via [`HeaderDecoder`]) and the payload phase
//! (via [`PayloadDecoder`]). The active payload decoder doubles as the
//! phase marker: while it is present, decoded items are body chunks; once
//! it reports EOF the decoder returns to the head phase for the next
//! keep-alive request.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header_decoder::{DecoderLimits, HeaderDecoder};
use crate::protocol::{Message, ParseError, PayloadItem};

#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(limits: DecoderLimits) -> Self {
        Self { header_decoder: HeaderDecoder::new(limits), payload_decoder: None }
    }

    /// True while the decoder is in the payload phase, i.e. the current
    /// request's body has not reported EOF yet. The connection consults
    /// this to decide whether body bytes still need draining.
    pub fn is_reading_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(DecoderLimits::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body complete, back to the head phase
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((request, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header(Box::new((request, payload_size))))
            }
            None => None,
        };

        Ok(message)
    }
}
