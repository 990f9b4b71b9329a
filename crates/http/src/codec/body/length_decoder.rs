//! Decoder for bodies with a known Content-Length (RFC 7230 §3.3.2).

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Counts down the declared content length, handing out zero-copy slices
/// of the read buffer until the body is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64) as usize;
        let bytes = src.split_to(len).freeze();
        self.remaining -= bytes.len() as u64;

        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exactly_the_declared_length() {
        let mut buffer = BytesMut::from(&b"0123456789rest"[..]);
        let mut decoder = LengthDecoder::new(10);

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"0123456789");
        assert_eq!(&buffer[..], b"rest");

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn reads_across_partial_buffers() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut decoder = LengthDecoder::new(5);

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"abc");

        // need more data
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"deXYZ");
        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&item.as_bytes().unwrap()[..], b"de");
        assert_eq!(&buffer[..], b"XYZ");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
