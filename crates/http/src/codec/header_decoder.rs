//! Request head parsing.
//!
//! Decodes the request line and header section from the connection's read
//! buffer into a [`Request`], without copying: httparse tokenizes the
//! buffer in place, the decoder records the byte ranges of the url and of
//! every header name/value, then freezes the header portion of the buffer
//! and materializes the views as shared sub-slices of it. The frozen
//! buffer stays alive for as long as any view does.
//!
//! The decoder also resolves the payload size from Content-Length and
//! Transfer-Encoding according to RFC 7230 §3.3 and enforces the
//! configured limits: request line length, header section size and header
//! count. Limit violations surface as [`ParseError`] values that map to
//! 400/431 at the connection layer.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::Method;
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::buffer::ByteStr;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, Request, Version};

/// Hard upper bound of headers per request; the configured limit is
/// clamped to it because the parse scratch space is stack-allocated.
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Parser limits, taken from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecoderLimits {
    /// Maximum size of the request line in bytes.
    pub max_request_line_size: usize,
    /// Maximum size of the whole header section in bytes.
    pub max_headers_size: usize,
    /// Maximum number of headers.
    pub max_headers_count: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self { max_request_line_size: 4 * 1024, max_headers_size: 8 * 1024, max_headers_count: MAX_HEADER_NUM }
    }
}

/// Decoder for the request head, producing a [`Request`] with its
/// [`PayloadSize`].
#[derive(Debug)]
pub struct HeaderDecoder {
    limits: DecoderLimits,
}

impl HeaderDecoder {
    pub fn new(limits: DecoderLimits) -> Self {
        let mut limits = limits;
        limits.max_headers_count = limits.max_headers_count.min(MAX_HEADER_NUM);
        Self { limits }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(DecoderLimits::default())
    }
}

impl Decoder for HeaderDecoder {
    type Item = (Request, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // the shortest parseable head is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            self.check_request_line(src)?;
            return Ok(None);
        }
        self.check_request_line(src)?;

        let mut parsed = httparse::Request::new(&mut []);
        // SAFETY: an array of MaybeUninit does not require initialization.
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            unsafe { MaybeUninit::uninit().assume_init() };

        let parsed_result = parsed.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(self.limits.max_headers_count),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed request head");
                ensure!(
                    head_size <= self.limits.max_headers_size,
                    ParseError::too_large_header(head_size, self.limits.max_headers_size)
                );

                let header_count = parsed.headers.len();
                ensure!(header_count <= self.limits.max_headers_count, ParseError::too_many_headers(header_count));

                let method =
                    Method::from_bytes(parsed.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
                        .map_err(|_| ParseError::InvalidMethod)?;
                let version = Version::from_minor(parsed.version)?;

                // record the byte spans of the url and all header fields
                // before the borrow of `src` ends
                let path = parsed.path.ok_or(ParseError::InvalidUri)?;
                let url_span = Span::record(src, path.as_bytes());
                let mut spans: [HeaderSpan; MAX_HEADER_NUM] = [HeaderSpan::EMPTY; MAX_HEADER_NUM];
                HeaderSpan::record_all(src, parsed.headers, &mut spans);

                // freeze the head; every view below shares this buffer
                let head = src.split_to(head_size).freeze();

                let mut request = Request::new();
                request.set_method(method);
                request.set_version(version);
                // SAFETY: httparse only accepts the request target as a
                // sequence of printable ASCII bytes.
                request.set_url(unsafe { ByteStr::from_utf8_unchecked(head.slice(url_span.0..url_span.1)) });

                for span in &spans[..header_count] {
                    // SAFETY: httparse validated the name as an ASCII token.
                    let name = unsafe { ByteStr::from_utf8_unchecked(head.slice(span.name.0..span.name.1)) };
                    // values may contain obs-text, so this stays checked
                    let value = ByteStr::from_utf8(head.slice(span.value.0..span.value.1))
                        .map_err(|_| ParseError::invalid_header(format!("header {name} value is not utf-8")))?;
                    request.headers_mut().set(name, value);
                }

                let payload_size = resolve_payload_size(&request)?;
                Ok(Some((request, payload_size)))
            }
            Status::Partial => {
                ensure!(
                    src.len() <= self.limits.max_headers_size,
                    ParseError::too_large_header(src.len(), self.limits.max_headers_size)
                );
                Ok(None)
            }
        }
    }
}

impl HeaderDecoder {
    /// Rejects buffers whose first line never terminates within the
    /// configured request line limit.
    fn check_request_line(&self, src: &[u8]) -> Result<(), ParseError> {
        let window = &src[..src.len().min(self.limits.max_request_line_size)];
        if window.iter().all(|&b| b != b'\n') && src.len() > self.limits.max_request_line_size {
            return Err(ParseError::too_long_request_line(self.limits.max_request_line_size));
        }
        Ok(())
    }
}

/// A half-open byte range inside the head buffer.
#[derive(Clone, Copy)]
struct Span(usize, usize);

impl Span {
    fn record(buffer: &[u8], sub: &[u8]) -> Span {
        let start = sub.as_ptr() as usize - buffer.as_ptr() as usize;
        Span(start, start + sub.len())
    }
}

/// Byte ranges of one header's name and value inside the head buffer.
#[derive(Clone, Copy)]
struct HeaderSpan {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderSpan {
    const EMPTY: HeaderSpan = HeaderSpan { name: (0, 0), value: (0, 0) };

    fn record_all(buffer: &[u8], headers: &[httparse::Header<'_>], spans: &mut [HeaderSpan]) {
        for (header, span) in headers.iter().zip(spans.iter_mut()) {
            let name = Span::record(buffer, header.name.as_bytes());
            let value = Span::record(buffer, header.value);
            span.name = (name.0, name.1);
            span.value = (value.0, value.1);
        }
    }
}

/// Resolves the payload size from the parsed head per RFC 7230 §3.3.
fn resolve_payload_size(request: &Request) -> Result<PayloadSize, ParseError> {
    if !method_allows_body(request) {
        return Ok(PayloadSize::Empty);
    }

    let te = request.headers().transfer_encoding();
    let cl = request.headers().content_length();

    match (te.is_empty(), cl.is_empty()) {
        (true, true) => Ok(PayloadSize::Empty),

        (false, true) => {
            if is_chunked(te.as_str()) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (true, false) => {
            let length = cl
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl} is not u64")))?;
            if length == 0 {
                Ok(PayloadSize::Empty)
            } else {
                Ok(PayloadSize::Length(length))
            }
        }

        (false, false) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present in headers"))
        }
    }
}

/// Requests of these methods carry no body unless headers say otherwise.
fn method_allows_body(request: &Request) -> bool {
    !matches!(
        request.method(),
        &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT
    )
}

/// Chunked only counts when it is the final transfer coding.
fn is_chunked(value: &str) -> bool {
    value.rsplit(',').next().is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(input: &str) -> Result<Option<(Request, PayloadSize)>, ParseError> {
        let mut buf = BytesMut::from(input);
        HeaderDecoder::default().decode(&mut buf)
    }

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked("chunked"));
        assert!(is_chunked("gzip, chunked"));
        assert!(is_chunked(" Chunked "));
        assert!(!is_chunked("chunked, gzip"));
        assert!(!is_chunked("gzip"));
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let (request, payload_size) = decode(str).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.version(), Version::Http11);
        assert_eq!(request.url(), "/index.html");
        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.query(), None);

        assert_eq!(request.headers().host(), "127.0.0.1:8080");
        assert_eq!(request.headers().user_agent(), "curl/7.79.1");
        assert_eq!(request.headers().accept(), "*/*");
    }

    #[test]
    fn leaves_body_bytes_in_buffer() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 3

        123"##};

        let mut buf = BytesMut::from(str);
        let (request, payload_size) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(&buf[..], b"123");
    }

    #[test]
    fn query_string_is_preserved() {
        let str = indoc! {r##"
        GET /index/?a=1&b=2&a=3 HTTP/1.1
        Host: 127.0.0.1:8080
        Connection: keep-alive

        "##};

        let (request, _) = decode(str).unwrap().unwrap();
        assert_eq!(request.url(), "/index/?a=1&b=2&a=3");
        assert_eq!(request.path(), "/index/");
        assert_eq!(request.query(), Some("a=1&b=2&a=3"));
        assert_eq!(request.headers().connection(), "keep-alive");
    }

    #[test]
    fn unknown_headers_are_kept_with_case() {
        let str = indoc! {r##"
        GET / HTTP/1.1
        Host: x
        Sec-Fetch-Mode: navigate

        "##};

        let (request, _) = decode(str).unwrap().unwrap();
        assert_eq!(request.headers().get("Sec-Fetch-Mode").unwrap(), "navigate");
        let mut names = Vec::new();
        request.headers().for_each(|name, _| names.push(name.to_string()));
        assert!(names.contains(&"Sec-Fetch-Mode".to_string()));
    }

    #[test]
    fn chunked_request_resolves_to_chunked_payload() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Host: x
        Transfer-Encoding: chunked

        "##};

        let (_, payload_size) = decode(str).unwrap().unwrap();
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn both_length_headers_is_an_error() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Host: x
        Transfer-Encoding: chunked
        Content-Length: 5

        "##};

        assert!(matches!(decode(str), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn http2_request_line_is_rejected() {
        let result = decode("GET / HTTP/2.0\r\nHost: x\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidVersion(_)) | Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn partial_head_needs_more_data() {
        let result = decode("GET /index.html HTTP/1.1\r\nHost: 127");
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn oversized_request_line_is_rejected() {
        let limits = DecoderLimits { max_request_line_size: 32, ..DecoderLimits::default() };
        let mut decoder = HeaderDecoder::new(limits);
        let long_url = format!("GET /{} HTTP/1.1\r\nHost: x\r\n\r\n", "a".repeat(100));
        let mut buf = BytesMut::from(long_url.as_str());
        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::TooLongRequestLine { .. })));
    }

    #[test]
    fn oversized_header_section_is_rejected() {
        let limits = DecoderLimits { max_headers_size: 64, ..DecoderLimits::default() };
        let mut decoder = HeaderDecoder::new(limits);
        let many = format!("GET / HTTP/1.1\r\nHost: x\r\nX-Fill: {}\r\n\r\n", "y".repeat(128));
        let mut buf = BytesMut::from(many.as_str());
        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn too_many_headers_is_rejected() {
        let limits = DecoderLimits { max_headers_count: 2, ..DecoderLimits::default() };
        let mut decoder = HeaderDecoder::new(limits);
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHost: x\r\nA: 1\r\nB: 2\r\n\r\n");
        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::TooManyHeaders { .. })));
    }
}
