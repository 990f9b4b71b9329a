//! The request data object.
//!
//! A [`Request`] only carries data so it can be built by hand in tests:
//! method, url and version from the request line, the fixed-slot header
//! collection, an optional body stream and a per-request extension map
//! (route parameters, service scopes). Url and header views share the
//! frozen read buffer, so the request keeps that buffer alive for exactly
//! as long as any view exists.

use std::fmt::{self, Debug, Formatter};

use http::Method;

use crate::buffer::ByteStr;
use crate::protocol::{Extensions, RequestHeaders, Version};
use crate::stream::InputStream;

pub struct Request {
    method: Method,
    url: ByteStr,
    version: Version,
    headers: RequestHeaders,
    body: Option<Box<dyn InputStream>>,
    extensions: Extensions,
}

impl Request {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            url: ByteStr::new(),
            version: Version::default(),
            headers: RequestHeaders::new(),
            body: None,
            extensions: Extensions::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The raw request target, e.g. `/index?a=1`.
    pub fn url(&self) -> &ByteStr {
        &self.url
    }

    pub fn set_url(&mut self, url: ByteStr) {
        self.url = url;
    }

    /// The path portion of the url, without the query string.
    pub fn path(&self) -> &str {
        match self.url.find('?') {
            Some(pos) => &self.url.as_str()[..pos],
            None => self.url.as_str(),
        }
    }

    /// The query string after `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.url.find('?').map(|pos| &self.url.as_str()[pos + 1..])
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.headers
    }

    /// The body stream, if this request carries a body.
    pub fn body_stream_mut(&mut self) -> Option<&mut (dyn InputStream + 'static)> {
        self.body.as_deref_mut()
    }

    pub fn set_body_stream(&mut self, stream: Box<dyn InputStream>) {
        self.body = Some(stream);
    }

    pub fn take_body_stream(&mut self) -> Option<Box<dyn InputStream>> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Reads the whole body into one buffer. Convenience for handlers that
    /// want the complete payload; streaming handlers should read chunks.
    pub async fn read_body(&mut self) -> Result<Vec<u8>, crate::protocol::ParseError> {
        let mut out = Vec::new();
        let Some(stream) = self.body.as_deref_mut() else {
            return Ok(out);
        };
        loop {
            let chunk = stream.read().await?;
            out.extend_from_slice(&chunk.data);
            if chunk.is_end {
                return Ok(out);
            }
        }
    }

    /// Per-request attachments, e.g. route parameters.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns the request to its blank state, keeping allocations where
    /// possible. Called between keep-alive cycles.
    pub fn reset(&mut self) {
        self.method = Method::GET;
        self.url = ByteStr::new();
        self.version = Version::default();
        self.headers.clear();
        self.body = None;
        self.extensions.clear();
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("version", &self.version)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_and_query_split() {
        let mut request = Request::new();
        request.set_url(ByteStr::from_static("/index/?a=1&b=2"));
        assert_eq!(request.path(), "/index/");
        assert_eq!(request.query(), Some("a=1&b=2"));

        request.set_url(ByteStr::from_static("/plain"));
        assert_eq!(request.path(), "/plain");
        assert_eq!(request.query(), None);
    }

    #[test]
    fn reset_clears_all_request_state() {
        let mut request = Request::new();
        request.set_method(Method::POST);
        request.set_url(ByteStr::from_static("/submit"));
        request.headers_mut().set("Host", "example.org");
        request.extensions_mut().insert(42_u32);

        request.reset();
        assert_eq!(request.method(), &Method::GET);
        assert!(request.url().is_empty());
        assert!(request.headers().get("Host").is_none());
        assert!(request.extensions().get::<u32>().is_none());
    }
}
