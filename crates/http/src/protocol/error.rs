//! Error types for HTTP protocol handling
//!
//! [`HttpError`] is the top-level error of a connection loop and wraps the
//! two phases that can fail: [`ParseError`] while reading a request and
//! [`SendError`] while writing a response. Parse errors carry enough
//! information for the connection to pick the right terminal status code
//! (400 / 413 / 431) before closing.

use std::io;

use http::StatusCode;
use thiserror::Error;

/// The top-level error type for HTTP connection processing.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Errors that occur while parsing and streaming a request
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    /// Errors that occur while serializing and sending a response
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Errors that occur during HTTP request parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Request line exceeds the configured limit
    #[error("request line exceeds the limit of {max_size} bytes")]
    TooLongRequestLine { max_size: usize },

    /// Header section size exceeds the configured limit
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    /// Number of headers exceeds the configured limit
    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Declared body length exceeds the configured limit
    #[error("request body of {length} bytes exceed the limit {max_size}")]
    TooLargeBody { length: u64, max_size: u64 },

    /// Invalid header format or content
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Unsupported HTTP version; the HTTP/2 path is not implemented
    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    /// Invalid or unsupported HTTP method
    #[error("invalid http method")]
    InvalidMethod,

    /// Invalid URI format
    #[error("invalid http uri")]
    InvalidUri,

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Invalid request body
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// I/O error during parsing
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_long_request_line(max_size: usize) -> Self {
        Self::TooLongRequestLine { max_size }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn too_large_body(length: u64, max_size: u64) -> Self {
        Self::TooLargeBody { length, max_size }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The status code the connection answers with before closing.
    ///
    /// Limit violations map to 431 (header limits) and 413 (body limit),
    /// everything else is a plain 400.
    pub fn response_status(&self) -> StatusCode {
        match self {
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            Self::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors that occur during HTTP response serialization and sending.
#[derive(Error, Debug)]
pub enum SendError {
    /// Invalid response body
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// I/O error during sending
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
