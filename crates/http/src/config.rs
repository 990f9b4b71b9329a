//! Server configuration and listen address parsing.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DecoderLimits;

/// Recognized server options. An outer layer may deserialize this from any
/// serde-supported format; everything has a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Addresses to listen on, `"ip:port"` or `":port"`.
    pub listen_addresses: Vec<String>,
    /// Capacity of the per-connection read buffer in bytes.
    pub max_initial_request_packet_size: usize,
    /// Maximum size of the request line in bytes.
    pub max_initial_request_line_size: usize,
    /// Maximum size of the request header section in bytes.
    pub max_request_headers_size: usize,
    /// Maximum number of request headers.
    pub max_request_headers_count: usize,
    /// Maximum declared request body size in bytes; larger bodies get 413.
    pub max_request_body_size: u64,
    /// Time budget for reading a complete request head.
    pub request_timeout_ms: u64,
    /// Idle time budget between keep-alive requests.
    pub keepalive_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addresses: Vec::new(),
            max_initial_request_packet_size: 8 * 1024,
            max_initial_request_line_size: 4 * 1024,
            max_request_headers_size: 8 * 1024,
            max_request_headers_count: 64,
            max_request_body_size: 16 * 1024 * 1024,
            request_timeout_ms: 30_000,
            keepalive_timeout_ms: 60_000,
        }
    }
}

impl ServerConfig {
    pub(crate) fn decoder_limits(&self) -> DecoderLimits {
        DecoderLimits {
            max_request_line_size: self.max_initial_request_line_size,
            max_headers_size: self.max_request_headers_size,
            max_headers_count: self.max_request_headers_count,
        }
    }
}

/// Errors from parsing a configured listen address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid listen address '{address}': expected 'ip:port' or ':port'")]
    InvalidFormat { address: String },

    #[error("invalid listen address '{address}': ip must be an ipv4 dotted quad")]
    InvalidIp { address: String },

    #[error("invalid listen address '{address}': port must be 1-65535")]
    InvalidPort { address: String },
}

/// Parses a socket listen address.
///
/// Supported formats:
/// - `"ip:port"`, e.g. `"0.0.0.0:80"`
/// - `":port"`, e.g. `":80"` (binds every interface)
///
/// Hostnames are unsupported.
pub fn parse_listen_address(address: &str) -> Result<SocketAddr, AddressError> {
    let invalid_format = || AddressError::InvalidFormat { address: address.to_string() };

    let (host, port) = address.rsplit_once(':').ok_or_else(invalid_format)?;

    let port: u16 = port
        .parse()
        .ok()
        .filter(|&port| port != 0)
        .ok_or(AddressError::InvalidPort { address: address.to_string() })?;

    let ip = if host.is_empty() {
        Ipv4Addr::UNSPECIFIED
    } else {
        host.parse::<Ipv4Addr>().map_err(|_| AddressError::InvalidIp { address: address.to_string() })?
    };

    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}
