//! coral-http: the async HTTP/1.x server core.
//!
//! The crate is organized around one connection loop per socket:
//!
//! - [`buffer`]: refcounted byte views and the scatter-gather [`buffer::Packet`]
//! - [`protocol`]: request/response data objects, header collections and
//!   the error taxonomy
//! - [`stream`]: lazy chunked body readers
//! - [`codec`]: the streaming request decoder and response encoder
//! - [`handler`]: the middleware-style handler pipeline
//! - [`connection`]: the per-connection HTTP/1.x state machine
//! - [`server`]: listener set, accept loops and graceful stop
//! - [`config`]: recognized options and listen address parsing
//! - [`date`]: the once-per-second Date header cache

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod date;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod stream;

mod utils;

pub(crate) use utils::ensure;
