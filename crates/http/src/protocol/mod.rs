//! Protocol data model: requests, responses, headers, payload vocabulary
//! and the error taxonomy shared by the codec and the connection.

mod error;
mod extensions;
mod headers;
mod message;
pub(crate) mod request;
mod response;
mod version;

pub use error::{HttpError, ParseError, SendError};
pub use extensions::Extensions;
pub use headers::{RequestHeaders, ResponseHeaders};
pub use message::{Message, PayloadItem, PayloadSize};
pub use request::Request;
pub use response::Response;
pub use version::Version;
