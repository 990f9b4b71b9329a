use crate::protocol::ParseError;

/// The HTTP protocol versions this server speaks.
///
/// HTTP/2 and HTTP/3 are not implemented; request lines carrying any other
/// version fail parsing with [`ParseError::InvalidVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// The version token as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Builds a version from the minor number httparse reports.
    pub fn from_minor(minor: Option<u8>) -> Result<Self, ParseError> {
        match minor {
            Some(0) => Ok(Version::Http10),
            Some(1) => Ok(Version::Http11),
            other => Err(ParseError::InvalidVersion(other)),
        }
    }

    /// Whether this version keeps connections alive by default.
    pub fn default_keep_alive(&self) -> bool {
        matches!(self, Version::Http11)
    }
}
