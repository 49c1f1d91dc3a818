use thiserror::Error;

/// Canonical result for every cascade crate.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Failure carried through a pipeline.
///
/// A single error is fanned out to every partner of the failing operator, so
/// the type is cheap to clone and comparable in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Malformed length prefix or record boundary.
    #[error("framing error: {0}")]
    Framing(String),

    /// Bad magic, checksum mismatch, or inconsistent block header.
    #[error("corrupted stream: {0}")]
    Corruption(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stream cancelled: {0}")]
    Cancelled(String),

    /// Application-supplied failure, passed through untouched.
    #[error("{0}")]
    Custom(String),
}

impl StreamError {
    pub fn custom(msg: impl Into<String>) -> Self {
        StreamError::Custom(msg.into())
    }

    /// True for errors raised by a damaged byte stream rather than by a partner.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            StreamError::Framing(_) | StreamError::Corruption(_) | StreamError::Codec(_)
        )
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Config(e.to_string())
    }
}
