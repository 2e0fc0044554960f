//! Error types for LIIKE

use thiserror::Error;

/// Result type alias for LIIKE operations
pub type Result<T> = std::result::Result<T, LiikeError>;

/// Main error type for LIIKE
#[derive(Error, Debug)]
pub enum LiikeError {
    /// Bad or missing configuration (fix the input, then retry)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level connection failure
    #[error("connect failed: {reason}")]
    Connect { reason: String },

    /// Broker rejected the topic subscription after a successful connect
    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// A single inbound message could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Best-effort publish failed
    #[error("publish failed: {reason}")]
    Publish { reason: String },

    /// Best-effort teardown failed
    #[error("disconnect failed: {reason}")]
    Disconnect { reason: String },

    /// Another connect is already in flight for this client
    #[error("a connection attempt is already in progress")]
    Busy,

    /// The client already has an active session
    #[error("client is already connected")]
    AlreadyConnected,

    /// A pending connect was cancelled by `disconnect`
    #[error("connection attempt cancelled")]
    Cancelled,

    /// Rejected recording input
    #[error("validation error: {0}")]
    Validation(String),

    /// Activity already known (case-insensitive)
    #[error("activity '{name}' already exists")]
    DuplicateActivity { name: String },

    /// `save` called with an empty accumulation log
    #[error("no samples collected")]
    NoData,

    /// Persistence collaborator failed
    #[error("store '{store}' failed: {reason}")]
    Persist { store: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl LiikeError {
    /// Errors a caller may reasonably retry without changing input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiikeError::Connect { .. }
                | LiikeError::Subscribe { .. }
                | LiikeError::Busy
                | LiikeError::Persist { .. }
                | LiikeError::Publish { .. }
        )
    }
}

/// Why a raw payload was rejected by the decoder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not a well-formed JSON object
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A required field is absent
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A field is present but not a number
    #[error("field '{0}' is not numeric")]
    NotNumeric(&'static str),

    /// A field is a number but not finite
    #[error("field '{0}' is not finite")]
    NonFinite(&'static str),

    /// Timestamp is fractional or out of range
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
