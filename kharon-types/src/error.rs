/// Errors shared across the Kharon pipeline stages.
///
/// Follows the error-kind taxonomy of spec §7: configuration errors are
/// fatal at startup, I/O errors are meant to be recovered locally by the
/// caller (this type just carries them up for logging), and
/// `InvariantViolation` is reserved for conditions the design treats as
/// bugs -- logged and the process exits, never caught and retried.
#[derive(thiserror::Error, Debug)]
pub enum KharonError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("stream '{0}' has gone stale")]
    StreamStale(String),

    #[error("no gyro data available for publication")]
    NoGyroAvailable,
}

impl KharonError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        KharonError::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        KharonError::InvariantViolation(msg.into())
    }
}
