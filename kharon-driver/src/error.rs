/// Errors surfaced by the driver (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("invalid driver configuration: {0}")]
    Configuration(String),

    #[error("serial I/O error: {0}")]
    Io(String),

    #[error("malformed serial packet: {0}")]
    Framing(String),

    #[error(transparent)]
    Router(#[from] kharon_router::RouterError),
}

pub type Result<T> = std::result::Result<T, DriverError>;
