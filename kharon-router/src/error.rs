/// Errors surfaced by the router (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid router configuration: {0}")]
    Configuration(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, RouterError>;
