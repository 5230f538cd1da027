/// Errors surfaced by the attitude core (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum AttitudeError {
    #[error("invalid attitude configuration: {0}")]
    Configuration(String),

    #[error("no gyro data available for force-publish (stream never populated)")]
    NoGyroAvailable,

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, AttitudeError>;
