/// Errors surfaced by the panorama stitcher (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum PanoramaError {
    #[error("invalid panorama configuration: {0}")]
    Configuration(String),

    #[error("source frame dimensions ({width}x{height}) do not match configured camera geometry")]
    FrameGeometryMismatch { width: u32, height: u32 },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed image packet or handshake: {0}")]
    Wire(String),
}

pub type Result<T> = std::result::Result<T, PanoramaError>;
