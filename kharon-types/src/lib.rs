//! Shared data model for the Kharon navigation core.
//!
//! Every pipeline stage (sensor aggregator, attitude core, panorama,
//! router, driver) depends on this crate for timestamps, geometry
//! primitives, binary-angle measures and the sample/error types that
//! cross stage boundaries.

mod angle;
mod error;
mod sample;
mod timestamp;
mod vector;

pub use angle::{Bam16, Bam32, Bam8};
pub use error::KharonError;
pub use sample::{AvailFlags, Priority, SensorSample};
pub use timestamp::{MasterClock, Timestamp};
pub use vector::{Mat3, Vec3};

/// Result type used throughout the Kharon crates.
pub type Result<T> = std::result::Result<T, KharonError>;
