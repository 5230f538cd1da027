use crate::{Timestamp, Vec3};
use serde::{Deserialize, Serialize};

/// Static priority ranking assigned to a sensor stream in configuration
/// (spec Glossary). Quorum and weighting use these classes; `Ord` is
/// derived in declaration order so `P1 < P2 < P3` sorts "most trusted
/// first", matching the IMU_PRI_1..3 enum of the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

bitflags::bitflags! {
    /// Which modalities a producing sensor contributed to a sample
    /// (spec §3 `avail_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct AvailFlags: u8 {
        const GYRO = 0b0001;
        const ACCEL = 0b0010;
        const MAG = 0b0100;
        const TEMP = 0b1000;
    }
}

/// A single fused sample from a sensor device (spec §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub timestamp: Timestamp,
    pub gyro_dps: Vec3,
    pub accel_g: Vec3,
    pub mag: Vec3,
    pub temp_c: f64,
    pub avail: AvailFlags,
}

impl SensorSample {
    pub fn empty(timestamp: Timestamp) -> Self {
        SensorSample {
            timestamp,
            gyro_dps: Vec3::ZERO,
            accel_g: Vec3::ZERO,
            mag: Vec3::ZERO,
            temp_c: 0.0,
            avail: AvailFlags::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avail_flags_compose() {
        let mut flags = AvailFlags::empty();
        flags.insert(AvailFlags::GYRO);
        flags.insert(AvailFlags::MAG);
        assert!(flags.contains(AvailFlags::GYRO));
        assert!(flags.contains(AvailFlags::MAG));
        assert!(!flags.contains(AvailFlags::ACCEL));
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::P1 < Priority::P2);
        assert!(Priority::P2 < Priority::P3);
    }
}
