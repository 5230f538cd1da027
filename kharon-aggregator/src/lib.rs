//! Sensor Aggregator (spec §4.A): polls a heterogeneous set of IMU
//! subsensors on fixed per-sensor cadences, applies per-axis gain/offset/
//! alignment, subtracts gyro drift, and emits timestamped fused samples.

mod aggregator;
mod device;
mod drift;
mod error;
mod wire;

pub use aggregator::{Aggregator, RunState};
pub use device::{SensorDescriptor, SensorDevice, IO_ERROR_DISABLE_THRESHOLD};
pub use drift::{DriftEstimator, DEFAULT_DRIFT_TAU_SEC, DEFAULT_FAST_DRIFT_TAU_SEC};
pub use error::{AggregatorError, Result};
pub use wire::{PacketHeader, SensorPacket, MAX_LOG_TEXT_BYTES, PACKET_TYPE_IMU};

#[cfg(test)]
mod tests {
    use super::*;
    use kharon_types::{AvailFlags, MasterClock, Mat3, Priority, SensorSample, Timestamp, Vec3};
    use std::sync::Arc;
    use std::time::Duration;

    /// A trivial in-memory sensor used to test the aggregator's fusion and
    /// failure-handling logic without real I2C hardware.
    struct FakeSensor {
        name: String,
        sample: SensorSample,
        fail_next_n: u32,
    }

    impl FakeSensor {
        fn new(name: &str, gyro: Vec3) -> Self {
            FakeSensor {
                name: name.to_string(),
                sample: SensorSample {
                    timestamp: Timestamp::ZERO,
                    gyro_dps: gyro,
                    accel_g: Vec3::new(0.0, 0.0, 1.0),
                    mag: Vec3::new(1.0, 0.0, 0.0),
                    temp_c: 20.0,
                    avail: AvailFlags::GYRO | AvailFlags::ACCEL | AvailFlags::MAG,
                },
                fail_next_n: 0,
            }
        }
    }

    impl SensorDevice for FakeSensor {
        fn name(&self) -> &str {
            &self.name
        }
        fn setup(&mut self) -> Result<()> {
            Ok(())
        }
        fn update(&mut self) -> Result<AvailFlags> {
            if self.fail_next_n > 0 {
                self.fail_next_n -= 1;
                return Err(AggregatorError::Io {
                    device: self.name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "fake I/O failure"),
                });
            }
            Ok(self.sample.avail)
        }
        fn last_sample(&self) -> SensorSample {
            self.sample
        }
        fn shutdown(&mut self) {}
    }

    fn descriptor(name: &str, gyro: Vec3, priority: Priority) -> SensorDescriptor {
        SensorDescriptor::new(
            Box::new(FakeSensor::new(name, gyro)),
            priority,
            Duration::from_millis(10),
            Duration::ZERO,
            Mat3::IDENTITY,
            DriftEstimator::new(Vec3::ZERO),
            AvailFlags::GYRO | AvailFlags::ACCEL | AvailFlags::MAG,
        )
    }

    #[test]
    fn fusion_is_confidence_weighted_average() {
        let sensors = vec![
            descriptor("gyro-a", Vec3::new(1.0, 0.0, 0.0), Priority::P1),
            descriptor("gyro-b", Vec3::new(3.0, 0.0, 0.0), Priority::P1),
        ];
        let clock = Arc::new(MasterClock::new());
        let mut agg = Aggregator::new(sensors, clock).unwrap();
        agg.setup_all().unwrap();
        let run_state = RunState::new();
        // Drain until we get a fused sample (first iteration may return
        // None if nothing was due yet at the exact instant of polling).
        let mut sample = None;
        for _ in 0..5 {
            if let Some(s) = agg.run_once(&run_state) {
                sample = Some(s);
                break;
            }
        }
        let sample = sample.expect("expected a fused sample");
        // Equal P1 weight on both devices -> arithmetic mean.
        assert!((sample.gyro_dps.x() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn all_sensors_inactive_signals_done() {
        let mut fake = FakeSensor::new("only", Vec3::ZERO);
        fake.fail_next_n = u32::MAX as u32; // effectively "always fails"
        let fake = Box::new(fake);
        let sensors = vec![SensorDescriptor::new(
            fake,
            Priority::P1,
            Duration::from_millis(1),
            Duration::ZERO,
            Mat3::IDENTITY,
            DriftEstimator::new(Vec3::ZERO),
            AvailFlags::GYRO,
        )];
        let clock = Arc::new(MasterClock::new());
        let mut agg = Aggregator::new(sensors, clock).unwrap();
        agg.setup_all().unwrap();
        let run_state = RunState::new();
        for _ in 0..(IO_ERROR_DISABLE_THRESHOLD as usize + 2) {
            agg.run_once(&run_state);
            if run_state.is_done() {
                break;
            }
        }
        assert!(run_state.is_done());
    }
}
