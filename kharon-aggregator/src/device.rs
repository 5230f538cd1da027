use crate::drift::DriftEstimator;
use crate::error::Result;
use kharon_types::{AvailFlags, Mat3, Priority, SensorSample};
use std::time::{Duration, Instant};

/// Capability set every concrete sensor implements (spec §9: "function
/// pointers on sensor descriptors become a small capability set"). The
/// aggregator stores heterogeneous sensors as `Box<dyn SensorDevice>`.
pub trait SensorDevice: Send {
    fn name(&self) -> &str;

    /// One-time setup, e.g. opening the I2C bus handle. Configuration
    /// errors here are fatal at startup (spec §7.1).
    fn setup(&mut self) -> Result<()>;

    /// Optional one-shot self test, run once after setup.
    fn self_test(&mut self) -> Result<()> {
        Ok(())
    }

    /// Poll the device once. Returns the modalities that produced valid
    /// data on this poll. An `Err` here is a transient I/O error (spec
    /// §7.2): the caller disables the modality that failed, not the whole
    /// device.
    fn update(&mut self) -> Result<AvailFlags>;

    /// The most recent raw sample pulled by `update`.
    fn last_sample(&self) -> SensorSample;

    fn shutdown(&mut self);
}

/// Per-sensor configuration and runtime state wrapping a boxed
/// [`SensorDevice`] (spec §4.A).
pub struct SensorDescriptor {
    pub device: Box<dyn SensorDevice>,
    pub priority: Priority,
    pub poll_interval: Duration,
    pub warm_up: Duration,
    pub axis_alignment: Mat3,
    pub drift: DriftEstimator,
    /// Modalities this device is configured to contribute, before any
    /// runtime failures disable a subset of them.
    pub configured_modalities: AvailFlags,
    /// Modalities presently active (configured minus any disabled by I/O
    /// failure, spec §4.A failure semantics).
    active_modalities: AvailFlags,
    next_wake: Instant,
    io_error_streak: u32,
}

/// A device disables a modality after this many consecutive I/O errors on
/// that modality (spec §7.2 "rate-limited threshold").
pub const IO_ERROR_DISABLE_THRESHOLD: u32 = 5;

impl SensorDescriptor {
    pub fn new(
        device: Box<dyn SensorDevice>,
        priority: Priority,
        poll_interval: Duration,
        warm_up: Duration,
        axis_alignment: Mat3,
        drift: DriftEstimator,
        configured_modalities: AvailFlags,
    ) -> Self {
        SensorDescriptor {
            device,
            priority,
            poll_interval,
            warm_up,
            axis_alignment,
            drift,
            configured_modalities,
            active_modalities: configured_modalities,
            next_wake: Instant::now() + warm_up,
            io_error_streak: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.active_modalities.is_empty()
    }

    pub fn active_modalities(&self) -> AvailFlags {
        self.active_modalities
    }

    pub fn next_wake(&self) -> Instant {
        self.next_wake
    }

    /// Poll this device if its deadline has passed. Returns `Ok(true)` if
    /// the device produced a sample, `Ok(false)` if it was skipped because
    /// its deadline hadn't arrived.
    pub fn poll_if_due(&mut self, now: Instant) -> Result<bool> {
        if now < self.next_wake {
            return Ok(false);
        }
        self.next_wake += self.poll_interval;
        // A device that overslept its own deadline (e.g. because the
        // acquisition thread itself fell behind) catches up to "now plus
        // one interval" rather than firing a burst of stale polls.
        if self.next_wake < now {
            self.next_wake = now + self.poll_interval;
        }
        match self.device.update() {
            Ok(avail) => {
                self.io_error_streak = 0;
                self.active_modalities = self.configured_modalities & avail;
                Ok(true)
            }
            Err(err) => {
                self.io_error_streak += 1;
                if self.io_error_streak >= IO_ERROR_DISABLE_THRESHOLD {
                    tracing::warn!(
                        device = self.device.name(),
                        "disabling device after repeated I/O errors: {err}"
                    );
                    self.active_modalities = AvailFlags::empty();
                }
                Err(err)
            }
        }
    }

    /// Apply axis alignment and drift correction to the device's most
    /// recent gyro reading, producing the corrected sample used in fusion.
    pub fn corrected_sample(&mut self, dt_sec: f64) -> SensorSample {
        let mut sample = self.device.last_sample();
        let aligned_gyro = self.axis_alignment.mul_vec(&sample.gyro_dps);
        sample.gyro_dps = self.drift.update(aligned_gyro, dt_sec);
        sample.accel_g = self.axis_alignment.mul_vec(&sample.accel_g);
        sample.mag = self.axis_alignment.mul_vec(&sample.mag);
        sample.avail = self.active_modalities;
        sample
    }

}
