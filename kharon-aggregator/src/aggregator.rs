use crate::device::SensorDescriptor;
use crate::error::{AggregatorError, Result};
use kharon_types::{AvailFlags, MasterClock, Priority, SensorSample, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag, the Rust re-expression of the original's
/// `run_state` word carrying a `DP_STATE_DONE` bit (spec §5). Polled at
/// suspension points; `abort()` flips it and the sleeping thread notices
/// on its next wake (here, we additionally cap the sleep so the thread
/// re-checks at least once a second even with no sensors due).
#[derive(Clone, Default)]
pub struct RunState(Arc<AtomicBool>);

impl RunState {
    pub fn new() -> Self {
        RunState(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_done(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn signal_done(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Drives a set of heterogeneous sensor descriptors on a single
/// acquisition thread (spec §4.A).
pub struct Aggregator {
    sensors: Vec<SensorDescriptor>,
    clock: Arc<MasterClock>,
    last_fuse_time: Option<Instant>,
}

/// Confidence-weighted fusion of a modality across active devices.
/// Priority acts as the confidence weight (P1=1.0, P2=0.5, P3=0.25),
/// matching the weighting scheme the attitude core applies downstream
/// (spec §4.B) so the aggregator's own cross-device fusion is consistent
/// with it.
fn priority_weight(p: Priority) -> f64 {
    match p {
        Priority::P1 => 1.0,
        Priority::P2 => 0.5,
        Priority::P3 => 0.25,
    }
}

impl Aggregator {
    pub fn new(sensors: Vec<SensorDescriptor>, clock: Arc<MasterClock>) -> Result<Self> {
        if sensors.is_empty() {
            return Err(AggregatorError::Configuration(
                "no sensors configured".into(),
            ));
        }
        Ok(Aggregator {
            sensors,
            clock,
            last_fuse_time: None,
        })
    }

    fn earliest_wake(&self) -> Instant {
        self.sensors
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.next_wake())
            .min()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(1))
    }

    /// Run setup + (optional) self-test on every sensor. Returns an error
    /// only for configuration problems; per-sensor I/O failures during
    /// self-test are logged and leave the sensor inactive rather than
    /// aborting the whole aggregator.
    pub fn setup_all(&mut self) -> Result<()> {
        for sensor in &mut self.sensors {
            if let Err(e) = sensor.device.setup() {
                tracing::error!(device = sensor.device.name(), "setup failed: {e}");
                return Err(e);
            }
            if let Err(e) = sensor.device.self_test() {
                tracing::warn!(device = sensor.device.name(), "self-test failed: {e}");
            }
        }
        Ok(())
    }

    /// One iteration: sleep until the earliest sensor waketime, update
    /// every sensor whose deadline has passed, then fuse a consensus
    /// sample. Missing a deadline (because the thread woke late) logs a
    /// timing error but never aborts (spec §4.A).
    pub fn run_once(&mut self, run_state: &RunState) -> Option<SensorSample> {
        let wake_at = self.earliest_wake();
        let now = Instant::now();
        if wake_at > now {
            // Cap the sleep so cancellation is noticed promptly even if no
            // sensor is due soon.
            let dur = (wake_at - now).min(Duration::from_secs(1));
            std::thread::sleep(dur);
        }
        if run_state.is_done() {
            return None;
        }

        let now = Instant::now();
        let mut any_due = false;
        for sensor in &mut self.sensors {
            if !sensor.is_active() {
                continue;
            }
            let deadline = sensor.next_wake();
            match sensor.poll_if_due(now) {
                Ok(true) => any_due = true,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(device = sensor.device.name(), "I/O error: {e}");
                }
            }
            if deadline + Duration::from_millis(50) < now {
                tracing::error!(
                    device = sensor.device.name(),
                    "missed poll deadline by {:?}",
                    now - deadline
                );
            }
        }

        if self.sensors.iter().all(|s| !s.is_active()) {
            tracing::error!("all sensors inactive, aggregator exiting");
            run_state.signal_done();
            return None;
        }
        if !any_due {
            return None;
        }

        let dt_sec = match self.last_fuse_time {
            Some(prev) => now.duration_since(prev).as_secs_f64(),
            None => 0.0,
        };
        self.last_fuse_time = Some(now);

        Some(self.fuse(dt_sec))
    }

    /// Confidence-weighted average across active devices of the same
    /// modality. A modality with no live contributing device is marked
    /// unavailable and left at zero (spec §4.A).
    fn fuse(&mut self, dt_sec: f64) -> SensorSample {
        let mut gyro = Vec3::ZERO;
        let mut gyro_wt = 0.0;
        let mut accel = Vec3::ZERO;
        let mut accel_wt = 0.0;
        let mut mag = Vec3::ZERO;
        let mut mag_wt = 0.0;
        let mut temp_sum = 0.0;
        let mut temp_n = 0u32;
        let mut avail = AvailFlags::empty();

        for sensor in &mut self.sensors {
            if !sensor.is_active() {
                continue;
            }
            let active = sensor.active_modalities();
            let weight = priority_weight(sensor.priority);
            let sample = sensor.corrected_sample(dt_sec);
            if active.contains(AvailFlags::GYRO) {
                gyro.add_weighted(&sample.gyro_dps, weight);
                gyro_wt += weight;
                avail |= AvailFlags::GYRO;
            }
            if active.contains(AvailFlags::ACCEL) {
                accel.add_weighted(&sample.accel_g, weight);
                accel_wt += weight;
                avail |= AvailFlags::ACCEL;
            }
            if active.contains(AvailFlags::MAG) {
                mag.add_weighted(&sample.mag, weight);
                mag_wt += weight;
                avail |= AvailFlags::MAG;
            }
            if active.contains(AvailFlags::TEMP) {
                temp_sum += sample.temp_c;
                temp_n += 1;
                avail |= AvailFlags::TEMP;
            }
        }

        if gyro_wt > 0.0 {
            gyro = gyro * (1.0 / gyro_wt);
        }
        if accel_wt > 0.0 {
            accel = accel * (1.0 / accel_wt);
        }
        if mag_wt > 0.0 {
            mag = mag * (1.0 / mag_wt);
        }
        let temp_c = if temp_n > 0 {
            temp_sum / temp_n as f64
        } else {
            0.0
        };

        SensorSample {
            timestamp: self.clock.now(),
            gyro_dps: gyro,
            accel_g: accel,
            mag,
            temp_c,
            avail,
        }
    }

    pub fn shutdown(&mut self) {
        for sensor in &mut self.sensors {
            sensor.device.shutdown();
        }
    }
}
