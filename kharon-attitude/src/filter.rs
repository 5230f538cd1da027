use kharon_types::{Bam32, Vec3};

/// Default blend time constant mixing the gyro-integrated estimate with the
/// accel/mag observation (spec §4.B "complementary filter").
pub const DEFAULT_BLEND_TAU_SEC: f64 = 1.0;

/// Time constant of the secondary low-pass that tracks the slowly-varying
/// residual between the integrated estimate and the accel/mag observation,
/// fed back as a bias correction on the gyro rate (spec §4.B, §9).
pub const DEFAULT_RESIDUAL_TAU_SEC: f64 = 30.0;

/// Output of one filter tick.
#[derive(Debug, Clone, Copy)]
pub struct AttitudeEstimate {
    pub heading: Bam32,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    /// Yaw rate with the estimated slow bias already subtracted.
    pub turn_rate_dps: f64,
}

/// Complementary filter over gyro (integrated) and accel/mag (absolute but
/// noisy) attitude, with a secondary low-pass residual tracker used to
/// compensate the slow bias drift the aggregator's own drift estimator
/// didn't already remove (spec §4.B, §9).
#[derive(Debug, Clone)]
pub struct ComplementaryFilter {
    blend_tau_sec: f64,
    residual_tau_sec: f64,
    heading_deg: f64,
    pitch_deg: f64,
    roll_deg: f64,
    yaw_bias_dps: f64,
    initialized: bool,
}

impl ComplementaryFilter {
    pub fn new(blend_tau_sec: f64, residual_tau_sec: f64) -> Self {
        ComplementaryFilter {
            blend_tau_sec,
            residual_tau_sec,
            heading_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            yaw_bias_dps: 0.0,
            initialized: false,
        }
    }

    /// Advance the filter by `dt_sec` given the fused gyro rate (dps) and
    /// accel/mag observation vectors for this tick.
    pub fn step(&mut self, gyro_dps: Vec3, accel_g: Vec3, mag: Vec3, dt_sec: f64) -> AttitudeEstimate {
        let (pitch_obs, roll_obs) = tilt_from_accel(accel_g);
        let heading_obs = heading_from_mag(mag, pitch_obs, roll_obs);

        if !self.initialized {
            self.pitch_deg = pitch_obs;
            self.roll_deg = roll_obs;
            self.heading_deg = heading_obs;
            self.initialized = true;
        }

        let corrected_yaw_rate = gyro_dps.z() - self.yaw_bias_dps;

        let pitch_integrated = self.pitch_deg + gyro_dps.x() * dt_sec;
        let roll_integrated = self.roll_deg + gyro_dps.y() * dt_sec;
        let heading_integrated = self.heading_deg + corrected_yaw_rate * dt_sec;

        let alpha = if self.blend_tau_sec > 0.0 {
            dt_sec / (self.blend_tau_sec + dt_sec)
        } else {
            1.0
        };

        self.pitch_deg = pitch_integrated * (1.0 - alpha) + pitch_obs * alpha;
        self.roll_deg = roll_integrated * (1.0 - alpha) + roll_obs * alpha;

        let heading_delta = wrap_deg(heading_obs - heading_integrated);
        self.heading_deg = wrap_deg(heading_integrated + alpha * heading_delta);

        // Secondary low-pass: track the steady residual between the
        // gyro-integrated heading and the mag observation and fold it back
        // into the yaw bias estimate.
        let residual_alpha = if self.residual_tau_sec > 0.0 {
            dt_sec / (self.residual_tau_sec + dt_sec)
        } else {
            0.0
        };
        let residual_rate_dps = heading_delta / dt_sec.max(1e-6);
        self.yaw_bias_dps += residual_alpha * (residual_rate_dps - self.yaw_bias_dps);

        AttitudeEstimate {
            heading: Bam32::from_degrees(self.heading_deg),
            pitch_deg: self.pitch_deg,
            roll_deg: self.roll_deg,
            turn_rate_dps: corrected_yaw_rate,
        }
    }
}

fn tilt_from_accel(accel_g: Vec3) -> (f64, f64) {
    let pitch = (-accel_g.x()).atan2((accel_g.y() * accel_g.y() + accel_g.z() * accel_g.z()).sqrt());
    let roll = accel_g.y().atan2(accel_g.z());
    (pitch.to_degrees(), roll.to_degrees())
}

fn heading_from_mag(mag: Vec3, pitch_deg: f64, roll_deg: f64) -> f64 {
    let pitch = pitch_deg.to_radians();
    let roll = roll_deg.to_radians();
    let (sp, cp) = pitch.sin_cos();
    let (sr, cr) = roll.sin_cos();
    let mx = mag.x() * cp + mag.y() * sr * sp + mag.z() * cr * sp;
    let my = mag.y() * cr - mag.z() * sr;
    my.atan2(mx).to_degrees()
}

fn wrap_deg(mut deg: f64) -> f64 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg < -180.0 {
        deg += 360.0;
    }
    deg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_stationary_vessel_converges_to_zero_tilt() {
        let mut f = ComplementaryFilter::new(0.5, 10.0);
        let accel = Vec3::new(0.0, 0.0, 1.0);
        let mag = Vec3::new(1.0, 0.0, 0.0);
        let mut estimate = f.step(Vec3::ZERO, accel, mag, 0.0125);
        for _ in 0..200 {
            estimate = f.step(Vec3::ZERO, accel, mag, 0.0125);
        }
        assert!(estimate.pitch_deg.abs() < 1e-6);
        assert!(estimate.roll_deg.abs() < 1e-6);
    }

    #[test]
    fn sustained_yaw_rate_is_integrated() {
        let mut f = ComplementaryFilter::new(1000.0, 1000.0);
        let accel = Vec3::new(0.0, 0.0, 1.0);
        let mag = Vec3::new(1.0, 0.0, 0.0);
        let mut last = f.step(Vec3::new(0.0, 0.0, 10.0), accel, mag, 0.0125);
        for _ in 0..79 {
            last = f.step(Vec3::new(0.0, 0.0, 10.0), accel, mag, 0.0125);
        }
        // ~1 second at 10 dps with a near-infinite blend tau (so the mag
        // observation barely pulls it back) should read close to 10 degrees.
        assert!((last.heading.to_degrees() - 10.0).abs() < 1.0);
    }
}
