use kharon_types::Vec3;
use std::io::Write as _;
use std::path::Path;

/// Long-time-constant exponential moving average used to estimate and
/// subtract gyro drift (spec §4.A).
///
/// The default tau (~900s) makes the estimate track only the slow bias
/// component; a "fast drift" mode with a shorter tau can be switched on
/// externally, e.g. right after a device power cycle when bias hasn't
/// settled yet.
#[derive(Debug, Clone, Copy)]
pub struct DriftEstimator {
    estimate: Vec3,
    tau_sec: f64,
    fast_tau_sec: f64,
    fast_mode: bool,
}

pub const DEFAULT_DRIFT_TAU_SEC: f64 = 900.0;
pub const DEFAULT_FAST_DRIFT_TAU_SEC: f64 = 60.0;

impl DriftEstimator {
    pub fn new(initial: Vec3) -> Self {
        DriftEstimator {
            estimate: initial,
            tau_sec: DEFAULT_DRIFT_TAU_SEC,
            fast_tau_sec: DEFAULT_FAST_DRIFT_TAU_SEC,
            fast_mode: false,
        }
    }

    pub fn set_fast_mode(&mut self, fast: bool) {
        self.fast_mode = fast;
    }

    fn active_tau(&self) -> f64 {
        if self.fast_mode {
            self.fast_tau_sec
        } else {
            self.tau_sec
        }
    }

    /// Update the EMA with a new raw gyro reading and return the
    /// drift-corrected value (`raw - estimate_before_update`).
    pub fn update(&mut self, raw: Vec3, dt_sec: f64) -> Vec3 {
        let corrected = raw - self.estimate;
        let alpha = (1.0 - (-dt_sec / self.active_tau()).exp()).clamp(0.0, 1.0);
        self.estimate = self.estimate + (raw - self.estimate) * alpha;
        corrected
    }

    pub fn estimate(&self) -> Vec3 {
        self.estimate
    }

    /// Persist the current drift estimate to the device's configuration
    /// directory as three whitespace-separated doubles (spec §6
    /// `drift_dps` file).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        writeln!(
            f,
            "{} {} {}",
            self.estimate.x(),
            self.estimate.y(),
            self.estimate.z()
        )
    }

    pub fn load(path: &Path) -> std::io::Result<Vec3> {
        let text = std::fs::read_to_string(path)?;
        let vals: Vec<f64> = text
            .split_whitespace()
            .filter_map(|t| t.parse().ok())
            .collect();
        if vals.len() == 3 {
            Ok(Vec3::new(vals[0], vals[1], vals[2]))
        } else {
            Ok(Vec3::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_converges_toward_constant_bias() {
        let bias = Vec3::new(0.5, -0.2, 0.0);
        let mut est = DriftEstimator::new(Vec3::ZERO);
        for _ in 0..20_000 {
            est.update(bias, 0.1);
        }
        assert_relative_eq!(est.estimate().x(), bias.x(), epsilon = 0.02);
    }

    #[test]
    fn fast_mode_converges_quicker() {
        let bias = Vec3::new(1.0, 0.0, 0.0);
        let mut slow = DriftEstimator::new(Vec3::ZERO);
        let mut fast = DriftEstimator::new(Vec3::ZERO);
        fast.set_fast_mode(true);
        for _ in 0..100 {
            slow.update(bias, 1.0);
            fast.update(bias, 1.0);
        }
        assert!(fast.estimate().x() > slow.estimate().x());
    }
}
