use kharon_types::Vec3;

/// Time constant the alignment estimate's rotation axis/angle are low-pass
/// filtered with before the estimate is considered reliable enough to
/// correct a peer gyro's mounting error (spec §4.B, §9).
pub const DEFAULT_ALIGNMENT_TAU_SEC: f64 = 120.0;

/// Estimates the fixed mounting-rotation offset between a redundant gyro
/// and the master stream it's being cross-checked against, by low-passing
/// the instantaneous rotation (axis, angle) implied by their disagreement
/// whenever the vessel is turning fast enough to make that disagreement
/// measurable (spec §9, "inter-sensor alignment estimator").
///
/// Only observations above a minimum rotation-rate magnitude are folded in
/// -- at low rates the implied axis is dominated by noise.
#[derive(Debug, Clone)]
pub struct AlignmentEstimator {
    tau_sec: f64,
    axis_ema: Vec3,
    angle_ema_deg: f64,
    samples: u64,
}

impl AlignmentEstimator {
    pub fn new(tau_sec: f64) -> Self {
        AlignmentEstimator {
            tau_sec,
            axis_ema: Vec3::ZERO,
            angle_ema_deg: 0.0,
            samples: 0,
        }
    }

    /// Fold in one observation: `master` and `peer` are the two gyros'
    /// unit-normalized angular-rate vectors for the same tick, and
    /// `rotation_magnitude_dps` is the master stream's own turn rate
    /// magnitude used to gate weak/noisy observations against `threshold`.
    pub fn observe(&mut self, master: Vec3, peer: Vec3, rotation_magnitude_dps: f64, threshold_dps: f64, dt_sec: f64) {
        if rotation_magnitude_dps < threshold_dps {
            return;
        }
        let Some(master_unit) = master.normalize() else {
            return;
        };
        let Some(peer_unit) = peer.normalize() else {
            return;
        };

        let cos_angle = master_unit.dot(&peer_unit).clamp(-1.0, 1.0);
        let angle_deg = cos_angle.acos().to_degrees();
        let axis = master_unit.cross(&peer_unit);

        let alpha = if self.tau_sec > 0.0 {
            dt_sec / (self.tau_sec + dt_sec)
        } else {
            1.0
        };
        self.axis_ema = self.axis_ema + (axis - self.axis_ema) * alpha;
        self.angle_ema_deg += alpha * (angle_deg - self.angle_ema_deg);
        self.samples += 1;
    }

    /// Number of observations folded into the estimate so far.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// The current estimated misalignment axis and angle, once enough
    /// samples have accumulated for the low-pass to have settled.
    pub fn estimate(&self) -> Option<(Vec3, f64)> {
        if self.samples == 0 {
            None
        } else {
            self.axis_ema.normalize().map(|axis| (axis, self.angle_ema_deg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_streams_converge_to_zero_misalignment() {
        let mut est = AlignmentEstimator::new(1.0);
        let v = Vec3::new(0.0, 0.0, 10.0);
        for _ in 0..500 {
            est.observe(v, v, 10.0, 2.0, 0.0125);
        }
        let (_, angle) = est.estimate().unwrap();
        assert!(angle.abs() < 1e-6);
    }

    #[test]
    fn weak_rotation_is_gated_out() {
        let mut est = AlignmentEstimator::new(1.0);
        let master = Vec3::new(0.0, 0.0, 0.5);
        let peer = Vec3::new(0.5, 0.0, 0.0);
        est.observe(master, peer, 0.5, 2.0, 0.0125);
        assert_eq!(est.sample_count(), 0);
    }
}
