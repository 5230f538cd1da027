use crate::alignment::AlignmentEstimator;
use crate::filter::{AttitudeEstimate, ComplementaryFilter};
use crate::stream::{ResampledVectorStream, SimpleVectorStream};
use kharon_types::{Priority, Timestamp, Vec3};

/// Default staleness window for hold-last-value accel/mag streams before
/// they stop counting toward quorum (spec §4.B).
pub const DEFAULT_STALENESS_USEC: u64 = 500_000;

/// The global fusion tick (spec §4.B, §9): 12.5ms, i.e. 80Hz.
pub const TICK_USEC: u64 = 12_500;

/// One fused attitude output (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSample {
    pub timestamp: Timestamp,
    pub estimate: AttitudeEstimate,
    /// True for a standard (full-quorum) publish, false for a force
    /// publish that fell back to a subset of streams or stale data.
    pub was_standard_publish: bool,
}

/// Required count of same-modality P1 streams for the standard (full
/// quorum) publish path. Below quorum the core falls back to
/// force-publish with priority-weighted partial data (spec §4.B).
#[derive(Debug, Clone, Copy)]
pub struct QuorumConfig {
    pub num_p1_gyro: usize,
    pub num_p1_accel: usize,
    pub num_p1_mag: usize,
}

/// The Attitude Core (spec §4.B): resamples redundant gyro/accel/mag
/// streams onto a shared 12.5ms tick, arbitrates between them by priority
/// quorum, and runs a complementary filter to produce one fused attitude
/// sample per tick.
pub struct AttitudeCore {
    quorum: QuorumConfig,
    staleness_usec: u64,
    gyro: Vec<ResampledVectorStream>,
    accel: Vec<SimpleVectorStream>,
    mag: Vec<SimpleVectorStream>,
    next_publish_time: Option<Timestamp>,
    /// Timestamp of the last sample actually handed to the filter, used to
    /// compute the true elapsed `dt` across a force-publish skip (spec
    /// §4.B "dt for the filter is extended accordingly").
    last_published_time: Option<Timestamp>,
    filter: ComplementaryFilter,
    /// One alignment estimator per non-master gyro stream (index 0 is the
    /// master; `alignment[i]` tracks gyro stream `i + 1` against it).
    alignment: Vec<AlignmentEstimator>,
    alignment_threshold_dps: f64,
}

impl AttitudeCore {
    pub fn new(
        gyro: Vec<ResampledVectorStream>,
        accel: Vec<SimpleVectorStream>,
        mag: Vec<SimpleVectorStream>,
        quorum: QuorumConfig,
        staleness_usec: u64,
        filter: ComplementaryFilter,
        alignment_tau_sec: f64,
        alignment_threshold_dps: f64,
    ) -> Self {
        let alignment = if gyro.len() > 1 {
            (0..gyro.len() - 1)
                .map(|_| AlignmentEstimator::new(alignment_tau_sec))
                .collect()
        } else {
            Vec::new()
        };
        AttitudeCore {
            quorum,
            staleness_usec,
            gyro,
            accel,
            mag,
            next_publish_time: None,
            last_published_time: None,
            filter,
            alignment,
            alignment_threshold_dps,
        }
    }

    pub fn ingest_gyro(&mut self, idx: usize, t: Timestamp, v: Vec3) {
        self.gyro[idx].add_sample(t, v);
    }

    pub fn ingest_accel(&mut self, idx: usize, t: Timestamp, v: Vec3) {
        self.accel[idx].update(v, t);
    }

    pub fn ingest_mag(&mut self, idx: usize, t: Timestamp, v: Vec3) {
        self.mag[idx].update(v, t);
    }

    pub fn alignment_estimate(&self, peer_index: usize) -> Option<(Vec3, f64)> {
        self.alignment.get(peer_index).and_then(|a| a.estimate())
    }

    /// Attempt to produce the next fused sample. Returns `None` if no
    /// gyro data at all is available yet to anchor or advance the publish
    /// clock (spec §4.B "no gyro available").
    pub fn try_publish(&mut self) -> Option<AttitudeSample> {
        if self.next_publish_time.is_none() {
            let earliest = self.gyro.iter().filter_map(|s| s.is_sample_available()).min()?;
            self.next_publish_time = Some(earliest);
        }
        let publish_time = self.next_publish_time.unwrap();
        for s in &mut self.gyro {
            s.discard_stale_before(publish_time);
        }

        let mut p1 = Vec::new();
        let mut p2 = Vec::new();
        let mut p3 = Vec::new();
        let mut earliest_future: Option<Timestamp> = None;
        let mut peer_samples: Vec<Option<Vec3>> = vec![None; self.gyro.len()];

        for (i, s) in self.gyro.iter_mut().enumerate() {
            match s.is_sample_available() {
                Some(t) if t == publish_time => {
                    let (_, v) = s.get_next_sample().expect("peeked sample must pop");
                    peer_samples[i] = Some(v);
                    match s.priority {
                        Priority::P1 => p1.push(v),
                        Priority::P2 => p2.push(v),
                        Priority::P3 => p3.push(v),
                    }
                }
                Some(t) => {
                    earliest_future = Some(earliest_future.map_or(t, |e| e.min(t)));
                }
                None => {}
            }
        }

        if p1.is_empty() && p2.is_empty() && p3.is_empty() {
            return match earliest_future {
                // No gyro reported for this tick at all, but one will in
                // the future: skip the publish clock forward to it rather
                // than stalling (original's force-publish Case D).
                Some(next_t) => {
                    self.next_publish_time = Some(next_t);
                    None
                }
                None => None,
            };
        }

        self.update_alignment(publish_time, &peer_samples);

        let timeout_floor = floor_timestamp(publish_time, self.staleness_usec);
        let (accel_p1, accel_p2, accel_p3) = classify_current(&self.accel, timeout_floor);
        let (mag_p1, mag_p2, mag_p3) = classify_current(&self.mag, timeout_floor);

        let is_standard = p1.len() >= self.quorum.num_p1_gyro
            && accel_p1.len() >= self.quorum.num_p1_accel
            && mag_p1.len() >= self.quorum.num_p1_mag;

        let gyro_fused = weighted_average(&p1, &p2, &p3).expect("checked non-empty above");
        let accel_fused = weighted_average(&accel_p1, &accel_p2, &accel_p3)
            .unwrap_or_else(|| Vec3::new(0.0, 1.0, 0.0));
        let mag_fused = weighted_average(&mag_p1, &mag_p2, &mag_p3)
            .unwrap_or_else(|| most_recent_or_north(&self.mag));

        // Normally exactly one tick elapsed since the last publish, but a
        // force-publish may have skipped one or more ticks to reach
        // `publish_time`; feed the filter the true elapsed time rather than
        // a fixed tick so skipped ticks aren't under-integrated (spec §4.B,
        // §8 scenario 2).
        let dt_sec = match self.last_published_time {
            Some(last) => (publish_time.usec().saturating_sub(last.usec())) as f64 * 1.0e-6,
            None => (TICK_USEC as f64) * 1.0e-6,
        };
        let estimate = self.filter.step(gyro_fused, accel_fused, mag_fused, dt_sec);
        self.last_published_time = Some(publish_time);
        self.next_publish_time = Some(publish_time.add_usec(TICK_USEC));

        Some(AttitudeSample {
            timestamp: publish_time,
            estimate,
            was_standard_publish: is_standard,
        })
    }

    fn update_alignment(&mut self, _publish_time: Timestamp, peer_samples: &[Option<Vec3>]) {
        let Some(master) = peer_samples.first().copied().flatten() else {
            return;
        };
        let rotation_magnitude = master.magnitude();
        for (i, est) in self.alignment.iter_mut().enumerate() {
            if let Some(peer) = peer_samples.get(i + 1).copied().flatten() {
                est.observe(
                    master,
                    peer,
                    rotation_magnitude,
                    self.alignment_threshold_dps,
                    (TICK_USEC as f64) * 1.0e-6,
                );
            }
        }
    }
}

fn floor_timestamp(t: Timestamp, window_usec: u64) -> Timestamp {
    Timestamp::from_usec(t.usec().saturating_sub(window_usec))
}

fn classify_current(streams: &[SimpleVectorStream], timeout_floor: Timestamp) -> (Vec<Vec3>, Vec<Vec3>, Vec<Vec3>) {
    let mut p1 = Vec::new();
    let mut p2 = Vec::new();
    let mut p3 = Vec::new();
    for s in streams {
        if s.is_current(timeout_floor) {
            match s.priority {
                Priority::P1 => p1.push(s.sample()),
                Priority::P2 => p2.push(s.sample()),
                Priority::P3 => p3.push(s.sample()),
            }
        }
    }
    (p1, p2, p3)
}

fn most_recent_or_north(streams: &[SimpleVectorStream]) -> Vec3 {
    streams
        .iter()
        .filter_map(|s| s.timestamp().map(|t| (t, s.sample())))
        .max_by_key(|(t, _)| *t)
        .map(|(_, v)| v)
        .unwrap_or_else(|| Vec3::new(0.0, 0.0, 1.0))
}

/// Priority-weighted average: P1 streams at full weight with P2 as a half
/// weight assist when P1 quorum holds; otherwise P2 and P3 are combined at
/// equal weight (spec §4.B "priority-weighted pull").
fn weighted_average(p1: &[Vec3], p2: &[Vec3], p3: &[Vec3]) -> Option<Vec3> {
    if !p1.is_empty() {
        let mut acc = Vec3::ZERO;
        let mut wt = 0.0;
        for v in p1 {
            acc.add_weighted(v, 1.0);
            wt += 1.0;
        }
        for v in p2 {
            acc.add_weighted(v, 0.5);
            wt += 0.5;
        }
        Some(acc * (1.0 / wt))
    } else if !p2.is_empty() || !p3.is_empty() {
        let mut acc = Vec3::ZERO;
        let mut wt = 0.0;
        for v in p2.iter().chain(p3.iter()) {
            acc.add_weighted(v, 1.0);
            wt += 1.0;
        }
        Some(acc * (1.0 / wt))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{DEFAULT_BLEND_TAU_SEC, DEFAULT_RESIDUAL_TAU_SEC};

    fn core(gyro_n: usize) -> AttitudeCore {
        let gyro = (0..gyro_n)
            .map(|_| ResampledVectorStream::new(Priority::P1, TICK_USEC))
            .collect();
        let accel = vec![SimpleVectorStream::new(Priority::P1)];
        let mag = vec![SimpleVectorStream::new(Priority::P1)];
        AttitudeCore::new(
            gyro,
            accel,
            mag,
            QuorumConfig {
                num_p1_gyro: gyro_n,
                num_p1_accel: 1,
                num_p1_mag: 1,
            },
            DEFAULT_STALENESS_USEC,
            ComplementaryFilter::new(DEFAULT_BLEND_TAU_SEC, DEFAULT_RESIDUAL_TAU_SEC),
            120.0,
            2.0,
        )
    }

    #[test]
    fn standard_publish_with_full_quorum() {
        let mut c = core(2);
        // Two brackets per stream are needed before the first tick
        // (t=0) resolves, same as real sensors feeding ahead of the tick.
        c.ingest_gyro(0, Timestamp::from_usec(0), Vec3::new(1.0, 0.0, 0.0));
        c.ingest_gyro(1, Timestamp::from_usec(0), Vec3::new(1.0, 0.0, 0.0));
        c.ingest_gyro(0, Timestamp::from_usec(TICK_USEC), Vec3::new(1.0, 0.0, 0.0));
        c.ingest_gyro(1, Timestamp::from_usec(TICK_USEC), Vec3::new(1.0, 0.0, 0.0));
        c.ingest_accel(0, Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 1.0));
        c.ingest_mag(0, Timestamp::from_usec(0), Vec3::new(1.0, 0.0, 0.0));
        let sample = c.try_publish().expect("expected a publish");
        assert!(sample.was_standard_publish);
    }

    #[test]
    fn force_publish_without_accel_mag_falls_back() {
        let mut c = core(1);
        c.ingest_gyro(0, Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 5.0));
        c.ingest_gyro(0, Timestamp::from_usec(TICK_USEC), Vec3::new(0.0, 0.0, 5.0));
        let sample = c.try_publish().expect("expected a force publish");
        assert!(!sample.was_standard_publish);
    }

    #[test]
    fn no_gyro_ever_yields_none() {
        let mut c = core(1);
        assert!(c.try_publish().is_none());
    }

    #[test]
    fn force_publish_dt_extends_across_a_skipped_tick() {
        // Spec §4.B / §8 scenario 2: a force publish that skips ahead to a
        // later tick must feed the filter the true elapsed dt, not a fixed
        // 12.5ms tick.
        let gyro = vec![
            ResampledVectorStream::new(Priority::P1, TICK_USEC),
            ResampledVectorStream::new(Priority::P2, TICK_USEC),
        ];
        let accel = vec![SimpleVectorStream::new(Priority::P1)];
        let mag = vec![SimpleVectorStream::new(Priority::P1)];
        let mut c = AttitudeCore::new(
            gyro,
            accel,
            mag,
            QuorumConfig { num_p1_gyro: 1, num_p1_accel: 0, num_p1_mag: 0 },
            DEFAULT_STALENESS_USEC,
            ComplementaryFilter::new(1.0e6, 1.0e6),
            120.0,
            2.0,
        );

        // Stream 0 (P1) anchors the clock with a resolved, zero-rate
        // sample at t=0, then goes silent.
        c.ingest_gyro(0, Timestamp::from_usec(0), Vec3::ZERO);
        c.ingest_gyro(0, Timestamp::from_usec(100), Vec3::ZERO);
        let first = c.try_publish().expect("initial publish at t=0");
        assert_eq!(first.timestamp.usec(), 0);
        assert!(first.was_standard_publish);
        let first_heading_deg = first.estimate.heading.to_degrees();

        // Stream 1 (P2) only starts now, off tick boundary, so its own
        // first resolved resample tick lands at t=25_000 rather than the
        // next expected t=12_500 -- the resampler's own gap-skip path.
        c.ingest_gyro(1, Timestamp::from_usec(20_000), Vec3::new(0.0, 0.0, 80.0));
        c.ingest_gyro(1, Timestamp::from_usec(20_100), Vec3::new(0.0, 0.0, 80.0));
        c.ingest_gyro(1, Timestamp::from_usec(30_000), Vec3::new(0.0, 0.0, 80.0));

        // Nothing lines up with the expected next tick (12_500); the core
        // should skip its publish clock ahead without publishing.
        assert!(c.try_publish().is_none());

        // The following call force-publishes at the advanced time using
        // stream 1 alone.
        let forced = c.try_publish().expect("force publish once data arrives");
        assert_eq!(forced.timestamp.usec(), 25_000);
        assert!(!forced.was_standard_publish);

        // 80 dps integrated over the true 25ms gap since the last publish
        // (not a fixed 12.5ms tick) should move the heading by ~2.0
        // degrees, not ~1.0.
        let forced_heading_deg = forced.estimate.heading.to_degrees();
        let delta = (forced_heading_deg - first_heading_deg + 540.0).rem_euclid(360.0) - 180.0;
        assert!((delta - 2.0).abs() < 0.05, "heading delta = {delta}");
    }
}
