use kharon_types::{Priority, Timestamp, Vec3};
use std::collections::VecDeque;

/// Hold-last-value stream used for accelerometer and magnetometer inputs
/// (spec §4.B): no resampling, just the most recent sample plus its
/// timestamp, aged out by a staleness timeout.
#[derive(Debug, Clone)]
pub struct SimpleVectorStream {
    pub priority: Priority,
    timestamp: Option<Timestamp>,
    sample: Vec3,
}

impl SimpleVectorStream {
    pub fn new(priority: Priority) -> Self {
        SimpleVectorStream {
            priority,
            timestamp: None,
            sample: Vec3::ZERO,
        }
    }

    pub fn update(&mut self, sample: Vec3, t: Timestamp) {
        self.timestamp = Some(t);
        self.sample = sample;
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn sample(&self) -> Vec3 {
        self.sample
    }

    /// A stream is "current" if it has ever received data and that data is
    /// no older than `timeout_floor` (spec §4.B default 500ms staleness).
    pub fn is_current(&self, timeout_floor: Timestamp) -> bool {
        match self.timestamp {
            Some(t) => t >= timeout_floor,
            None => false,
        }
    }
}

/// Gyro input stream, resampled onto 12.5ms tick boundaries by linear
/// interpolation between bracketing raw samples (spec §4.B).
///
/// Raw samples are pushed via [`add_sample`](Self::add_sample); as soon as
/// two raw samples bracket an un-emitted tick boundary, the interpolated
/// value for that boundary becomes available via
/// [`is_sample_available`](Self::is_sample_available) /
/// [`get_next_sample`](Self::get_next_sample), mirroring the original's
/// `resampled_vector_stream_type` peek/advance pair.
#[derive(Debug, Clone)]
pub struct ResampledVectorStream {
    pub priority: Priority,
    tick_usec: u64,
    raw: VecDeque<(Timestamp, Vec3)>,
    pending: VecDeque<(Timestamp, Vec3)>,
    next_tick_to_resolve: Option<u64>,
    write_head: Option<Timestamp>,
}

impl ResampledVectorStream {
    pub fn new(priority: Priority, tick_usec: u64) -> Self {
        ResampledVectorStream {
            priority,
            tick_usec,
            raw: VecDeque::new(),
            pending: VecDeque::new(),
            next_tick_to_resolve: None,
            write_head: None,
        }
    }

    /// Push a raw sample and resolve any tick boundaries now bracketed by
    /// two raw samples. Invariant (spec §3): a stream never reports a
    /// timestamp greater than its write head, and samples are strictly
    /// ordered -- out-of-order arrivals are dropped.
    pub fn add_sample(&mut self, t: Timestamp, v: Vec3) {
        if let Some(head) = self.write_head {
            if t <= head {
                return; // strictly ordered; drop stale/duplicate arrivals
            }
        }
        self.write_head = Some(t);

        if self.next_tick_to_resolve.is_none() {
            self.next_tick_to_resolve = Some(t.floor_to_tick(self.tick_usec).usec());
        }

        self.raw.push_back((t, v));
        self.resolve_ticks();
        // Bound raw history: we only ever need the two samples bracketing
        // the next unresolved tick.
        while self.raw.len() > 2 {
            let keep_from = self.raw.len() - 2;
            // Only drop the front element if the second element is still
            // at/after the next tick to resolve (otherwise we'd lose the
            // left bracket we still need).
            if let Some(next_tick) = self.next_tick_to_resolve {
                if self.raw[1].0.usec() <= next_tick {
                    self.raw.pop_front();
                    continue;
                }
            }
            let _ = keep_from;
            break;
        }
    }

    fn resolve_ticks(&mut self) {
        loop {
            let Some(next_tick) = self.next_tick_to_resolve else {
                break;
            };
            if self.raw.len() < 2 {
                break;
            }
            let (t0, v0) = self.raw[self.raw.len() - 2];
            let (t1, v1) = self.raw[self.raw.len() - 1];
            if t1.usec() < next_tick {
                break; // not bracketed yet
            }
            if t0.usec() > next_tick {
                // Both raw samples are already past the tick (a gap in
                // arrivals skipped it entirely); advance past it without
                // emitting so we don't stall forever.
                self.next_tick_to_resolve = Some(next_tick + self.tick_usec);
                continue;
            }
            let span = (t1.usec() - t0.usec()) as f64;
            let frac = if span > 0.0 {
                (next_tick - t0.usec()) as f64 / span
            } else {
                0.0
            };
            let interp = v0 + (v1 - v0) * frac;
            self.pending
                .push_back((Timestamp::from_usec(next_tick), interp));
            self.next_tick_to_resolve = Some(next_tick + self.tick_usec);
        }
    }

    /// Timestamp of the next pending resampled sample, if any.
    pub fn is_sample_available(&self) -> Option<Timestamp> {
        self.pending.front().map(|(t, _)| *t)
    }

    /// Pop and return the next resampled sample.
    pub fn get_next_sample(&mut self) -> Option<(Timestamp, Vec3)> {
        self.pending.pop_front()
    }

    /// Discard any pending samples older than `floor` without consuming
    /// them as data (spec: stale samples are dropped, not delivered).
    pub fn discard_stale_before(&mut self, floor: Timestamp) {
        while let Some((t, _)) = self.pending.front() {
            if *t < floor {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_brackets() {
        let mut s = ResampledVectorStream::new(Priority::P1, 12_500);
        s.add_sample(Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 0.0));
        s.add_sample(Timestamp::from_usec(25_000), Vec3::new(2.0, 0.0, 0.0));
        // Tick at 12_500 should be the midpoint: 1.0
        assert_eq!(s.is_sample_available(), Some(Timestamp::from_usec(12_500)));
        let (t, v) = s.get_next_sample().unwrap();
        assert_eq!(t.usec(), 12_500);
        assert!((v.x() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_samples_are_dropped() {
        let mut s = ResampledVectorStream::new(Priority::P1, 12_500);
        s.add_sample(Timestamp::from_usec(10_000), Vec3::new(1.0, 0.0, 0.0));
        s.add_sample(Timestamp::from_usec(5_000), Vec3::new(9.0, 0.0, 0.0));
        // The second (out-of-order) sample must not have been accepted.
        s.add_sample(Timestamp::from_usec(20_000), Vec3::new(3.0, 0.0, 0.0));
        assert!(s.is_sample_available().is_some());
    }
}
