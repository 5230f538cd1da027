use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Microseconds since an implementation-defined epoch (spec §3).
///
/// Round-trips to/from a real-valued seconds representation to within
/// 1 microsecond for times up to 50 years (`2^? * 1e-6` easily covers this
/// range in an `i64`/`f64` pair, see `to_seconds`/`from_seconds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    usec: u64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { usec: 0 };

    #[inline]
    pub fn from_usec(usec: u64) -> Self {
        Timestamp { usec }
    }

    #[inline]
    pub fn usec(&self) -> u64 {
        self.usec
    }

    /// Construct from a seconds-since-epoch value. Panics on NaN or negative
    /// input, matching the hard-failure posture the original took on bad
    /// timestamps (spec §7.4, invariant violation).
    pub fn from_seconds(seconds: f64) -> Self {
        assert!(!seconds.is_nan(), "cannot convert NaN to a Timestamp");
        assert!(seconds >= 0.0, "timestamps are non-negative");
        Timestamp {
            usec: (seconds * 1_000_000.0).round() as u64,
        }
    }

    pub fn to_seconds(&self) -> f64 {
        self.usec as f64 * 1.0e-6
    }

    /// Round down to the nearest tick boundary (e.g. the 12.5ms attitude
    /// tick of spec §4.B).
    pub fn floor_to_tick(&self, tick_usec: u64) -> Timestamp {
        Timestamp {
            usec: (self.usec / tick_usec) * tick_usec,
        }
    }

    pub fn checked_sub(&self, other: Timestamp) -> Option<Duration> {
        self.usec
            .checked_sub(other.usec)
            .map(|d| Duration::from_micros(d))
    }

    /// Signed delta in seconds, `self - other`.
    pub fn delta_seconds(&self, other: Timestamp) -> f64 {
        (self.usec as i64 - other.usec as i64) as f64 * 1.0e-6
    }

    pub fn add_usec(&self, usec: u64) -> Timestamp {
        Timestamp {
            usec: self.usec + usec,
        }
    }
}

/// Process-wide monotonic-plus-offset clock (spec §3, §5 "Timekeeper").
///
/// `now()` is `monotonic_elapsed + offset`. The offset is stored as an
/// atomic microsecond count (rather than the original's atomic `double`)
/// so that readers never need a lock regardless of platform `f64` atomicity
/// guarantees, and updated at most once per second from an external
/// reference-time message.
pub struct MasterClock {
    epoch: Instant,
    offset_usec: AtomicU64,
}

impl MasterClock {
    pub fn new() -> Self {
        MasterClock {
            epoch: Instant::now(),
            offset_usec: AtomicU64::new(0),
        }
    }

    /// Create a clock whose `now()` starts at a specific timestamp. Useful
    /// for tests and for the `-t <seconds>` clock-override CLI flag (spec
    /// §6).
    pub fn starting_at(start: Timestamp) -> Self {
        MasterClock {
            epoch: Instant::now(),
            offset_usec: AtomicU64::new(start.usec()),
        }
    }

    pub fn now(&self) -> Timestamp {
        let elapsed = self.epoch.elapsed().as_micros() as u64;
        let offset = self.offset_usec.load(Ordering::Relaxed);
        Timestamp::from_usec(elapsed + offset)
    }

    /// Adjust the offset atomically on receipt of a reference-time message.
    /// Callers are expected to rate-limit this to at most once per second
    /// (spec §5).
    pub fn set_offset_from_reference(&self, reference: Timestamp) {
        let elapsed = self.epoch.elapsed().as_micros() as u64;
        let new_offset = reference.usec().saturating_sub(elapsed);
        self.offset_usec.store(new_offset, Ordering::Relaxed);
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_usec_precision() {
        for s in [0.0, 1.0, 3600.0, 86_400.0, 1.6e9] {
            let ts = Timestamp::from_seconds(s);
            let back = ts.to_seconds();
            assert!((back - s).abs() <= 1.0e-6, "s={s} back={back}");
        }
    }

    #[test]
    fn floor_to_tick_aligns() {
        let ts = Timestamp::from_usec(12_600);
        assert_eq!(ts.floor_to_tick(12_500).usec(), 12_500);
        let ts = Timestamp::from_usec(25_000);
        assert_eq!(ts.floor_to_tick(12_500).usec(), 25_000);
    }

    #[test]
    fn delta_seconds_is_signed() {
        let a = Timestamp::from_usec(20_000);
        let b = Timestamp::from_usec(12_500);
        assert!((a.delta_seconds(b) - 0.0075).abs() < 1e-9);
        assert!((b.delta_seconds(a) + 0.0075).abs() < 1e-9);
    }
}
