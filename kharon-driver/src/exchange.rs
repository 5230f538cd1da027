//! External request surface (spec §4.E): a single mutex-guarded struct
//! that other threads write into, and the decision thread drains once per
//! wake. Writers never block on anything but the mutex; the decision
//! thread copies the pending fields out and applies them to its own
//! state, matching the original's `exchange_mutex` / `*_change` flag
//! discipline (`driver.c` `set_destination` et al., `support.c`
//! `check_for_messages`).

use parking_lot::Mutex;
use std::sync::Arc;

/// A destination fix: world coordinates plus an arrival radius in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub radius_m: f64,
}

/// Heading values at or above this tell the driver to drop any manual
/// override and steer from the route map instead (spec §4.E).
pub const AUTOPILOT_HEADING_DISABLED: u32 = 360;

#[derive(Default)]
struct Pending {
    destination: Option<Destination>,
    autopilot_heading_degs: Option<u32>,
    autotracking: Option<bool>,
    /// `true` the first tick after autotracking is turned on, so the
    /// decision thread knows to send the suggested heading immediately
    /// rather than waiting for the next natural course-change event
    /// (spec §8 "After `set_autotracking(off); set_autotracking(on)`...").
    autotracking_just_enabled: bool,
    default_cruise_speed_mps: Option<f64>,
}

/// Handle shared between request submitters and the driver's decision
/// thread. Cheap to clone; all clones refer to the same mutex.
#[derive(Clone)]
pub struct Exchange {
    pending: Arc<Mutex<Pending>>,
    wake: Arc<dyn Fn() + Send + Sync>,
}

/// What changed, as drained by [`Exchange::take`].
#[derive(Debug, Clone, Default)]
pub struct DrainedRequests {
    pub destination: Option<Destination>,
    pub autopilot_heading_degs: Option<u32>,
    pub autotracking: Option<bool>,
    pub autotracking_just_enabled: bool,
    pub default_cruise_speed_mps: Option<f64>,
}

impl DrainedRequests {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none()
            && self.autopilot_heading_degs.is_none()
            && self.autotracking.is_none()
            && self.default_cruise_speed_mps.is_none()
    }
}

impl Exchange {
    /// `wake` is called after every write, mirroring `wake_driver()`'s
    /// `pthread_kill(SIGUSR1)` -- here, a condvar notify rather than a
    /// signal (spec §9 design notes, "signal-driven wakeup").
    pub fn new(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Exchange { pending: Arc::new(Mutex::new(Pending::default())), wake: Arc::new(wake) }
    }

    pub fn set_destination(&self, destination: Destination) {
        self.pending.lock().destination = Some(destination);
        (self.wake)();
    }

    pub fn set_autopilot_heading(&self, degs: u32) {
        self.pending.lock().autopilot_heading_degs = Some(degs);
        (self.wake)();
    }

    pub fn set_autotracking(&self, on: bool) {
        let mut p = self.pending.lock();
        p.autotracking = Some(on);
        p.autotracking_just_enabled = on;
        drop(p);
        (self.wake)();
    }

    pub fn set_default_cruise_speed_kts(&self, kts: f64) {
        const KNOTS_TO_MPS: f64 = 0.514444;
        self.pending.lock().default_cruise_speed_mps = Some(kts * KNOTS_TO_MPS);
        (self.wake)();
    }

    /// Drain whatever has accumulated since the last call. Called once
    /// per wake by the decision thread, under its own timing, never by a
    /// request submitter (spec §4.E "check messages").
    pub fn take(&self) -> DrainedRequests {
        let mut p = self.pending.lock();
        let out = DrainedRequests {
            destination: p.destination.take(),
            autopilot_heading_degs: p.autopilot_heading_degs.take(),
            autotracking: p.autotracking.take(),
            autotracking_just_enabled: std::mem::take(&mut p.autotracking_just_enabled),
            default_cruise_speed_mps: p.default_cruise_speed_mps.take(),
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn requests_accumulate_until_drained() {
        let woken = Arc::new(AtomicUsize::new(0));
        let woken2 = woken.clone();
        let exchange = Exchange::new(move || {
            woken2.fetch_add(1, Ordering::SeqCst);
        });
        exchange.set_autopilot_heading(90);
        exchange.set_default_cruise_speed_kts(10.0);
        assert_eq!(woken.load(Ordering::SeqCst), 2);

        let drained = exchange.take();
        assert_eq!(drained.autopilot_heading_degs, Some(90));
        assert!(drained.default_cruise_speed_mps.is_some());
        assert!(drained.destination.is_none());

        let empty = exchange.take();
        assert!(empty.is_empty());
    }

    #[test]
    fn autotracking_off_then_on_flags_just_enabled() {
        let exchange = Exchange::new(|| {});
        exchange.set_autotracking(true);
        exchange.set_autotracking(false);
        exchange.set_autotracking(true);
        let drained = exchange.take();
        assert_eq!(drained.autotracking, Some(true));
        assert!(drained.autotracking_just_enabled);
    }
}
