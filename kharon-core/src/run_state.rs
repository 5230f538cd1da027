//! Process-wide cancellation (spec §5 "Cancellation"): a single shared
//! `run_state` word carrying a done bit, with a condvar so blocked
//! threads wake immediately on `abort()` instead of riding out their full
//! sleep, mirroring the original's `SIGUSR1`-interrupts-`nanosleep`
//! discipline without needing real signal delivery.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// Shared handle threads poll at suspension points and after I/O (spec
/// §5). Cheap to clone; every clone refers to the same flag.
#[derive(Clone)]
pub struct ShutdownFlag(Arc<Inner>);

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag(Arc::new(Inner { done: Mutex::new(false), condvar: Condvar::new() }))
    }

    pub fn is_done(&self) -> bool {
        *self.0.done.lock()
    }

    /// Flip the flag and wake every thread parked in [`Self::sleep`]
    /// (the re-expression of `abort()` signalling `SIGUSR1` to each
    /// thread, spec §5).
    pub fn signal(&self) {
        let mut done = self.0.done.lock();
        *done = true;
        self.0.condvar.notify_all();
    }

    /// Sleep up to `dur`, returning early (and reporting `true`, "was
    /// woken") the instant [`Self::signal`] is called. The interruptible
    /// equivalent of the original's `clock_nanosleep`/`SIGUSR1` pairing
    /// for the aggregator, panorama, and driver decision-thread
    /// suspension points (spec §5).
    pub fn sleep(&self, dur: Duration) -> bool {
        let mut done = self.0.done.lock();
        if *done {
            return true;
        }
        let result = self.0.condvar.wait_for(&mut done, dur);
        *done || !result.timed_out()
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}
