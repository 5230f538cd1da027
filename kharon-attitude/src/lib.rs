//! Attitude Core (spec §4.B): resamples gyro/accel/mag streams onto a
//! shared 12.5ms tick, arbitrates between redundant sensors by priority
//! quorum with a force-publish fallback, and runs a complementary filter
//! to produce a stabilized heading/pitch/roll/turn-rate estimate.

mod alignment;
mod attitude_core;
mod error;
mod filter;
mod stream;

pub use alignment::{AlignmentEstimator, DEFAULT_ALIGNMENT_TAU_SEC};
pub use attitude_core::{
    AttitudeCore, AttitudeSample, QuorumConfig, DEFAULT_STALENESS_USEC, TICK_USEC,
};
pub use error::{AttitudeError, Result};
pub use filter::{
    AttitudeEstimate, ComplementaryFilter, DEFAULT_BLEND_TAU_SEC, DEFAULT_RESIDUAL_TAU_SEC,
};
pub use stream::{ResampledVectorStream, SimpleVectorStream};

#[cfg(test)]
mod tests {
    use super::*;
    use kharon_types::{Priority, Timestamp, Vec3};

    #[test]
    fn quorum_publish_then_force_publish_on_dropout() {
        let gyro = vec![
            ResampledVectorStream::new(Priority::P1, TICK_USEC),
            ResampledVectorStream::new(Priority::P1, TICK_USEC),
        ];
        let accel = vec![SimpleVectorStream::new(Priority::P1)];
        let mag = vec![SimpleVectorStream::new(Priority::P1)];
        let mut core = AttitudeCore::new(
            gyro,
            accel,
            mag,
            QuorumConfig {
                num_p1_gyro: 2,
                num_p1_accel: 1,
                num_p1_mag: 1,
            },
            DEFAULT_STALENESS_USEC,
            ComplementaryFilter::new(DEFAULT_BLEND_TAU_SEC, DEFAULT_RESIDUAL_TAU_SEC),
            DEFAULT_ALIGNMENT_TAU_SEC,
            2.0,
        );

        core.ingest_accel(0, Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 1.0));
        core.ingest_mag(0, Timestamp::from_usec(0), Vec3::new(1.0, 0.0, 0.0));
        core.ingest_gyro(0, Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 5.0));
        core.ingest_gyro(1, Timestamp::from_usec(0), Vec3::new(0.0, 0.0, 5.0));
        // A second raw sample per stream brackets both tick 0 and tick
        // TICK_USEC (the tick boundary coincides with this sample), so
        // both streams arrive with two resolved ticks already queued.
        core.ingest_gyro(0, Timestamp::from_usec(TICK_USEC), Vec3::new(0.0, 0.0, 5.0));
        core.ingest_gyro(1, Timestamp::from_usec(TICK_USEC), Vec3::new(0.0, 0.0, 5.0));

        let first = core.try_publish().expect("first tick should publish");
        assert!(first.was_standard_publish);

        // Quorum still holds for the second tick: both streams already
        // resolved it from the same pair of raw samples above.
        let second = core.try_publish().expect("second tick should publish");
        assert!(second.was_standard_publish);

        // Now the second device stops reporting entirely, while the first
        // gets a third raw sample bracketing a further tick. Quorum is
        // lost and the core must force-publish from the lone P1 gyro.
        core.ingest_accel(0, Timestamp::from_usec(2 * TICK_USEC), Vec3::new(0.0, 0.0, 1.0));
        core.ingest_mag(0, Timestamp::from_usec(2 * TICK_USEC), Vec3::new(1.0, 0.0, 0.0));
        core.ingest_gyro(
            0,
            Timestamp::from_usec(3 * TICK_USEC),
            Vec3::new(0.0, 0.0, 5.0),
        );
        let third = core.try_publish().expect("force publish should still occur");
        assert!(!third.was_standard_publish);
    }
}
