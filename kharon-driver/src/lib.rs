//! Driver / Steering (spec §4.E): the tiller autopilot serial link, the
//! external request surface other threads post to, and the decision-thread
//! core that ties them to a [`kharon_router::RouterCore`].

mod comm;
mod driver;
mod error;
mod exchange;
mod gps;
mod serial;

pub use comm::{poll_once, OttoReplyTracker, OutgoingHeading, TillerPort, COMM_POLL_INTERVAL};
pub use driver::{
    Driver, DriverConfig, DriverOutput, RouteFlags, OTTO_ERR_TIMEOUT_SEC,
    PIX_DIST_AVOID_MAP_REBUILD, VESSEL_MOTION_PIX_FOR_MAP_REBUILD, WAKING_INTERVAL_SEC,
};
pub use error::{DriverError, Result};
pub use exchange::{Destination, DrainedRequests, Exchange, AUTOPILOT_HEADING_DISABLED};
pub use gps::{parse_gps_packet, GpsFix, GPS_PACKET_LEN};
pub use serial::{
    HeadingPacket, PacketAssembler, PacketEvent, TillerReply, SERIAL_DEBUG_MASK,
    SERIAL_PACKET_END, SERIAL_PACKET_START, TILLER_FAULT_THRESHOLD,
};

#[cfg(test)]
mod tests {
    use super::*;
    use kharon_router::{RouterConfig, TerrainGrid, TerrainThresholds};
    use kharon_types::{Bam8, Timestamp};

    struct FlatSeaGrid;
    impl TerrainGrid for FlatSeaGrid {
        fn depth_m_at(&self, _x: i64, _y: i64) -> f64 {
            50.0
        }
        fn world_index(&self, x: i64, y: i64) -> u32 {
            ((x.rem_euclid(1 << 16)) * (1 << 16) + y.rem_euclid(1 << 16)) as u32
        }
        fn has_land_neighbor_8(&self, _x: i64, _y: i64) -> bool {
            false
        }
        fn has_land_neighbor_16(&self, _x: i64, _y: i64) -> bool {
            false
        }
    }

    /// Exercises the full stack a real decision thread would run: post a
    /// destination and autotracking request through the exchange, run a
    /// driver tick, and feed the resulting heading command through the
    /// comm layer onto a loopback port.
    #[test]
    fn end_to_end_tick_produces_a_commanded_heading_and_frames_it() {
        let exchange = Exchange::new(|| {});
        let config = DriverConfig {
            router: RouterConfig {
                thresholds: TerrainThresholds { absolute_min_m: 1.0, min_traversable_m: 3.0, preferred_min_m: 10.0 },
                map_dim: 5,
                spacing_m: 10.0,
                destination_radius_m: 20.0,
            },
            vessel_motion_pix_for_map_rebuild: VESSEL_MOTION_PIX_FOR_MAP_REBUILD,
            pix_dist_avoid_map_rebuild: PIX_DIST_AVOID_MAP_REBUILD,
            otto_err_timeout_sec: OTTO_ERR_TIMEOUT_SEC,
        };
        let mut driver = Driver::new(config, exchange.clone(), Bam8::from_raw(0), 3.0, Timestamp::from_usec(0));

        exchange.set_destination(Destination { lon_deg: 10.0, lat_deg: 10.0, radius_m: 50.0 });
        exchange.set_autotracking(true);

        let out = driver
            .run_once(
                Timestamp::from_usec(1_000_000),
                Some((0, 0)),
                Some(&FlatSeaGrid),
                Some((0.0, 0.0)),
                None,
                Bam8::from_raw(0),
                3.0,
                None,
                Some(Timestamp::from_usec(1_000_000)),
            )
            .unwrap();
        assert!(out.flags.contains(RouteFlags::HAVE_DESTINATION));
        let heading_degs = out.commanded_heading_degs.expect("autotracking should command a heading");

        let outgoing = OutgoingHeading::new();
        outgoing.post(HeadingPacket { heading_degs: heading_degs as u16, course_degs: heading_degs as u16, turn_rate_dps: 0.0 });
        let mut assembler = PacketAssembler::new(8);
        let tracker = OttoReplyTracker::new();
        let clock = kharon_types::MasterClock::new();

        struct Sink(Vec<u8>);
        impl std::io::Read for Sink {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Ok(0)
            }
        }
        impl std::io::Write for Sink {
            fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
                self.0.extend_from_slice(buf);
                Ok(())
            }
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.write_all(buf).map(|_| buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut sink = Sink(Vec::new());
        poll_once(&mut sink, &mut assembler, &outgoing, &tracker, &clock).unwrap();
        assert_eq!(sink.0.first(), Some(&SERIAL_PACKET_START));
        assert_eq!(sink.0.last(), Some(&SERIAL_PACKET_END));
    }
}
