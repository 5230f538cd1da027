//! Decision-thread core (spec §4.E): applies pending external requests,
//! decides whether the route map needs rebuilding, runs one router tick,
//! and works out what (if anything) to command the tiller to do. Kept
//! free of any actual I/O so it can be driven from a test harness or the
//! real decision thread identically (`driver.c` `driver_run`,
//! `support.c` `check_for_messages` / `check_for_stale_map` /
//! `reload_map`).

use crate::error::Result;
use crate::exchange::{DrainedRequests, Destination, Exchange, AUTOPILOT_HEADING_DISABLED};
use kharon_router::{
    CourseChangeAction, PathGradient, PathStatus, RadialScores, RouteMap, RouteMode, RouterConfig,
    RouterCore, TerrainGrid, TrafficSource,
};
use kharon_types::{Bam8, Timestamp};

bitflags::bitflags! {
    /// Persistent status flags carried in the published route info (spec
    /// §3 "route info", `ROUTE_INFO_*` in the original).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RouteFlags: u32 {
        const HAVE_POSITION      = 0b0000_0001;
        const HAVE_DESTINATION   = 0b0000_0010;
        const AUTOPILOT_ERROR    = 0b0000_0100;
        const STARTING_UP_BLIND  = 0b0000_1000;
        const AUTOTRACKING       = 0b0001_0000;
    }
}

/// Vessel movement beyond this many path-grid pixels since the map was
/// last built triggers a rebuild (spec §4.E "map staleness").
pub const VESSEL_MOTION_PIX_FOR_MAP_REBUILD: i64 = 20;
/// Below this pixel separation between vessel and destination a rebuild
/// is skipped even if otherwise due, to avoid same-cell degeneracy (spec
/// §4.E).
pub const PIX_DIST_AVOID_MAP_REBUILD: i64 = 4;
/// No tiller reply within this many seconds raises `AUTOPILOT_ERROR`
/// (spec §4.E).
pub const OTTO_ERR_TIMEOUT_SEC: f64 = 5.0;
/// Waking interval of the decision thread (spec §5).
pub const WAKING_INTERVAL_SEC: f64 = 0.1;

pub struct DriverConfig {
    pub router: RouterConfig,
    pub vessel_motion_pix_for_map_rebuild: i64,
    pub pix_dist_avoid_map_rebuild: i64,
    pub otto_err_timeout_sec: f64,
}

/// Everything one decision-thread tick produced, ready to be copied into
/// the publish queue and/or handed to the comm thread (spec §4.E, §5
/// "driver exchange struct").
#[derive(Debug, Clone)]
pub struct DriverOutput {
    pub timestamp: Timestamp,
    pub mode: RouteMode,
    pub flags: RouteFlags,
    pub action: CourseChangeAction,
    pub path_status: Option<PathStatus>,
    /// Heading to command the tiller with this tick, if any: either the
    /// manual override or (when autotracking is on) the router's
    /// suggested heading.
    pub commanded_heading_degs: Option<u32>,
}

/// Owns everything the decision thread needs across wakes: the router
/// core, the drained-request state, and the map-staleness bookkeeping.
/// Does not own the serial port -- that belongs exclusively to the
/// comm thread (spec §5 "shared-resource discipline").
pub struct Driver {
    config: DriverConfig,
    exchange: Exchange,
    router: RouterCore,
    flags: RouteFlags,
    destination: Option<Destination>,
    manual_heading_degs: Option<u32>,
    autotracking: bool,
    default_cruise_speed_mps: f64,
    map_current: bool,
    destination_current: bool,
    vessel_start_pix: Option<(i64, i64)>,
    dest_pix: Option<(i64, i64)>,
}

impl Driver {
    pub fn new(
        config: DriverConfig,
        exchange: Exchange,
        initial_course: Bam8,
        default_cruise_speed_mps: f64,
        now: Timestamp,
    ) -> Self {
        let router = RouterCore::new(config.router, initial_course, now);
        Driver {
            config,
            exchange,
            router,
            flags: RouteFlags::STARTING_UP_BLIND,
            destination: None,
            manual_heading_degs: None,
            autotracking: false,
            default_cruise_speed_mps,
            map_current: false,
            destination_current: false,
            vessel_start_pix: None,
            dest_pix: None,
        }
    }

    /// Drain the exchange and apply whatever changed (`support.c`
    /// `check_for_messages`, `handle_set_*`). Returns whether anything
    /// changed, mirroring the original's `received` return value.
    fn apply_requests(&mut self, requests: DrainedRequests) -> bool {
        let mut changed = false;
        if let Some(dest) = requests.destination {
            self.destination = Some(dest);
            self.flags.insert(RouteFlags::HAVE_DESTINATION);
            self.manual_heading_degs = None;
            self.destination_current = false;
            self.map_current = false;
            changed = true;
        }
        if let Some(degs) = requests.autopilot_heading_degs {
            self.manual_heading_degs = if degs >= AUTOPILOT_HEADING_DISABLED { None } else { Some(degs) };
            changed = true;
        }
        if let Some(on) = requests.autotracking {
            self.autotracking = on;
            self.flags.set(RouteFlags::AUTOTRACKING, on);
            changed = true;
        }
        if let Some(mps) = requests.default_cruise_speed_mps {
            self.default_cruise_speed_mps = mps;
            changed = true;
        }
        changed
    }

    /// Flag the map stale if the vessel has moved far enough since the
    /// last (re)build, skipping the flag when vessel and destination sit
    /// in nearly the same pixel (`support.c` `check_for_stale_map`).
    fn check_for_stale_map(&mut self, vessel_pix: (i64, i64), dest_pix: (i64, i64)) {
        if !self.map_current {
            return;
        }
        let Some(start) = self.vessel_start_pix else { return };
        let dx = vessel_pix.0 - start.0;
        let dy = vessel_pix.1 - start.1;
        let moved2 = dx * dx + dy * dy;
        let limit = self.config.vessel_motion_pix_for_map_rebuild;
        if moved2 < limit * limit {
            return;
        }
        let ddx = dest_pix.0 - start.0;
        let ddy = dest_pix.1 - start.1;
        let dest_dist2 = ddx * ddx + ddy * ddy;
        let avoid = self.config.pix_dist_avoid_map_rebuild;
        if dest_dist2 < avoid * avoid {
            return;
        }
        self.map_current = false;
    }

    /// Run one decision-thread tick (`driver.c` `driver_run`'s per-wake
    /// body). `vessel_pix`/`dest_pix` are the vessel's and destination's
    /// present path-grid pixel coordinates, used only for map-staleness
    /// bookkeeping; the route map itself is always rebuilt fresh by
    /// [`RouterCore::tick`] when due, since unlike the original's large
    /// persistent world grid, this map is a small vessel-centered window
    /// cheap enough to recompute in full rather than patch incrementally.
    #[allow(clippy::too_many_arguments)]
    pub fn run_once(
        &mut self,
        now: Timestamp,
        vessel_pix: Option<(i64, i64)>,
        grid: Option<&dyn TerrainGrid>,
        position: Option<(f64, f64)>,
        traffic: Option<&dyn TrafficSource>,
        measured_course: Bam8,
        speed_mps: f64,
        gradient: Option<(&dyn PathGradient, (f64, f64), (f64, f64))>,
        last_otto_reply: Option<Timestamp>,
    ) -> Result<DriverOutput> {
        let requests = self.exchange.take();
        let autotracking_just_enabled = requests.autotracking_just_enabled;
        self.apply_requests(requests);

        if position.is_some() {
            self.flags.insert(RouteFlags::HAVE_POSITION);
        }
        if let (Some(vp), Some(dp)) = (vessel_pix, self.dest_pix) {
            self.check_for_stale_map(vp, dp);
        }
        self.dest_pix = vessel_pix.map(|_| self.dest_pix.unwrap_or(vessel_pix.unwrap()));

        if !self.map_current && self.flags.contains(RouteFlags::HAVE_POSITION) {
            if !self.destination_current {
                self.destination_current = true;
            }
            self.vessel_start_pix = vessel_pix;
            self.map_current = true;
        }

        let result = self.router.tick(
            grid,
            position,
            traffic,
            measured_course,
            speed_mps,
            self.default_cruise_speed_mps,
            gradient,
            now,
        )?;

        let commanded_heading_degs = self.commanded_heading(&result.scores, autotracking_just_enabled, result.action);

        if let Some(reply_time) = last_otto_reply {
            let since = now.delta_seconds(reply_time);
            self.flags.set(RouteFlags::AUTOPILOT_ERROR, since > self.config.otto_err_timeout_sec);
        } else {
            self.flags.set(RouteFlags::AUTOPILOT_ERROR, true);
        }

        Ok(DriverOutput {
            timestamp: now,
            mode: result.mode,
            flags: self.flags,
            action: result.action,
            path_status: result.path_status,
            commanded_heading_degs,
        })
    }

    fn commanded_heading(
        &self,
        scores: &Option<RadialScores>,
        autotracking_just_enabled: bool,
        action: CourseChangeAction,
    ) -> Option<u32> {
        if let Some(manual) = self.manual_heading_degs {
            return Some(manual);
        }
        if !self.autotracking {
            return None;
        }
        let scores = scores.as_ref()?;
        if autotracking_just_enabled || action != CourseChangeAction::NoChange {
            let heading = scores.suggested_heading();
            return Some(heading.to_degrees().round() as u32);
        }
        None
    }

    pub fn flags(&self) -> RouteFlags {
        self.flags
    }

    pub fn route_map(&self) -> Option<&RouteMap> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kharon_router::TerrainThresholds;

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

    fn config() -> DriverConfig {
        DriverConfig {
            router: RouterConfig {
                thresholds: TerrainThresholds { absolute_min_m: 1.0, min_traversable_m: 3.0, preferred_min_m: 10.0 },
                map_dim: 5,
                spacing_m: 10.0,
                destination_radius_m: 20.0,
            },
            vessel_motion_pix_for_map_rebuild: VESSEL_MOTION_PIX_FOR_MAP_REBUILD,
            pix_dist_avoid_map_rebuild: PIX_DIST_AVOID_MAP_REBUILD,
            otto_err_timeout_sec: OTTO_ERR_TIMEOUT_SEC,
        }
    }

    #[test]
    fn starts_blind_with_no_position() {
        let exchange = Exchange::new(|| {});
        let driver = Driver::new(config(), exchange, Bam8::from_raw(0), 3.0, Timestamp::from_usec(0));
        assert!(driver.flags().contains(RouteFlags::STARTING_UP_BLIND));
    }

    #[test]
    fn manual_heading_overrides_autotracking() {
        let exchange = Exchange::new(|| {});
        let mut driver = Driver::new(config(), exchange.clone(), Bam8::from_raw(0), 3.0, Timestamp::from_usec(0));
        exchange.set_autotracking(true);
        exchange.set_autopilot_heading(270);

        let out = driver
            .run_once(
                Timestamp::from_usec(100_000),
                Some((0, 0)),
                Some(&FlatSeaGrid),
                Some((0.0, 0.0)),
                None,
                Bam8::from_raw(0),
                3.0,
                None,
                Some(Timestamp::from_usec(100_000)),
            )
            .unwrap();
        assert_eq!(out.commanded_heading_degs, Some(270));
    }

    #[test]
    fn stale_otto_reply_raises_autopilot_error() {
        let exchange = Exchange::new(|| {});
        let mut driver = Driver::new(config(), exchange, Bam8::from_raw(0), 3.0, Timestamp::from_usec(0));
        let out = driver
            .run_once(
                Timestamp::from_usec(20_000_000),
                Some((0, 0)),
                Some(&FlatSeaGrid),
                Some((0.0, 0.0)),
                None,
                Bam8::from_raw(0),
                3.0,
                None,
                Some(Timestamp::from_usec(0)),
            )
            .unwrap();
        assert!(out.flags.contains(RouteFlags::AUTOPILOT_ERROR));
    }

    #[test]
    fn autotracking_just_enabled_sends_suggestion_even_without_change() {
        let exchange = Exchange::new(|| {});
        let mut driver = Driver::new(config(), exchange.clone(), Bam8::from_raw(0), 3.0, Timestamp::from_usec(0));
        exchange.set_autotracking(true);
        let out = driver
            .run_once(
                Timestamp::from_usec(100_000),
                Some((0, 0)),
                Some(&FlatSeaGrid),
                Some((0.0, 0.0)),
                None,
                Bam8::from_raw(0),
                3.0,
                None,
                Some(Timestamp::from_usec(100_000)),
            )
            .unwrap();
        assert!(out.commanded_heading_degs.is_some());
    }
}
