//! Router (spec §4.D): builds a vessel-centered route map from terrain,
//! folds in traffic risk and the vessel's own course, and decides when the
//! suggested heading warrants a course change.

mod decision;
mod error;
mod radial;
mod route_map;
mod terrain;

pub use decision::{
    evaluate_course_change, evaluate_path_status, CourseChangeAction, PathGradient, PathStatus,
    RouteInfo, RouteMode, HEADING_DELTA_RESPONSE_WINDOW_SEC, IMMEDIATE_SCORE_DELTA_FRACTION,
    OTTO_COURSE_CHANGE_RESPONSE_WINDOW_SEC, SUGGEST_HEADING_DELTA_DEG,
    SUGGEST_SCORE_DELTA_FRACTION,
};
pub use error::{Result, RouterError};
pub use radial::{
    combine_interval, combine_modalities, compute_arc, direction_score, weighted_harmonic,
    CourseAgreement, RadialGrid, RadialScores, TrafficSource, ARC_NEIGHBORS,
    DIVERT_THRESHOLD_BAM8, INTERVAL_BOUNDARIES_SEC, INTERVAL_OFFSETS, NUM_RADIALS,
    ROUTE_SCORE_RECIPROCAL_HEADING,
};
pub use route_map::{build_route_map, RouteMap, RouteMapNode};
pub use terrain::{
    depth_score, terrain_score, TerrainGrid, TerrainThresholds, ADJACENCY_16_PENALTY,
    ADJACENCY_8_PENALTY,
};

use kharon_types::{Bam8, Timestamp};

/// Configuration for one router tick (spec §4.D).
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub thresholds: TerrainThresholds,
    pub map_dim: usize,
    pub spacing_m: f64,
    pub destination_radius_m: f64,
}

/// Everything the router produced for one tick: the route map it built
/// (when terrain data was available), the per-radial scores (when
/// traffic/course data was available), and the resulting course-change
/// decision.
pub struct RouterTickResult {
    pub mode: RouteMode,
    pub route_map: Option<RouteMap>,
    pub scores: Option<RadialScores>,
    pub path_status: Option<PathStatus>,
    pub action: CourseChangeAction,
}

/// Ties the route map builder, radial scorer, and course-change decision
/// together into a single per-tick entry point, carrying the
/// [`RouteInfo`] state needed to throttle repeated suggestions (spec §3
/// "route info", §4.D).
pub struct RouterCore {
    config: RouterConfig,
    info: RouteInfo,
}

impl RouterCore {
    pub fn new(config: RouterConfig, initial_course: Bam8, now: Timestamp) -> Self {
        RouterCore { config, info: RouteInfo::new(initial_course, now) }
    }

    /// Run one router tick. `position` is the vessel's terrain-grid cell
    /// coordinates when a position fix is available; `traffic` is the
    /// current traffic projection when tracking is active; `gradient`,
    /// when present, overlays an external path to follow.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        grid: Option<&dyn TerrainGrid>,
        position: Option<(f64, f64)>,
        traffic: Option<&dyn TrafficSource>,
        course: Bam8,
        speed_mps: f64,
        default_speed_mps: f64,
        gradient: Option<(&dyn PathGradient, (f64, f64), (f64, f64))>,
        now: Timestamp,
    ) -> Result<RouterTickResult> {
        let mode = RouteMode::from_availability(grid.is_some() && position.is_some(), traffic.is_some());

        let route_map = match (grid, position) {
            (Some(grid), Some((vx, vy))) => Some(route_map::build_route_map(
                grid,
                &self.config.thresholds,
                vx,
                vy,
                self.config.map_dim,
                self.config.spacing_m,
                speed_mps,
                default_speed_mps,
            )?),
            _ => None,
        };

        let scores = if let Some(map) = &route_map {
            let mut radial_grid = RadialGrid::new();
            for node in &map.nodes {
                radial_grid.project_node(
                    node.radial_left_edge.to_bam8(),
                    node.radial_right_edge.to_bam8(),
                    node.arrival_dt_sec,
                    node.exit_dt_sec,
                    node.terrain_score,
                );
            }
            let traffic_source: &dyn TrafficSource = traffic.unwrap_or(&ClearTraffic);
            Some(RadialScores::build(&radial_grid, traffic_source, course))
        } else if let Some(traffic) = traffic {
            let radial_grid = RadialGrid::new();
            Some(RadialScores::build(&radial_grid, traffic, course))
        } else {
            None
        };

        let path_status = gradient.map(|(g, (vx, vy), (dx, dy))| {
            evaluate_path_status(g, vx, vy, dx, dy, self.config.destination_radius_m)
        });

        let action = if let Some(scores) = &scores {
            let suggested = scores.suggested_heading();
            let suggested_score = scores.net[suggested.raw() as usize];
            let reference_score = scores.net[self.info.last_changed_course.raw() as usize];
            let decided = evaluate_course_change(
                self.info.last_changed_course,
                reference_score,
                suggested,
                suggested_score,
                self.info.seconds_since_change(now),
            );
            if decided != CourseChangeAction::NoChange {
                self.info.record_change(suggested, now);
            }
            decided
        } else {
            CourseChangeAction::NoChange
        };

        Ok(RouterTickResult { mode, route_map, scores, path_status, action })
    }
}

struct ClearTraffic;
impl TrafficSource for ClearTraffic {
    fn stand_on_score(&self, _r: usize, _interval: usize) -> f64 {
        1.0
    }
    fn give_way_score(&self, _r: usize, _interval: usize) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn tick_with_no_inputs_runs_blind() {
        let config = RouterConfig {
            thresholds: TerrainThresholds {
                absolute_min_m: 1.0,
                min_traversable_m: 3.0,
                preferred_min_m: 10.0,
            },
            map_dim: 5,
            spacing_m: 10.0,
            destination_radius_m: 20.0,
        };
        let mut core = RouterCore::new(config, Bam8::from_raw(0), Timestamp::from_usec(0));
        let result = core
            .tick(None, None, None, Bam8::from_raw(0), 3.0, 1.0, None, Timestamp::from_usec(0))
            .unwrap();
        assert_eq!(result.mode, RouteMode::RunningBlind);
        assert!(result.route_map.is_none());
        assert!(result.scores.is_none());
    }

    #[test]
    fn tick_with_terrain_only_builds_map_and_scores() {
        let config = RouterConfig {
            thresholds: TerrainThresholds {
                absolute_min_m: 1.0,
                min_traversable_m: 3.0,
                preferred_min_m: 10.0,
            },
            map_dim: 5,
            spacing_m: 10.0,
            destination_radius_m: 20.0,
        };
        let mut core = RouterCore::new(config, Bam8::from_raw(0), Timestamp::from_usec(0));
        let result = core
            .tick(
                Some(&FlatSeaGrid),
                Some((0.0, 0.0)),
                None,
                Bam8::from_raw(0),
                3.0,
                1.0,
                None,
                Timestamp::from_usec(0),
            )
            .unwrap();
        assert_eq!(result.mode, RouteMode::TerrainOnly);
        assert!(result.route_map.is_some());
        assert!(result.scores.is_some());
    }
}
