use crate::error::{Result, RouterError};
use crate::terrain::{terrain_score, TerrainGrid, TerrainThresholds};
use kharon_types::Bam16;

/// One node of the vessel-centered route map (spec §3 "Route map").
#[derive(Debug, Clone, Copy)]
pub struct RouteMapNode {
    pub world_node_idx: u32,
    /// Distance from the map center, normalized 0..1 at the map edge.
    pub distance: f64,
    pub radial: Bam16,
    pub radial_left_edge: Bam16,
    pub radial_right_edge: Bam16,
    pub arrival_dt_sec: f64,
    pub exit_dt_sec: f64,
    pub terrain_score: f64,
}

/// A square, odd-dimension grid of [`RouteMapNode`]s centered on the
/// vessel (spec §3, §4.D "Route-map reset").
pub struct RouteMap {
    pub dim: usize,
    pub nodes: Vec<RouteMapNode>,
}

impl RouteMap {
    pub fn node(&self, gx: usize, gy: usize) -> &RouteMapNode {
        &self.nodes[gy * self.dim + gx]
    }
}

/// Half the node's footprint diagonal, i.e. the distance from its center
/// to its nearest corner, used for the near/far arrival-time bounds and
/// the subtended-arc half-angle (spec §4.D).
fn node_corner_radius(spacing_m: f64) -> f64 {
    spacing_m * std::f64::consts::SQRT_2 / 2.0
}

/// Compass bearing (0 = north, clockwise) from a node offset expressed in
/// meters east (`dx_m`) and north (`dy_m`).
fn bearing_deg(dx_m: f64, dy_m: f64) -> f64 {
    dx_m.atan2(dy_m).to_degrees().rem_euclid(360.0)
}

/// Build a route map centered on the vessel's current position, expressed
/// in the terrain grid's own integer cell coordinates (spec §4.D).
#[allow(clippy::too_many_arguments)]
pub fn build_route_map(
    grid: &dyn TerrainGrid,
    thresholds: &TerrainThresholds,
    vessel_grid_x: f64,
    vessel_grid_y: f64,
    dim: usize,
    spacing_m: f64,
    speed_mps: f64,
    default_speed_mps: f64,
) -> Result<RouteMap> {
    if dim % 2 == 0 || dim < 3 {
        return Err(RouterError::Configuration(
            "route map dimension must be odd and >= 3".into(),
        ));
    }
    let half = (dim / 2) as i64;
    let corner_radius_m = node_corner_radius(spacing_m);
    let max_dist_m = half as f64 * spacing_m;
    let divisor = speed_mps.max(default_speed_mps).max(1e-6);

    let mut nodes = Vec::with_capacity(dim * dim);
    for gy in -half..=half {
        for gx in -half..=half {
            let world_x = (vessel_grid_x + gx as f64).round() as i64;
            let world_y = (vessel_grid_y + gy as f64).round() as i64;
            let world_node_idx = grid.world_index(world_x, world_y);
            let score = terrain_score(grid, world_x, world_y, thresholds);

            let dx_m = gx as f64 * spacing_m;
            let dy_m = gy as f64 * spacing_m;
            let dist_m = (dx_m * dx_m + dy_m * dy_m).sqrt();
            let bearing = bearing_deg(dx_m, dy_m);
            let half_angle_deg = if dist_m > 1e-6 {
                (corner_radius_m / dist_m).atan().to_degrees()
            } else {
                180.0
            };

            let dist_near_m = (dist_m - corner_radius_m).max(0.0);
            let dist_far_m = dist_m + corner_radius_m;

            nodes.push(RouteMapNode {
                world_node_idx,
                distance: (dist_m / max_dist_m.max(1e-6)).min(1.0),
                radial: Bam16::from_degrees(bearing),
                radial_left_edge: Bam16::from_degrees(bearing - half_angle_deg),
                radial_right_edge: Bam16::from_degrees(bearing + half_angle_deg),
                arrival_dt_sec: dist_near_m / divisor,
                exit_dt_sec: dist_far_m / speed_mps.max(1e-6),
                terrain_score: score,
            });
        }
    }
    Ok(RouteMap { dim, nodes })
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
    fn center_node_has_zero_distance() {
        let t = TerrainThresholds { absolute_min_m: 1.0, min_traversable_m: 3.0, preferred_min_m: 10.0 };
        let map = build_route_map(&FlatSeaGrid, &t, 0.0, 0.0, 5, 10.0, 3.0, 1.0).unwrap();
        let center = map.node(2, 2);
        assert!(center.distance < 1e-6);
        assert_eq!(center.terrain_score, 1.0);
    }

    #[test]
    fn rejects_even_dimension() {
        let t = TerrainThresholds { absolute_min_m: 1.0, min_traversable_m: 3.0, preferred_min_m: 10.0 };
        assert!(build_route_map(&FlatSeaGrid, &t, 0.0, 0.0, 4, 10.0, 3.0, 1.0).is_err());
    }
}
