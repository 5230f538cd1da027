use kharon_types::Bam8;

/// Number of course radials, one per `Bam8` value (spec §4.D "radial grid").
pub const NUM_RADIALS: usize = 256;
/// Half-width, in radials, of the arc-averaging window.
pub const ARC_NEIGHBORS: usize = 24;

/// Upper bound, in seconds, of each of the five traffic-projection
/// intervals; the last interval has no upper bound.
pub const INTERVAL_BOUNDARIES_SEC: [f64; 5] = [10.0, 20.0, 40.0, 80.0, f64::INFINITY];
/// Per-interval weighting applied before the harmonic combination (spec
/// §4.D "interval weighting").
pub const INTERVAL_OFFSETS: [f64; 5] = [0.0, 0.1, 0.4, 0.8, 0.9];

/// Solved from the spec's two worked examples (`score ≈ 0.55` at a 45°
/// heading change, `score ≈ 0.10` at 180°): at `delta = 128` (half turn,
/// 8-bit BAM units), `sqrt(128/128) = 1`, so `score = 1 - (1-k) = k`,
/// giving `k = 0.10`; checked against the 45° example
/// (`delta = 32`, `sqrt(32/128) = 0.5`, `score = 1 - 0.9*0.5 = 0.55`).
pub const ROUTE_SCORE_RECIPROCAL_HEADING: f64 = 0.10;

/// A source of traffic-derived risk per radial and per projection
/// interval, supplied by the associator/traffic layer outside this crate
/// (spec §4.D responsibility boundary). `give_way_score` and
/// `stand_on_score` share the same underlying traffic projection per the
/// router's give-way/stand-on resolution.
pub trait TrafficSource {
    /// Risk-derived score in `[0,1]` for radial `r` at interval index `i`
    /// (`i` indexes [`INTERVAL_BOUNDARIES_SEC`]), where 1.0 means clear.
    fn stand_on_score(&self, r: usize, interval: usize) -> f64;
    fn give_way_score(&self, r: usize, interval: usize) -> f64;
}

/// Per-radial, per-interval terrain occupancy, reduced from the route map
/// by projecting each node onto the radial/interval it falls within (spec
/// §4.D "node projection"). Initialized optimistic (1.0, fully clear) and
/// only ever lowered as nodes are folded in.
pub struct RadialGrid {
    pub terrain: [[f64; 5]; NUM_RADIALS],
}

impl Default for RadialGrid {
    fn default() -> Self {
        RadialGrid { terrain: [[1.0; 5]; NUM_RADIALS] }
    }
}

impl RadialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one route-map node's terrain score into every `(radial,
    /// interval)` cell covered by its subtended arc
    /// (`[left_edge, right_edge]`) and its `[arrival_dt_sec, exit_dt_sec]`
    /// time window, keeping the minimum seen so far ("push by min", spec
    /// §4.D "node projection").
    pub fn project_node(
        &mut self,
        left_edge: Bam8,
        right_edge: Bam8,
        arrival_dt_sec: f64,
        exit_dt_sec: f64,
        terrain_score: f64,
    ) {
        let left = left_edge.raw() as usize;
        let span = right_edge.raw().wrapping_sub(left_edge.raw()) as usize;
        // A degenerate or near-360-degree arc (a node essentially on top of
        // the vessel) covers every radial rather than wrapping through an
        // enormous wedge.
        let count = if span >= NUM_RADIALS - 1 { NUM_RADIALS } else { span + 1 };

        let arrival_interval = interval_index(arrival_dt_sec);
        let exit_interval = interval_index(exit_dt_sec).max(arrival_interval);

        for i in 0..count {
            let r = (left + i) % NUM_RADIALS;
            for interval in arrival_interval..=exit_interval {
                let cell = &mut self.terrain[r][interval];
                if terrain_score < *cell {
                    *cell = terrain_score;
                }
            }
        }
    }
}

fn interval_index(dt_sec: f64) -> usize {
    INTERVAL_BOUNDARIES_SEC
        .iter()
        .position(|&bound| dt_sec <= bound)
        .unwrap_or(INTERVAL_BOUNDARIES_SEC.len() - 1)
}

/// Running "descending ceiling" minimum over a `±ARC_NEIGHBORS` window
/// around radial `r`, averaged over all 25 offsets (spec §4.D "arc
/// scoring"). Each side tracks its own monotonically non-increasing
/// ceiling as the window widens, so a single blocked radial shadows every
/// wider arc that contains it.
pub fn compute_arc(scores: &[f64; NUM_RADIALS], r: usize) -> f64 {
    let mut left_ceiling = scores[r];
    let mut right_ceiling = scores[r];
    let mut sum = left_ceiling.min(right_ceiling);
    for d in 1..=ARC_NEIGHBORS {
        let left_idx = (r + NUM_RADIALS - d) % NUM_RADIALS;
        let right_idx = (r + d) % NUM_RADIALS;
        left_ceiling = left_ceiling.min(scores[left_idx]);
        right_ceiling = right_ceiling.min(scores[right_idx]);
        sum += left_ceiling.min(right_ceiling);
    }
    sum / (ARC_NEIGHBORS as f64 + 1.0)
}

/// Score in `[0,1]` for how closely radial `r` matches the vessel's
/// current course: 1.0 dead ahead, falling off to
/// `ROUTE_SCORE_RECIPROCAL_HEADING` at 180 degrees off (spec §4.D
/// "direction score").
pub fn direction_score(r: Bam8, course: Bam8) -> f64 {
    let delta = r.abs_distance(course) as f64;
    let k = ROUTE_SCORE_RECIPROCAL_HEADING;
    1.0 - (1.0 - k) * (delta / 128.0).sqrt()
}

/// Weighted harmonic mean of arbitrary values; a single near-zero value
/// dominates the result, matching the combination's "any interval can
/// veto" behavior (spec §4.D "modality combination").
pub fn weighted_harmonic(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let weight_sum: f64 = weights.iter().sum();
    let denom: f64 = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w / v.max(1e-9))
        .sum();
    weight_sum / denom
}

/// Combine the five interval-adjusted scores for one radial into a single
/// score. Finds the two lowest values, counts ties at the minimum, and
/// weights the low pair more heavily the more of them tie (spec §4.D
/// "interval combination").
pub fn combine_interval(adjusted: &[f64; 5]) -> f64 {
    let mut sorted: Vec<f64> = adjusted.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let low0 = sorted[0];
    let low1 = sorted[1];
    let ties = adjusted.iter().filter(|&&v| (v - low0).abs() < 1e-9).count();
    let w = 7.0 + 3.0 * (ties as f64 - 1.0).max(0.0);
    (w + 1.0) / (w / low0.max(1e-9) + 1.0 / low1.max(1e-9))
}

/// Final combined score for one radial: terrain, stand-on traffic, and
/// direction, weighted 2:2:1 (spec §4.D "final combination").
pub fn combine_modalities(terrain: f64, stand_on: f64, direction: f64) -> f64 {
    weighted_harmonic(&[terrain, stand_on, direction], &[2.0, 2.0, 1.0])
}

/// Outcome of comparing the suggested (net-score-optimal) heading against
/// the preferred (direction-score-optimal) heading (spec §4.D "course
/// divergence").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseAgreement {
    PathClear,
    Divert,
}

/// Threshold, in `Bam8` units (`360/256 ≈ 1.406°` per unit, so 8 units is
/// ≈11.25°), above which the suggested and preferred headings are
/// considered to have diverged (spec §4.D).
pub const DIVERT_THRESHOLD_BAM8: u8 = 8;

/// Per-radial net score table built by folding terrain, traffic, and
/// direction scores together, from which suggested and preferred headings
/// are selected (spec §4.D).
pub struct RadialScores {
    pub net: [f64; NUM_RADIALS],
    pub direction_only: [f64; NUM_RADIALS],
}

impl RadialScores {
    pub fn build(grid: &RadialGrid, traffic: &dyn TrafficSource, course: Bam8) -> Self {
        let mut terrain_arc = [0.0; NUM_RADIALS];
        let mut stand_on_raw = [0.0; NUM_RADIALS];
        let mut give_way_raw = [0.0; NUM_RADIALS];
        for r in 0..NUM_RADIALS {
            let mut terrain_adjusted = [0.0; 5];
            let mut stand_on_adjusted = [0.0; 5];
            let mut give_way_adjusted = [0.0; 5];
            for (i, &offset) in INTERVAL_OFFSETS.iter().enumerate() {
                terrain_adjusted[i] = grid.terrain[r][i] * (1.0 - offset) + offset;
                stand_on_adjusted[i] = traffic.stand_on_score(r, i) * (1.0 - offset) + offset;
                give_way_adjusted[i] = traffic.give_way_score(r, i) * (1.0 - offset) + offset;
            }
            terrain_arc[r] = combine_interval(&terrain_adjusted);
            stand_on_raw[r] = combine_interval(&stand_on_adjusted);
            give_way_raw[r] = combine_interval(&give_way_adjusted);
        }
        // Arc scoring (the ±24-neighbor descending ceiling) applies to the
        // terrain and traffic channels independently (spec §4.D "arc
        // scoring"), not just to terrain.
        let mut terrain_scores = [0.0; NUM_RADIALS];
        let mut stand_on_scores = [0.0; NUM_RADIALS];
        let mut give_way_scores = [0.0; NUM_RADIALS];
        for r in 0..NUM_RADIALS {
            terrain_scores[r] = compute_arc(&terrain_arc, r);
            stand_on_scores[r] = compute_arc(&stand_on_raw, r);
            give_way_scores[r] = compute_arc(&give_way_raw, r);
        }

        let mut net = [0.0; NUM_RADIALS];
        let mut direction_only = [0.0; NUM_RADIALS];
        for r in 0..NUM_RADIALS {
            let radial = Bam8::from_raw(r as u8);
            // give_way_score is wired to the same traffic-analysis output
            // as stand_on_score (no distinct give-way producer survives in
            // the source); fold the two right-of-way channels together
            // before applying the terrain/stand-on/direction 2:2:1 weights.
            let traffic = weighted_harmonic(&[stand_on_scores[r], give_way_scores[r]], &[1.0, 1.0]);
            let direction = direction_score(radial, course);
            direction_only[r] = direction;
            net[r] = combine_modalities(terrain_scores[r], traffic, direction);
        }

        RadialScores { net, direction_only }
    }

    fn argmax(scores: &[f64; NUM_RADIALS]) -> Bam8 {
        let mut best = 0usize;
        for r in 1..NUM_RADIALS {
            if scores[r] > scores[best] {
                best = r;
            }
        }
        Bam8::from_raw(best as u8)
    }

    pub fn suggested_heading(&self) -> Bam8 {
        Self::argmax(&self.net)
    }

    pub fn preferred_heading(&self) -> Bam8 {
        Self::argmax(&self.direction_only)
    }

    pub fn agreement(&self) -> CourseAgreement {
        let delta = self.suggested_heading().abs_distance(self.preferred_heading());
        if delta >= DIVERT_THRESHOLD_BAM8 {
            CourseAgreement::Divert
        } else {
            CourseAgreement::PathClear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClearTraffic;
    impl TrafficSource for ClearTraffic {
        fn stand_on_score(&self, _r: usize, _i: usize) -> f64 {
            1.0
        }
        fn give_way_score(&self, _r: usize, _i: usize) -> f64 {
            1.0
        }
    }

    #[test]
    fn direction_score_matches_worked_examples() {
        let course = Bam8::from_raw(0);
        let ahead = direction_score(course, course);
        assert!((ahead - 1.0).abs() < 1e-9);

        let delta_45 = Bam8::from_raw(32);
        let s45 = direction_score(delta_45, course);
        assert!((s45 - 0.55).abs() < 1e-6, "got {s45}");

        let delta_180 = Bam8::from_raw(128);
        let s180 = direction_score(delta_180, course);
        assert!((s180 - 0.10).abs() < 1e-6, "got {s180}");
    }

    #[test]
    fn clear_grid_prefers_straight_ahead() {
        let grid = RadialGrid::new();
        let traffic = ClearTraffic;
        let course = Bam8::from_raw(64);
        let scores = RadialScores::build(&grid, &traffic, course);
        assert_eq!(scores.suggested_heading(), course);
        assert_eq!(scores.agreement(), CourseAgreement::PathClear);
    }

    #[test]
    fn blocked_radial_shadows_nearby_arcs() {
        let mut scores = [1.0; NUM_RADIALS];
        scores[10] = 0.0;
        let arc_on_block = compute_arc(&scores, 10);
        let arc_far_away = compute_arc(&scores, 128);
        assert!(arc_on_block < arc_far_away);
    }

    #[test]
    fn combine_interval_is_dominated_by_lowest_values() {
        let mostly_clear = [1.0, 1.0, 1.0, 1.0, 0.01];
        let all_clear = [1.0; 5];
        assert!(combine_interval(&mostly_clear) < combine_interval(&all_clear));
    }

    #[test]
    fn project_node_fills_the_full_radial_interval_rectangle() {
        let mut grid = RadialGrid::new();
        // A node spanning radials [10, 14] and arrival/exit times that
        // straddle the 10s and 20s interval boundary (intervals 0 and 1)
        // should lower every cell in that 5x2 rectangle, and nothing else.
        grid.project_node(Bam8::from_raw(10), Bam8::from_raw(14), 5.0, 15.0, 0.2);

        for r in 10..=14 {
            assert_eq!(grid.terrain[r][0], 0.2, "radial {r} interval 0 not projected");
            assert_eq!(grid.terrain[r][1], 0.2, "radial {r} interval 1 not projected");
            assert_eq!(grid.terrain[r][2], 1.0, "radial {r} interval 2 wrongly touched");
        }
        assert_eq!(grid.terrain[9][0], 1.0, "radial left of arc wrongly touched");
        assert_eq!(grid.terrain[15][0], 1.0, "radial right of arc wrongly touched");
    }

    #[test]
    fn project_node_wraps_across_the_360_degree_seam() {
        let mut grid = RadialGrid::new();
        grid.project_node(Bam8::from_raw(254), Bam8::from_raw(2), 1.0, 1.0, 0.3);
        for r in [254usize, 255, 0, 1, 2] {
            assert_eq!(grid.terrain[r][0], 0.3);
        }
        assert_eq!(grid.terrain[3][0], 1.0);
        assert_eq!(grid.terrain[253][0], 1.0);
    }

    #[test]
    fn project_node_keeps_the_minimum_across_overlapping_pushes() {
        let mut grid = RadialGrid::new();
        grid.project_node(Bam8::from_raw(0), Bam8::from_raw(4), 1.0, 1.0, 0.5);
        grid.project_node(Bam8::from_raw(2), Bam8::from_raw(6), 1.0, 1.0, 0.1);
        // Radial 2 is covered by both pushes; the lower score must win.
        assert_eq!(grid.terrain[2][0], 0.1);
        // Radial 0 was only covered by the first, higher-scoring push.
        assert_eq!(grid.terrain[0][0], 0.5);
    }

    struct GiveWayBlocked;
    impl TrafficSource for GiveWayBlocked {
        fn stand_on_score(&self, _r: usize, _i: usize) -> f64 {
            1.0
        }
        fn give_way_score(&self, r: usize, _i: usize) -> f64 {
            if r == 64 {
                0.01
            } else {
                1.0
            }
        }
    }

    #[test]
    fn give_way_score_is_wired_into_the_net_score() {
        let grid = RadialGrid::new();
        let course = Bam8::from_raw(64);
        let clear = RadialScores::build(&grid, &ClearTraffic, course);
        let blocked = RadialScores::build(&grid, &GiveWayBlocked, course);
        assert!(
            blocked.net[64] < clear.net[64],
            "a give-way risk at radial 64 should depress its net score"
        );
        // Arc scoring spreads the risk to neighbors too.
        assert!(blocked.net[70] < clear.net[70]);
    }

    #[test]
    fn traffic_channel_gets_arc_averaged_like_terrain() {
        let grid = RadialGrid::new();
        let course = Bam8::from_raw(0);
        let scores = RadialScores::build(&grid, &GiveWayBlocked, course);
        // Radial 64 is blocked directly; 50 and 78 are within the +/-24
        // arc window and should be shadowed, while 150 is outside it.
        assert!(scores.net[64] < scores.net[150]);
        assert!(scores.net[50] < scores.net[150]);
        assert!(scores.net[78] < scores.net[150]);
    }
}
