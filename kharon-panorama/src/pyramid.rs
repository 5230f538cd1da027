use kharon_types::Bam16;

/// Sentinel radius marking a pixel slot as never written (spec §3 "radius
/// sentinel 0xFFFF").
pub const EMPTY_RADIUS: u16 = 0xFFFF;

/// One projected pixel: YV chroma/luma plus the bookkeeping needed for the
/// foreground/background overlap rule (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanoramaPixel {
    pub color_y: u8,
    pub color_v: u8,
    /// Distance in source pixels from the producing camera's image center;
    /// lower is "more on-axis" and wins foreground.
    pub radius: u16,
    pub cam_id: u8,
    pub border_flag: bool,
}

impl PanoramaPixel {
    pub const EMPTY: PanoramaPixel = PanoramaPixel {
        color_y: 0,
        color_v: 0,
        radius: EMPTY_RADIUS,
        cam_id: 0,
        border_flag: false,
    };

    pub fn is_empty(&self) -> bool {
        self.radius == EMPTY_RADIUS
    }
}

impl Default for PanoramaPixel {
    fn default() -> Self {
        PanoramaPixel::EMPTY
    }
}

/// Foreground/background pair for one buffer cell. Invariant (spec §3):
/// for any cell with content, `fg.radius <= bg.radius`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelSlot {
    pub fg: PanoramaPixel,
    pub bg: PanoramaPixel,
}

/// One level of the cylindrical world pyramid (spec §3, §4.C): a
/// `width x height` grid where `width` spans the full 360 degree seam and
/// `height` covers +/- `height_deg` about the horizon.
pub struct PyramidLevel {
    pub pixels_per_degree: u32,
    pub width: u32,
    pub height: u32,
    cells: Vec<PixelSlot>,
}

impl PyramidLevel {
    pub fn new(pixels_per_degree: u32, height_deg: f64) -> Self {
        let width = 360 * pixels_per_degree;
        let height = (2.0 * height_deg * pixels_per_degree as f64).round() as u32;
        PyramidLevel {
            pixels_per_degree,
            width,
            height,
            cells: vec![PixelSlot::default(); (width * height) as usize],
        }
    }

    fn index(&self, col: u32, row: u32) -> usize {
        (row * self.width + col) as usize
    }

    pub fn cell(&self, col: u32, row: u32) -> PixelSlot {
        self.cells[self.index(col, row)]
    }

    /// Overwrite a cell directly, bypassing the overlap rule. Used by the
    /// phantom overlay, which blends into existing content rather than
    /// competing with it by radius.
    pub fn set_cell(&mut self, col: u32, row: u32, slot: PixelSlot) {
        if row >= self.height {
            return;
        }
        let col = col % self.width;
        let idx = self.index(col, row);
        self.cells[idx] = slot;
    }

    /// Apply the overlap rule (spec §4.C) writing `src` to `(col, row)`,
    /// wrapping `col` at the 360 degree seam.
    pub fn write_pixel(&mut self, col: u32, row: u32, src: PanoramaPixel) {
        if row >= self.height {
            return;
        }
        let col = col % self.width;
        let idx = self.index(col, row);
        let dst = &mut self.cells[idx];
        if dst.fg.is_empty() {
            dst.fg = src;
        } else if src.radius < dst.fg.radius {
            dst.bg = dst.fg;
            dst.fg = src;
        } else {
            dst.bg = src;
        }
    }

    /// Project a rectangular source frame into this level, row-major, with
    /// horizontal wrap at the seam (spec §4.C "Projection"). `world_center`
    /// is the longitude (BAM16) the frame's own optical center maps to;
    /// `world_center_row` is the vertical row it maps to. Each source pixel
    /// carries a `radius` precomputed as its distance from the frame's own
    /// image center.
    #[allow(clippy::too_many_arguments)]
    pub fn project_frame<F>(
        &mut self,
        world_center: Bam16,
        world_center_row: i32,
        src_width: u32,
        src_height: u32,
        cam_id: u8,
        mut pixel_at: F,
    ) where
        F: FnMut(u32, u32) -> Option<(u8, u8)>,
    {
        let src_cx = src_width as f64 / 2.0;
        let src_cy = src_height as f64 / 2.0;
        let center_col = (world_center.to_degrees() / 360.0 * self.width as f64).round() as i64;

        for sy in 0..src_height {
            let row = world_center_row + (sy as i32 - src_cy as i32);
            if row < 0 || row as u32 >= self.height {
                continue;
            }
            for sx in 0..src_width {
                let Some((y, v)) = pixel_at(sx, sy) else {
                    continue;
                };
                let dx = sx as f64 - src_cx;
                let dy = sy as f64 - src_cy;
                let radius = (dx * dx + dy * dy).sqrt().round().min((EMPTY_RADIUS - 1) as f64) as u16;
                let col = center_col + (sx as i64 - src_cx as i64);
                let col = col.rem_euclid(self.width as i64) as u32;
                let border = sx == 0 || sy == 0 || sx + 1 == src_width || sy + 1 == src_height;
                self.write_pixel(
                    col,
                    row as u32,
                    PanoramaPixel {
                        color_y: y,
                        color_v: v,
                        radius,
                        cam_id,
                        border_flag: border,
                    },
                );
            }
        }
    }
}

/// 360 one-degree radials marking which directions have recent camera
/// coverage with margin (spec §4.C "coverage bitmap").
#[derive(Debug, Clone)]
pub struct CoverageBitmap {
    covered: [bool; 360],
}

/// Minimum clearance, in degrees, a camera frame's span must maintain past
/// a radial's edges for that radial to count as covered (spec §4.C).
pub const COVERAGE_MARGIN_DEG: f64 = 1.5;

impl CoverageBitmap {
    pub fn new() -> Self {
        CoverageBitmap { covered: [false; 360] }
    }

    pub fn clear(&mut self) {
        self.covered = [false; 360];
    }

    /// Mark radials covered by a camera frame spanning `[lon_min, lon_max)`
    /// degrees (wrapping), requiring `COVERAGE_MARGIN_DEG` of margin on
    /// both sides of each one-degree radial.
    pub fn mark_span(&mut self, lon_min_deg: f64, lon_max_deg: f64) {
        let span = (lon_max_deg - lon_min_deg).rem_euclid(360.0);
        if span <= 2.0 * COVERAGE_MARGIN_DEG {
            return;
        }
        for deg in 0..360u32 {
            let radial_start = deg as f64;
            let radial_end = deg as f64 + 1.0;
            let offset_start = (radial_start - lon_min_deg).rem_euclid(360.0);
            let offset_end = (radial_end - lon_min_deg).rem_euclid(360.0);
            if offset_start >= COVERAGE_MARGIN_DEG && offset_end <= span - COVERAGE_MARGIN_DEG {
                self.covered[deg as usize] = true;
            }
        }
    }

    pub fn is_covered(&self, radial_deg: u32) -> bool {
        self.covered[(radial_deg % 360) as usize]
    }

    pub fn covered_count(&self) -> usize {
        self.covered.iter().filter(|c| **c).count()
    }
}

impl Default for CoverageBitmap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closer_radius_wins_foreground() {
        let mut level = PyramidLevel::new(2, 10.0);
        level.write_pixel(
            10,
            10,
            PanoramaPixel { color_y: 1, color_v: 1, radius: 50, cam_id: 0, border_flag: false },
        );
        level.write_pixel(
            10,
            10,
            PanoramaPixel { color_y: 2, color_v: 2, radius: 10, cam_id: 1, border_flag: false },
        );
        let cell = level.cell(10, 10);
        assert_eq!(cell.fg.radius, 10);
        assert_eq!(cell.bg.radius, 50);
        assert!(cell.fg.radius <= cell.bg.radius);
    }

    #[test]
    fn farther_radius_demoted_to_background() {
        let mut level = PyramidLevel::new(2, 10.0);
        level.write_pixel(
            5,
            5,
            PanoramaPixel { color_y: 1, color_v: 1, radius: 10, cam_id: 0, border_flag: false },
        );
        level.write_pixel(
            5,
            5,
            PanoramaPixel { color_y: 2, color_v: 2, radius: 40, cam_id: 1, border_flag: false },
        );
        let cell = level.cell(5, 5);
        assert_eq!(cell.fg.radius, 10);
        assert_eq!(cell.bg.radius, 40);
    }

    #[test]
    fn coverage_requires_margin_on_both_sides() {
        let mut cov = CoverageBitmap::new();
        cov.mark_span(10.0, 20.0);
        assert!(!cov.is_covered(10));
        assert!(!cov.is_covered(19));
        assert!(cov.is_covered(12));
        assert!(cov.is_covered(17));
    }
}
