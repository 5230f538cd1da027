use crate::pyramid::{PanoramaPixel, PyramidLevel};

/// A fixed-extent float accumulator for overlaying synthetic ("phantom")
/// targets onto the panorama (spec §4.C "Accumulator and phantom overlay").
/// Deliberately excludes anything below this interface: callers decide
/// what to overlay and where.
pub struct PhantomAccumulator {
    width: u32,
    height: u32,
    value: Vec<f32>,
    weight: Vec<f32>,
}

impl PhantomAccumulator {
    pub fn new(width: u32, height: u32) -> Self {
        let n = (width * height) as usize;
        PhantomAccumulator {
            width,
            height,
            value: vec![0.0; n],
            weight: vec![0.0; n],
        }
    }

    fn index(&self, col: u32, row: u32) -> usize {
        (row * self.width + col) as usize
    }

    pub fn clear(&mut self) {
        self.value.iter_mut().for_each(|v| *v = 0.0);
        self.weight.iter_mut().for_each(|w| *w = 0.0);
    }

    /// Add a single pixel at full weight.
    pub fn add_pixel(&mut self, col: u32, row: u32, value: f32) {
        self.add_weighted(col, row, value, 1.0);
    }

    /// Add a value with an arbitrary weight, accumulating both the
    /// weighted value and the weight itself (used later to derive opacity).
    pub fn add_weighted(&mut self, col: u32, row: u32, value: f32, weight: f32) {
        if col >= self.width || row >= self.height {
            return;
        }
        let idx = self.index(col, row);
        self.value[idx] += value * weight;
        self.weight[idx] += weight;
    }

    /// In-place radius-1 Gaussian blur (kernel `[1, 2, 1] / 4` separable),
    /// applied to both the value and weight planes.
    pub fn gaussian_blur(&mut self) {
        self.value = blur_plane(&self.value, self.width, self.height);
        self.weight = blur_plane(&self.weight, self.width, self.height);
    }

    /// Downsample by an integer `factor`, box-averaging both planes.
    pub fn downsample(&self, factor: u32) -> PhantomAccumulator {
        assert!(factor >= 1);
        let new_width = (self.width / factor).max(1);
        let new_height = (self.height / factor).max(1);
        let mut out = PhantomAccumulator::new(new_width, new_height);
        for row in 0..new_height {
            for col in 0..new_width {
                let mut vsum = 0.0f32;
                let mut wsum = 0.0f32;
                let mut n = 0u32;
                for dy in 0..factor {
                    for dx in 0..factor {
                        let sx = col * factor + dx;
                        let sy = row * factor + dy;
                        if sx < self.width && sy < self.height {
                            let idx = self.index(sx, sy);
                            vsum += self.value[idx];
                            wsum += self.weight[idx];
                            n += 1;
                        }
                    }
                }
                if n > 0 {
                    let idx = out.index(col, row);
                    out.value[idx] = vsum / n as f32;
                    out.weight[idx] = wsum / n as f32;
                }
            }
        }
        out
    }

    /// Blend this accumulator into a pyramid level's `fg` (and `bg`, if
    /// present) at `(origin_col, origin_row)`, with opacity
    /// `weight / max_weight` (spec §4.C).
    pub fn blend_into(&self, level: &mut PyramidLevel, origin_col: u32, origin_row: i32, max_weight: f32, cam_id: u8) {
        if max_weight <= 0.0 {
            return;
        }
        for row in 0..self.height {
            let dst_row = origin_row + row as i32;
            if dst_row < 0 {
                continue;
            }
            for col in 0..self.width {
                let idx = self.index(col, row);
                let w = self.weight[idx];
                if w <= 0.0 {
                    continue;
                }
                let opacity = (w / max_weight).clamp(0.0, 1.0);
                let dst_col = origin_col + col;
                let mut cell = level.cell(dst_col, dst_row as u32);
                let sample = (self.value[idx] / w).clamp(0.0, 255.0) as u8;
                if cell.fg.is_empty() {
                    cell.fg = PanoramaPixel {
                        color_y: sample,
                        color_v: 128,
                        radius: 0,
                        cam_id,
                        border_flag: false,
                    };
                } else {
                    cell.fg.color_y = blend_u8(cell.fg.color_y, sample, opacity);
                }
                if !cell.bg.is_empty() {
                    cell.bg.color_y = blend_u8(cell.bg.color_y, sample, opacity);
                }
                level.set_cell(dst_col, dst_row as u32, cell);
            }
        }
    }
}

fn blend_u8(base: u8, overlay: u8, opacity: f32) -> u8 {
    let blended = base as f32 * (1.0 - opacity) + overlay as f32 * opacity;
    blended.round().clamp(0.0, 255.0) as u8
}

fn blur_plane(plane: &[f32], width: u32, height: u32) -> Vec<f32> {
    let idx = |x: i64, y: i64| -> usize {
        let x = x.clamp(0, width as i64 - 1) as u32;
        let y = y.clamp(0, height as i64 - 1) as u32;
        (y * width + x) as usize
    };
    let mut horiz = vec![0.0f32; plane.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let v = plane[idx(x - 1, y)] + 2.0 * plane[idx(x, y)] + plane[idx(x + 1, y)];
            horiz[idx(x, y)] = v / 4.0;
        }
    }
    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let v = horiz[idx(x, y - 1)] + 2.0 * horiz[idx(x, y)] + horiz[idx(x, y + 1)];
            out[idx(x, y)] = v / 4.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average_divides_out_weight() {
        let mut acc = PhantomAccumulator::new(4, 4);
        acc.add_weighted(1, 1, 10.0, 2.0);
        acc.add_weighted(1, 1, 20.0, 2.0);
        let idx = acc.index(1, 1);
        assert!((acc.value[idx] / acc.weight[idx] - 15.0).abs() < 1e-6);
    }

    #[test]
    fn downsample_preserves_total_mass_roughly() {
        let mut acc = PhantomAccumulator::new(4, 4);
        for row in 0..4 {
            for col in 0..4 {
                acc.add_pixel(col, row, 10.0);
            }
        }
        let down = acc.downsample(2);
        assert_eq!(down.width, 2);
        assert_eq!(down.height, 2);
        for v in &down.value {
            assert!((*v - 10.0).abs() < 1e-6);
        }
    }
}
