//! Frame Sync + Panorama (spec §4.C): stitches per-camera perspective
//! frames, already tagged with their world orientation, into a cylindrical
//! pyramid of the full 360 degree world, and maintains a bounded,
//! logarithmically compacted frame history.

mod accumulator;
mod error;
mod frame_slab;
mod pyramid;
mod wire;

pub use accumulator::PhantomAccumulator;
pub use error::{PanoramaError, Result};
pub use frame_slab::FrameSlab;
pub use pyramid::{
    CoverageBitmap, PanoramaPixel, PixelSlot, PyramidLevel, COVERAGE_MARGIN_DEG, EMPTY_RADIUS,
};
pub use wire::{
    accept_handshake, read_handshake_reply, send_handshake, ImageHeader, ImagePacket,
    HANDSHAKE_OK, VY_PACKET_TYPE, VY_STREAM_ID,
};

use kharon_types::{Bam16, Timestamp};
use std::sync::Arc;

/// Configuration for one pyramid level: resolution and vertical extent.
#[derive(Debug, Clone, Copy)]
pub struct PyramidLevelConfig {
    pub pixels_per_degree: u32,
    pub height_deg: f64,
}

/// A single stitched world frame, snapshotting every pyramid level plus
/// the coverage bitmap at the moment it was finalized. This is the payload
/// stored in the frame history (spec §3 "frame page").
pub struct PanoramaSnapshot {
    pub levels: Vec<PyramidLevel>,
    pub coverage: CoverageBitmap,
}

/// A decoded source pixel ready for projection: luma/chroma plus its
/// position within the source frame.
pub struct SourcePixel {
    pub x: u32,
    pub y: u32,
    pub color_y: u8,
    pub color_v: u8,
}

/// One incoming camera frame, already oriented in world coordinates by the
/// Attitude Core (spec §4.C responsibility boundary).
pub struct OrientedFrame<'a> {
    pub cam_id: u8,
    pub timestamp: Timestamp,
    pub world_center_lon: Bam16,
    pub world_center_row: i32,
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [SourcePixel],
}

/// Default capacity of the frame history slab (spec §4.C
/// `MAX_FRAME_HEAP_ALLOC`).
pub const MAX_FRAME_HEAP_ALLOC: usize = 48;

/// Stitches incoming oriented camera frames into a cylindrical world
/// pyramid and publishes a bounded, logarithmically compacted history of
/// finalized snapshots.
pub struct PanoramaStitcher {
    level_configs: Vec<PyramidLevelConfig>,
    working: Vec<PyramidLevel>,
    coverage: CoverageBitmap,
    history: FrameSlab<Arc<PanoramaSnapshot>>,
}

impl PanoramaStitcher {
    pub fn new(level_configs: Vec<PyramidLevelConfig>, history_capacity: usize) -> Result<Self> {
        if level_configs.is_empty() {
            return Err(PanoramaError::Configuration(
                "at least one pyramid level is required".into(),
            ));
        }
        let working = level_configs
            .iter()
            .map(|c| PyramidLevel::new(c.pixels_per_degree, c.height_deg))
            .collect();
        Ok(PanoramaStitcher {
            level_configs,
            working,
            coverage: CoverageBitmap::new(),
            history: FrameSlab::new(history_capacity),
        })
    }

    /// Project one camera frame into every pyramid level and mark its
    /// angular span covered (spec §4.C "Projection").
    pub fn ingest_frame(&mut self, frame: &OrientedFrame<'_>) {
        let lon_min = frame.world_center_lon.to_degrees() - (frame.width as f64 / 2.0) / self.level_configs[0].pixels_per_degree as f64;
        let lon_max = frame.world_center_lon.to_degrees() + (frame.width as f64 / 2.0) / self.level_configs[0].pixels_per_degree as f64;
        self.coverage.mark_span(lon_min, lon_max);

        for level in &mut self.working {
            level.project_frame(
                frame.world_center_lon,
                frame.world_center_row,
                frame.width,
                frame.height,
                frame.cam_id,
                |sx, sy| {
                    frame
                        .pixels
                        .iter()
                        .find(|p| p.x == sx && p.y == sy)
                        .map(|p| (p.color_y, p.color_v))
                },
            );
        }
    }

    /// Finalize the current working buffer into a new frame-history entry
    /// and reset for the next tick.
    pub fn finalize_tick(&mut self, timestamp: Timestamp) {
        let levels = std::mem::replace(
            &mut self.working,
            self.level_configs
                .iter()
                .map(|c| PyramidLevel::new(c.pixels_per_degree, c.height_deg))
                .collect(),
        );
        let coverage = std::mem::take(&mut self.coverage);
        self.history.push(
            timestamp,
            Arc::new(PanoramaSnapshot { levels, coverage }),
        );
    }

    /// Current (newest-first) frame history, for consumers above this
    /// layer (spec `get_frame_list`).
    pub fn frame_list(&self) -> Vec<(Timestamp, Arc<PanoramaSnapshot>)> {
        self.history
            .frames()
            .into_iter()
            .map(|(t, s)| (t, Arc::clone(s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_then_finalize_produces_history_entry() {
        let mut stitcher = PanoramaStitcher::new(
            vec![PyramidLevelConfig { pixels_per_degree: 2, height_deg: 20.0 }],
            MAX_FRAME_HEAP_ALLOC,
        )
        .unwrap();
        let pixels = vec![
            SourcePixel { x: 0, y: 0, color_y: 100, color_v: 128 },
            SourcePixel { x: 1, y: 0, color_y: 120, color_v: 128 },
        ];
        let frame = OrientedFrame {
            cam_id: 0,
            timestamp: Timestamp::from_usec(0),
            world_center_lon: Bam16::from_degrees(90.0),
            world_center_row: 20,
            width: 2,
            height: 1,
            pixels: &pixels,
        };
        stitcher.ingest_frame(&frame);
        stitcher.finalize_tick(Timestamp::from_usec(0));
        let history = stitcher.frame_list();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].1.levels.len(), 1);
    }
}
