//! Stand-in data sources used when no real hardware is configured.
//!
//! None of these claim to be the original's phantom-target simulator
//! (that is [`kharon_panorama::PhantomAccumulator`]'s domain, untouched
//! here) or a real device driver for the I2C IMUs, cameras, or GEBCO map
//! conversion the spec places out of scope. They exist only so the
//! supervisor binary is concretely runnable end to end without physical
//! sensors attached, the same role `ci2-simple-demo`'s synthetic frame
//! source plays for the camera stack in the teacher pack.

use kharon_aggregator::{AggregatorError, Result as AggResult, SensorDevice};
use kharon_driver::GpsFix;
use kharon_router::TerrainGrid;
use kharon_types::{AvailFlags, SensorSample, Timestamp, Vec3};
use std::f64::consts::PI;
use std::time::Instant;

/// A synthetic IMU board: a slow constant yaw rate plus small per-board
/// jitter (keyed by `seed`) so that multiple simulated boards disagree
/// just enough to exercise confidence-weighted fusion, without ever
/// failing on their own (use `fail_after` to exercise the failure path
/// instead).
pub struct SimulatedImu {
    name: String,
    start: Instant,
    yaw_rate_dps: f64,
    jitter_dps: f64,
    seed: u64,
    last: SensorSample,
    fail_after: Option<u32>,
    ticks: u32,
}

impl SimulatedImu {
    pub fn new(name: impl Into<String>, yaw_rate_dps: f64, seed: u64) -> Self {
        SimulatedImu {
            name: name.into(),
            start: Instant::now(),
            yaw_rate_dps,
            jitter_dps: 0.05,
            seed,
            last: SensorSample::empty(Timestamp::ZERO),
            fail_after: None,
            ticks: 0,
        }
    }
}

fn pseudo_noise(seed: u64, tick: u32) -> f64 {
    let x = (seed.wrapping_add(tick as u64)).wrapping_mul(2_654_435_761);
    ((x >> 16) & 0xFFFF) as f64 / 65_535.0 - 0.5
}

impl SensorDevice for SimulatedImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self) -> AggResult<()> {
        Ok(())
    }

    fn update(&mut self) -> AggResult<AvailFlags> {
        self.ticks += 1;
        if let Some(n) = self.fail_after {
            if self.ticks > n {
                return Err(AggregatorError::Io {
                    device: self.name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "simulated dropout"),
                });
            }
        }
        let noise = pseudo_noise(self.seed, self.ticks) * self.jitter_dps;
        let elapsed = self.start.elapsed().as_secs_f64();
        self.last = SensorSample {
            timestamp: Timestamp::from_seconds(elapsed),
            gyro_dps: Vec3::new(0.0, 0.0, self.yaw_rate_dps + noise),
            accel_g: Vec3::new(0.0, 0.0, 1.0),
            mag: Vec3::new((elapsed * 0.01).cos(), (elapsed * 0.01).sin(), 0.0),
            temp_c: 22.0,
            avail: AvailFlags::GYRO | AvailFlags::ACCEL | AvailFlags::MAG,
        };
        Ok(self.last.avail)
    }

    fn last_sample(&self) -> SensorSample {
        self.last
    }

    fn shutdown(&mut self) {}
}

/// A level, obstruction-free sea floor everywhere: the demo terrain
/// source used when no real `map_path` is configured (spec §6 "Map
/// binary" is explicitly a separate, optional input; see
/// [`crate::terrain_map::BinMapGrid`] for the real loader).
pub struct FlatSeaGrid {
    pub depth_m: f64,
}

impl Default for FlatSeaGrid {
    fn default() -> Self {
        FlatSeaGrid { depth_m: 50.0 }
    }
}

impl TerrainGrid for FlatSeaGrid {
    fn depth_m_at(&self, _world_x: i64, _world_y: i64) -> f64 {
        self.depth_m
    }
    fn world_index(&self, world_x: i64, world_y: i64) -> u32 {
        (world_x.rem_euclid(1 << 16) as u32) * (1 << 16) + (world_y.rem_euclid(1 << 16) as u32)
    }
    fn has_land_neighbor_8(&self, _world_x: i64, _world_y: i64) -> bool {
        false
    }
    fn has_land_neighbor_16(&self, _world_x: i64, _world_y: i64) -> bool {
        false
    }
}

/// A source of GPS fixes, abstracting over the real 256-byte serial
/// stream (spec §6) and a simulated one used when no `gps_port` is
/// configured.
pub trait GpsSource: Send {
    fn poll(&mut self) -> Option<GpsFix>;
}

/// A vessel holding a constant course and speed from a fixed origin,
/// advancing with wall-clock time.
pub struct SimulatedGps {
    start: Instant,
    origin_lat: f64,
    origin_lon: f64,
    speed_kts: f64,
    track_deg: f64,
}

impl SimulatedGps {
    pub fn new(origin_lat: f64, origin_lon: f64, speed_kts: f64, track_deg: f64) -> Self {
        SimulatedGps { start: Instant::now(), origin_lat, origin_lon, speed_kts, track_deg }
    }
}

impl GpsSource for SimulatedGps {
    fn poll(&mut self) -> Option<GpsFix> {
        const KTS_TO_DEG_LAT_PER_SEC: f64 = 1.0 / 3600.0 / 60.0;
        let elapsed = self.start.elapsed().as_secs_f64();
        let dist_deg = self.speed_kts * elapsed * KTS_TO_DEG_LAT_PER_SEC;
        let heading_rad = self.track_deg.to_radians();
        let lat = self.origin_lat + dist_deg * heading_rad.cos();
        let lon = self.origin_lon + dist_deg * heading_rad.sin() / self.origin_lat.to_radians().cos().max(1e-6);
        Some(GpsFix {
            lat_deg: lat,
            lon_deg: lon,
            speed_kts: self.speed_kts,
            track_deg: self.track_deg,
            zulu_time_sec: elapsed % 86_400.0,
            zulu_date: 10_126,
        })
    }
}

/// Reads fixes from a live 256-byte-per-packet serial stream (spec §6
/// "GPS packet").
pub struct SerialGps<R> {
    port: R,
}

impl<R: std::io::Read> SerialGps<R> {
    pub fn new(port: R) -> Self {
        SerialGps { port }
    }
}

impl<R: std::io::Read + Send> GpsSource for SerialGps<R> {
    fn poll(&mut self) -> Option<GpsFix> {
        let mut buf = [0u8; kharon_driver::GPS_PACKET_LEN];
        match self.port.read_exact(&mut buf) {
            Ok(()) => match kharon_driver::parse_gps_packet(&buf) {
                Ok(fix) => Some(fix),
                Err(e) => {
                    tracing::warn!("malformed GPS packet: {e}");
                    None
                }
            },
            Err(e) => {
                tracing::warn!("GPS read failed: {e}");
                None
            }
        }
    }
}

/// A single synthetic source pixel value, used to paint a uniform test
/// card into each simulated camera frame.
pub fn synthetic_pixels(width: u32, height: u32) -> Vec<kharon_panorama::SourcePixel> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push(kharon_panorama::SourcePixel { x, y, color_y: 128, color_v: 128 });
        }
    }
    pixels
}

pub fn angle_to_radial_bam8(deg: f64) -> kharon_types::Bam8 {
    kharon_types::Bam8::from_degrees(deg.rem_euclid(360.0))
}

/// Radial rate-of-turn helper kept alongside the other simulation math
/// purely for readability at call sites; not otherwise load-bearing.
pub const TWO_PI: f64 = 2.0 * PI;

/// A tiller port that accepts framed heading packets and never replies,
/// used when no `tiller_port` is configured. Honest about what it is not:
/// the comm thread still raises `AUTOPILOT_ERROR` after
/// [`kharon_driver::OTTO_ERR_TIMEOUT_SEC`] since no real autopilot is
/// acknowledging anything, same as running with the tiller physically
/// unplugged.
pub struct LoopbackTiller;

impl std::io::Read for LoopbackTiller {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }
}

impl std::io::Write for LoopbackTiller {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
