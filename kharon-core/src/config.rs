//! Startup configuration (spec §6 "Filesystem state", expanded per
//! `SPEC_FULL.md` §2): one `toml` document gathering the per-sensor
//! descriptors, attitude quorum, panorama pyramid, router, and driver
//! tunables that the original scattered across `/pinet/dev/<hostname>/...`
//! one-value-per-file directories. Loaded once at startup; any problem
//! here is a configuration error (spec §7.1), fatal before any thread
//! starts.

use crate::error::{ConfigError, Result};
use kharon_types::{Mat3, Priority};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub warm_up_ms: u64,
    /// Path to a nine-whitespace-separated-double `axis_alignment` file
    /// (spec §6); identity if absent.
    pub axis_alignment_path: Option<PathBuf>,
    /// Path to the `drift_dps` persistence file (spec §4.A); absent means
    /// start from zero drift and never persist.
    pub drift_path: Option<PathBuf>,
    /// Modalities this device is configured to contribute: any of
    /// `"gyro"`, `"accel"`, `"mag"`, `"temp"`.
    #[serde(default = "default_modalities")]
    pub modalities: Vec<String>,
}

fn default_priority() -> Priority {
    Priority::P1
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_modalities() -> Vec<String> {
    vec!["gyro".into(), "accel".into(), "mag".into()]
}

impl SensorConfig {
    pub fn load_axis_alignment(&self) -> Result<Mat3> {
        let Some(path) = &self.axis_alignment_path else {
            return Ok(Mat3::IDENTITY);
        };
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.clone(), source: e })?;
        Mat3::from_whitespace_separated(&text)
            .ok_or_else(|| ConfigError::Invalid(format!("{}: expected 9 whitespace-separated doubles", path.display())))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuorumConfigToml {
    pub num_p1_gyro: usize,
    pub num_p1_accel: usize,
    pub num_p1_mag: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttitudeConfig {
    #[serde(default = "default_staleness_usec")]
    pub staleness_usec: u64,
    #[serde(default = "default_blend_tau_sec")]
    pub blend_tau_sec: f64,
    #[serde(default = "default_residual_tau_sec")]
    pub residual_tau_sec: f64,
    #[serde(default = "default_alignment_tau_sec")]
    pub alignment_tau_sec: f64,
    #[serde(default = "default_alignment_threshold_dps")]
    pub alignment_threshold_dps: f64,
    pub quorum: QuorumConfigToml,
}

fn default_staleness_usec() -> u64 {
    kharon_attitude::DEFAULT_STALENESS_USEC
}
fn default_blend_tau_sec() -> f64 {
    kharon_attitude::DEFAULT_BLEND_TAU_SEC
}
fn default_residual_tau_sec() -> f64 {
    kharon_attitude::DEFAULT_RESIDUAL_TAU_SEC
}
fn default_alignment_tau_sec() -> f64 {
    kharon_attitude::DEFAULT_ALIGNMENT_TAU_SEC
}
fn default_alignment_threshold_dps() -> f64 {
    2.0
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PyramidLevelConfigToml {
    pub pixels_per_degree: u32,
    pub height_deg: f64,
}

/// A fixed camera mount: its world bearing offset from the vessel's bow,
/// used together with the current attitude heading to orient each
/// incoming frame (spec §4.C "already tagged with the camera's
/// orientation in world coordinates").
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CameraMountConfig {
    pub cam_id: u8,
    pub bearing_deg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanoramaConfig {
    pub levels: Vec<PyramidLevelConfigToml>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Local address the camera handshake listener binds; absent or `-x`
    /// disables network camera ingestion entirely (spec §6 "Handshake").
    pub listen_addr: Option<String>,
    #[serde(default)]
    pub mounts: Vec<CameraMountConfig>,
}

fn default_history_capacity() -> usize {
    kharon_panorama::MAX_FRAME_HEAP_ALLOC
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfigToml {
    pub absolute_min_m: f64,
    pub min_traversable_m: f64,
    pub preferred_min_m: f64,
    #[serde(default = "default_map_dim")]
    pub map_dim: usize,
    #[serde(default = "default_spacing_m")]
    pub spacing_m: f64,
    #[serde(default = "default_destination_radius_m")]
    pub destination_radius_m: f64,
}

fn default_map_dim() -> usize {
    21
}
fn default_spacing_m() -> f64 {
    50.0
}
fn default_destination_radius_m() -> f64 {
    30.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfigToml {
    #[serde(default = "default_otto_err_timeout_sec")]
    pub otto_err_timeout_sec: f64,
    #[serde(default = "default_vessel_motion_pix")]
    pub vessel_motion_pix_for_map_rebuild: i64,
    #[serde(default = "default_pix_dist_avoid")]
    pub pix_dist_avoid_map_rebuild: i64,
    /// Serial device for the tiller MCU, e.g. `/dev/ttyUSB0`. Absent runs
    /// against an in-process loopback stand-in (demo/no-hardware mode).
    pub tiller_port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub tiller_baud_rate: u32,
    /// Serial device delivering the 256-byte GPS packets of spec §6.
    /// Absent runs against a simulated fix.
    pub gps_port: Option<String>,
}

fn default_otto_err_timeout_sec() -> f64 {
    kharon_driver::OTTO_ERR_TIMEOUT_SEC
}
fn default_vessel_motion_pix() -> i64 {
    kharon_driver::VESSEL_MOTION_PIX_FOR_MAP_REBUILD
}
fn default_pix_dist_avoid() -> i64 {
    kharon_driver::PIX_DIST_AVOID_MAP_REBUILD
}
fn default_baud_rate() -> u32 {
    4800
}

#[derive(Debug, Clone, Deserialize)]
pub struct VesselConfig {
    #[serde(default)]
    pub initial_course_deg: f64,
    #[serde(default = "default_cruise_speed_kts")]
    pub default_cruise_speed_kts: f64,
}

fn default_cruise_speed_kts() -> f64 {
    6.0
}

impl Default for VesselConfig {
    fn default() -> Self {
        VesselConfig { initial_course_deg: 0.0, default_cruise_speed_kts: default_cruise_speed_kts() }
    }
}

/// Pre-converted depth grid (spec §6 "Map binary": `21600x21600 int16
/// depth grid per world-octant, little-endian"). GEBCO ASCII conversion
/// stays out of scope; this only names where to find the already-built
/// binary.
#[derive(Debug, Clone, Deserialize)]
pub struct TerrainConfig {
    pub map_path: Option<PathBuf>,
    #[serde(default = "default_octant_dim")]
    pub octant_dim: usize,
}

fn default_octant_dim() -> usize {
    21_600
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig { map_path: None, octant_dim: default_octant_dim() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vessel: VesselConfig,
    pub sensors: Vec<SensorConfig>,
    pub attitude: AttitudeConfig,
    pub panorama: PanoramaConfig,
    pub router: RouterConfigToml,
    pub driver: DriverConfigToml,
    #[serde(default)]
    pub terrain: TerrainConfig,
}

/// Load and validate the config file. A missing file or malformed TOML is
/// a configuration error (spec §7.1): reported and fatal before any
/// pipeline thread starts.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::Toml { path: path.to_path_buf(), source: e })?;
    if config.sensors.is_empty() {
        return Err(ConfigError::Invalid("at least one [[sensors]] entry is required".into()));
    }
    if config.panorama.levels.is_empty() {
        return Err(ConfigError::Invalid("panorama.levels must not be empty".into()));
    }
    Ok(config)
}

/// Conventional config path, the Rust-native stand-in for the original's
/// `/pinet/dev/<hostname>/sensors/i2c/<name>/...` per-value directory
/// tree: one merged TOML document per host rather than one file per
/// scalar. Overridable with `KHARON_CONFIG` for testing and deployment
/// flexibility, since hostname-keyed filesystem discovery has no
/// equivalent in the documented `-f/-t/-x/-l/-h` CLI surface (spec §6).
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("KHARON_CONFIG") {
        return PathBuf::from(p);
    }
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    PathBuf::from(format!("/pinet/dev/{hostname}/kharon.toml"))
}
