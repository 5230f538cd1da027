//! Thread wiring (spec §5): spins up one thread per pipeline stage and
//! connects them the way the original's five processes were connected by
//! shared memory and sockets -- here, by channels and small shared mailboxes
//! -- then blocks until [`ShutdownFlag`] fires.

use crate::camera_net::{self, CapturedFrame, SharedHeading};
use crate::config::Config;
use crate::run_state::ShutdownFlag;
use crate::sim::{
    FlatSeaGrid, GpsSource, LoopbackTiller, SerialGps, SimulatedGps, SimulatedImu,
};
use crate::terrain_map::BinMapGrid;
use kharon_aggregator::{Aggregator, RunState, SensorDescriptor};
use kharon_attitude::{
    AttitudeCore, AttitudeSample, ComplementaryFilter, QuorumConfig, ResampledVectorStream,
    SimpleVectorStream, TICK_USEC,
};
use kharon_driver::{
    Driver, DriverConfig, Exchange, HeadingPacket, OttoReplyTracker, OutgoingHeading,
    PacketAssembler, TillerPort,
};
use kharon_panorama::{OrientedFrame, PanoramaStitcher, PyramidLevelConfig};
use kharon_router::{RouterConfig, TerrainGrid, TerrainThresholds};
use kharon_types::{AvailFlags, Bam8, MasterClock, Priority, Timestamp, Vec3};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Parse a sensor's configured modality names into the flag set the
/// aggregator uses (spec §6 sensor config, `modalities`).
fn modality_flags(names: &[String]) -> AvailFlags {
    let mut flags = AvailFlags::empty();
    for name in names {
        match name.as_str() {
            "gyro" => flags |= AvailFlags::GYRO,
            "accel" => flags |= AvailFlags::ACCEL,
            "mag" => flags |= AvailFlags::MAG,
            "temp" => flags |= AvailFlags::TEMP,
            other => tracing::warn!(modality = other, "unrecognized sensor modality, ignoring"),
        }
    }
    flags
}

/// Latest values other threads snapshot rather than block on, the same
/// "shared slot, no blocking" discipline [`kharon_driver::comm`] uses for
/// the outgoing heading mailbox (spec §9).
#[derive(Clone)]
struct LatestAttitude(Arc<Mutex<Option<AttitudeSample>>>);

impl LatestAttitude {
    fn new() -> Self {
        LatestAttitude(Arc::new(Mutex::new(None)))
    }
    fn set(&self, sample: AttitudeSample) {
        *self.0.lock() = Some(sample);
    }
    fn get(&self) -> Option<AttitudeSample> {
        *self.0.lock()
    }
}

#[derive(Clone)]
struct LatestFix(Arc<Mutex<Option<kharon_driver::GpsFix>>>);

impl LatestFix {
    fn new() -> Self {
        LatestFix(Arc::new(Mutex::new(None)))
    }
    fn set(&self, fix: kharon_driver::GpsFix) {
        *self.0.lock() = Some(fix);
    }
    fn get(&self) -> Option<kharon_driver::GpsFix> {
        *self.0.lock()
    }
}

/// One board's fused sample plus which board produced it, posted from a
/// sensor-board thread to the attitude thread (spec §4.A/§4.B boundary).
struct BoardSample {
    board: usize,
    sample: kharon_types::SensorSample,
}

fn spawn_sensor_board(
    board: usize,
    sensor_cfg: &crate::config::SensorConfig,
    clock: Arc<MasterClock>,
    shutdown: ShutdownFlag,
    tx: crossbeam_channel::Sender<BoardSample>,
) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let axis_alignment = sensor_cfg.load_axis_alignment()?;
    let modalities = modality_flags(&sensor_cfg.modalities);
    let seed = 0x9E37_79B9 ^ (board as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    let device = Box::new(SimulatedImu::new(sensor_cfg.name.clone(), 0.0, seed));
    let descriptor = SensorDescriptor::new(
        device,
        sensor_cfg.priority,
        Duration::from_millis(sensor_cfg.poll_interval_ms),
        Duration::from_millis(sensor_cfg.warm_up_ms),
        axis_alignment,
        kharon_aggregator::DriftEstimator::new(Vec3::ZERO),
        modalities,
    );
    let mut aggregator = Aggregator::new(vec![descriptor], clock)?;
    aggregator.setup_all()?;
    let name = sensor_cfg.name.clone();

    Ok(std::thread::spawn(move || {
        let run_state = RunState::new();
        while !shutdown.is_done() && !run_state.is_done() {
            if let Some(sample) = aggregator.run_once(&run_state) {
                if tx.send(BoardSample { board, sample }).is_err() {
                    break;
                }
            }
        }
        aggregator.shutdown();
        tracing::info!(board = %name, "sensor board thread exiting");
    }))
}

#[allow(clippy::too_many_arguments)]
fn spawn_attitude_thread(
    config: &Config,
    num_boards: usize,
    rx: crossbeam_channel::Receiver<BoardSample>,
    heading_out: SharedHeading,
    latest: LatestAttitude,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    let attitude_cfg = config.attitude.clone();
    std::thread::spawn(move || {
        let gyro = (0..num_boards).map(|_| ResampledVectorStream::new(Priority::P1, TICK_USEC)).collect();
        let accel = (0..num_boards).map(|_| SimpleVectorStream::new(Priority::P1)).collect();
        let mag = (0..num_boards).map(|_| SimpleVectorStream::new(Priority::P1)).collect();
        let mut core = AttitudeCore::new(
            gyro,
            accel,
            mag,
            QuorumConfig {
                num_p1_gyro: attitude_cfg.quorum.num_p1_gyro,
                num_p1_accel: attitude_cfg.quorum.num_p1_accel,
                num_p1_mag: attitude_cfg.quorum.num_p1_mag,
            },
            attitude_cfg.staleness_usec,
            ComplementaryFilter::new(attitude_cfg.blend_tau_sec, attitude_cfg.residual_tau_sec),
            attitude_cfg.alignment_tau_sec,
            attitude_cfg.alignment_threshold_dps,
        );

        while !shutdown.is_done() {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(board_sample) => {
                    let s = board_sample.sample;
                    let i = board_sample.board;
                    if s.avail.contains(AvailFlags::GYRO) {
                        core.ingest_gyro(i, s.timestamp, s.gyro_dps);
                    }
                    if s.avail.contains(AvailFlags::ACCEL) {
                        core.ingest_accel(i, s.timestamp, s.accel_g);
                    }
                    if s.avail.contains(AvailFlags::MAG) {
                        core.ingest_mag(i, s.timestamp, s.mag);
                    }
                    while let Some(published) = core.try_publish() {
                        heading_out.set_degrees(published.estimate.heading.to_degrees());
                        latest.set(published);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("attitude thread exiting");
    })
}

fn spawn_gps_thread(config: &Config, latest: LatestFix, shutdown: ShutdownFlag) -> std::thread::JoinHandle<()> {
    let gps_port = config.driver.gps_port.clone();
    let vessel = config.vessel.clone();
    std::thread::spawn(move || {
        let mut source: Box<dyn GpsSource> = match &gps_port {
            Some(path) => match std::fs::File::open(path) {
                Ok(f) => Box::new(SerialGps::new(f)),
                Err(e) => {
                    tracing::error!(%path, "failed to open GPS port, falling back to simulated fix: {e}");
                    Box::new(SimulatedGps::new(0.0, 0.0, vessel.default_cruise_speed_kts, vessel.initial_course_deg))
                }
            },
            None => Box::new(SimulatedGps::new(0.0, 0.0, vessel.default_cruise_speed_kts, vessel.initial_course_deg)),
        };
        while !shutdown.is_done() {
            if let Some(fix) = source.poll() {
                latest.set(fix);
            }
            if shutdown.sleep(Duration::from_millis(500)) {
                break;
            }
        }
        tracing::info!("gps thread exiting");
    })
}

fn spawn_panorama_thread(
    config: &Config,
    rx: crossbeam_channel::Receiver<CapturedFrame>,
    clock: Arc<MasterClock>,
    shutdown: ShutdownFlag,
) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let level_configs: Vec<PyramidLevelConfig> = config
        .panorama
        .levels
        .iter()
        .map(|l| PyramidLevelConfig { pixels_per_degree: l.pixels_per_degree, height_deg: l.height_deg })
        .collect();
    let history_capacity = config.panorama.history_capacity;
    let mut stitcher = PanoramaStitcher::new(level_configs, history_capacity)?;
    Ok(std::thread::spawn(move || {
        let mut last_finalize = clock.now();
        while !shutdown.is_done() {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(frame) => {
                    let oriented = OrientedFrame {
                        cam_id: frame.cam_id,
                        timestamp: frame.timestamp,
                        world_center_lon: frame.world_center_lon,
                        world_center_row: frame.world_center_row,
                        width: frame.width,
                        height: frame.height,
                        pixels: &frame.pixels,
                    };
                    stitcher.ingest_frame(&oriented);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
            let now = clock.now();
            if now.delta_seconds(last_finalize) >= 1.0 {
                stitcher.finalize_tick(now);
                last_finalize = now;
            }
        }
        tracing::info!("panorama thread exiting");
    }))
}

fn spawn_comm_thread(
    tiller_port: Option<String>,
    baud_rate: u32,
    outgoing: OutgoingHeading,
    reply_tracker: OttoReplyTracker,
    clock: Arc<MasterClock>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut port: Box<dyn TillerPort> = match &tiller_port {
            Some(path) => match serialport::new(path, baud_rate).timeout(Duration::from_millis(50)).open() {
                Ok(p) => Box::new(p),
                Err(e) => {
                    tracing::error!(%path, "failed to open tiller port, running with loopback: {e}");
                    Box::new(LoopbackTiller)
                }
            },
            None => Box::new(LoopbackTiller),
        };
        let mut assembler = PacketAssembler::new(8);
        while !shutdown.is_done() {
            if let Err(e) = kharon_driver::poll_once(&mut *port, &mut assembler, &outgoing, &reply_tracker, &clock) {
                tracing::warn!("tiller comm error: {e}");
            }
            if shutdown.sleep(kharon_driver::COMM_POLL_INTERVAL) {
                break;
            }
        }
        tracing::info!("comm thread exiting");
    })
}

/// Spin up every pipeline-stage thread and block until `shutdown` fires.
/// `inhibit_network` mirrors the `-x` CLI flag (spec §6): it disables the
/// camera listener entirely, leaving the panorama stage idle.
pub fn run(config: Config, clock: Arc<MasterClock>, shutdown: ShutdownFlag, inhibit_network: bool) -> anyhow::Result<()> {
    let (board_tx, board_rx) = crossbeam_channel::unbounded::<BoardSample>();
    let mut board_handles = Vec::new();
    for (i, sensor_cfg) in config.sensors.iter().enumerate() {
        board_handles.push(spawn_sensor_board(i, sensor_cfg, clock.clone(), shutdown.clone(), board_tx.clone())?);
    }
    drop(board_tx);

    let heading = SharedHeading::new();
    let latest_attitude = LatestAttitude::new();
    let attitude_handle = spawn_attitude_thread(
        &config,
        config.sensors.len(),
        board_rx,
        heading.clone(),
        latest_attitude.clone(),
        shutdown.clone(),
    );

    let latest_fix = LatestFix::new();
    let gps_handle = spawn_gps_thread(&config, latest_fix.clone(), shutdown.clone());

    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<CapturedFrame>();
    let panorama_handle = spawn_panorama_thread(&config, frame_rx, clock.clone(), shutdown.clone())?;

    let camera_handle = match (&config.panorama.listen_addr, inhibit_network) {
        (Some(addr), false) => {
            let addr = addr.clone();
            let mounts = config.panorama.mounts.clone();
            let heading = heading.clone();
            let clock = clock.clone();
            let shutdown = shutdown.clone();
            Some(std::thread::spawn(move || {
                if let Err(e) = camera_net::run(&addr, &mounts, heading, clock, frame_tx, shutdown) {
                    tracing::error!("camera listener exited: {e}");
                }
            }))
        }
        _ => {
            tracing::info!("camera network ingestion disabled (no listen_addr, or -x)");
            None
        }
    };

    let exchange = Exchange::new(|| {});
    let outgoing = OutgoingHeading::new();
    let reply_tracker = OttoReplyTracker::new();
    let comm_handle = spawn_comm_thread(
        config.driver.tiller_port.clone(),
        config.driver.tiller_baud_rate,
        outgoing.clone(),
        reply_tracker.clone(),
        clock.clone(),
        shutdown.clone(),
    );

    let terrain_grid: Box<dyn TerrainGrid + Send> = match &config.terrain.map_path {
        Some(dir) if crate::terrain_map::octant_path_exists(dir) => {
            Box::new(BinMapGrid::open(dir.clone(), config.terrain.octant_dim))
        }
        _ => Box::new(FlatSeaGrid::default()),
    };

    let driver_config = DriverConfig {
        router: RouterConfig {
            thresholds: TerrainThresholds {
                absolute_min_m: config.router.absolute_min_m,
                min_traversable_m: config.router.min_traversable_m,
                preferred_min_m: config.router.preferred_min_m,
            },
            map_dim: config.router.map_dim,
            spacing_m: config.router.spacing_m,
            destination_radius_m: config.router.destination_radius_m,
        },
        vessel_motion_pix_for_map_rebuild: config.driver.vessel_motion_pix_for_map_rebuild,
        pix_dist_avoid_map_rebuild: config.driver.pix_dist_avoid_map_rebuild,
        otto_err_timeout_sec: config.driver.otto_err_timeout_sec,
    };
    let mut driver = Driver::new(
        driver_config,
        exchange.clone(),
        Bam8::from_degrees(config.vessel.initial_course_deg),
        config.vessel.default_cruise_speed_kts * 0.514444,
        clock.now(),
    );
    let default_cruise_mps = config.vessel.default_cruise_speed_kts * 0.514444;

    let decision_handle = {
        let shutdown = shutdown.clone();
        let clock = clock.clone();
        std::thread::spawn(move || {
            while !shutdown.is_done() {
                let now = clock.now();
                let fix = latest_fix.get();
                let attitude = latest_attitude.get();

                let (position, vessel_pix) = match fix {
                    Some(f) => {
                        let (wx, wy) = BinMapGrid::lon_lat_to_world(f.lon_deg, f.lat_deg);
                        (Some((wx as f64, wy as f64)), Some((wx, wy)))
                    }
                    None => (None, None),
                };
                let measured_course = attitude
                    .map(|a| Bam8::from_degrees(a.estimate.heading.to_degrees()))
                    .unwrap_or(Bam8::from_raw(0));
                let speed_mps = fix.map(|f| f.speed_kts * 0.514444).unwrap_or(default_cruise_mps);
                let last_otto_reply = reply_tracker.last();

                match driver.run_once(
                    now,
                    vessel_pix,
                    Some(terrain_grid.as_ref()),
                    position,
                    None,
                    measured_course,
                    speed_mps,
                    None,
                    last_otto_reply,
                ) {
                    Ok(out) => {
                        if let Some(heading_degs) = out.commanded_heading_degs {
                            outgoing.post(HeadingPacket {
                                heading_degs: heading_degs as u16,
                                course_degs: heading_degs as u16,
                                turn_rate_dps: attitude.map(|a| a.estimate.turn_rate_dps as f32).unwrap_or(0.0),
                            });
                        }
                    }
                    Err(e) => tracing::warn!("router/driver tick failed: {e}"),
                }

                if shutdown.sleep(Duration::from_millis(100)) {
                    break;
                }
            }
            tracing::info!("decision thread exiting");
        })
    };

    decision_handle.join().ok();
    comm_handle.join().ok();
    panorama_handle.join().ok();
    gps_handle.join().ok();
    attitude_handle.join().ok();
    for h in board_handles {
        h.join().ok();
    }
    if let Some(h) = camera_handle {
        h.join().ok();
    }
    Ok(())
}
