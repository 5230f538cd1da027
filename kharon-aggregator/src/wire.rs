//! Sensor network packet (spec §6): the wire format an aggregator process
//! uses to report a fused (or per-device) sample to a consumer across a
//! process boundary. The in-process supervisor wiring (`kharon-core`)
//! passes [`kharon_types::SensorSample`] directly between threads and has
//! no need for this framing, but an external aggregator process (a
//! satellite IMU box, a simulator) still speaks this wire format, so it
//! is implemented here rather than left unspecified.
//!
//! Layout: a fixed header followed by the IMU payload, all multi-byte
//! integers little-endian and floats IEEE-754, matching §6.

use crate::error::{AggregatorError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use kharon_types::{AvailFlags, SensorSample, Timestamp, Vec3};
use std::io::{Cursor, Read, Write};

/// Packet type tag for an IMU sensor packet on the wire.
pub const PACKET_TYPE_IMU: u16 = 1;

/// Up to this many bytes of free-form log text may trail the fixed
/// payload (spec §6).
pub const MAX_LOG_TEXT_BYTES: usize = 64;

/// Header common to every sensor network packet (spec §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    pub packet_type: u16,
    /// Wall-clock send time, seconds.
    pub t_send: f64,
    /// Sample acquisition time, seconds.
    pub t_sample: f64,
    pub custom_16: [u16; 2],
}

/// One fused or per-device IMU sample as it travels from an aggregator
/// process to the attitude core (spec §3 "per-sensor sample", §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPacket {
    pub header: PacketHeader,
    pub gyro_dps: Vec3,
    pub accel_g: Vec3,
    pub mag: Vec3,
    pub temp_c: f64,
    pub baro: f64,
    pub latlon: Vec3,
    pub avail: AvailFlags,
    pub log_text: String,
}

fn write_vec3(w: &mut impl Write, v: &Vec3) -> std::io::Result<()> {
    w.write_f64::<LittleEndian>(v.x())?;
    w.write_f64::<LittleEndian>(v.y())?;
    w.write_f64::<LittleEndian>(v.z())
}

fn read_vec3(r: &mut impl Read) -> std::io::Result<Vec3> {
    let x = r.read_f64::<LittleEndian>()?;
    let y = r.read_f64::<LittleEndian>()?;
    let z = r.read_f64::<LittleEndian>()?;
    Ok(Vec3::new(x, y, z))
}

impl SensorPacket {
    /// Build a sensor packet from a fused sample, tagging it with the
    /// send/sample times a live aggregator process would attach.
    pub fn from_sample(sample: &SensorSample, clock_now_sec: f64, custom_16: [u16; 2]) -> Self {
        SensorPacket {
            header: PacketHeader {
                packet_type: PACKET_TYPE_IMU,
                t_send: clock_now_sec,
                t_sample: sample.timestamp.to_seconds(),
                custom_16,
            },
            gyro_dps: sample.gyro_dps,
            accel_g: sample.accel_g,
            mag: sample.mag,
            temp_c: sample.temp_c,
            baro: 0.0,
            latlon: Vec3::ZERO,
            avail: sample.avail,
            log_text: String::new(),
        }
    }

    pub fn to_sample(&self) -> SensorSample {
        SensorSample {
            timestamp: Timestamp::from_seconds(self.header.t_sample.max(0.0)),
            gyro_dps: self.gyro_dps,
            accel_g: self.accel_g,
            mag: self.mag,
            temp_c: self.temp_c,
            avail: self.avail,
        }
    }

    /// Encode this packet to its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(96 + MAX_LOG_TEXT_BYTES);
        (|| -> std::io::Result<()> {
            buf.write_u16::<LittleEndian>(self.header.packet_type)?;
            buf.write_f64::<LittleEndian>(self.header.t_send)?;
            buf.write_f64::<LittleEndian>(self.header.t_sample)?;
            buf.write_u16::<LittleEndian>(self.header.custom_16[0])?;
            buf.write_u16::<LittleEndian>(self.header.custom_16[1])?;
            write_vec3(&mut buf, &self.gyro_dps)?;
            write_vec3(&mut buf, &self.accel_g)?;
            write_vec3(&mut buf, &self.mag)?;
            buf.write_f64::<LittleEndian>(self.temp_c)?;
            buf.write_f64::<LittleEndian>(self.baro)?;
            write_vec3(&mut buf, &self.latlon)?;
            buf.write_u8(self.avail.bits())?;
            let log_bytes = self.log_text.as_bytes();
            let n = log_bytes.len().min(MAX_LOG_TEXT_BYTES);
            buf.write_u8(n as u8)?;
            buf.write_all(&log_bytes[..n])?;
            Ok(())
        })()
        .map_err(|e| AggregatorError::Wire(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a packet previously produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        (|| -> std::io::Result<SensorPacket> {
            let packet_type = cur.read_u16::<LittleEndian>()?;
            let t_send = cur.read_f64::<LittleEndian>()?;
            let t_sample = cur.read_f64::<LittleEndian>()?;
            let c0 = cur.read_u16::<LittleEndian>()?;
            let c1 = cur.read_u16::<LittleEndian>()?;
            let gyro_dps = read_vec3(&mut cur)?;
            let accel_g = read_vec3(&mut cur)?;
            let mag = read_vec3(&mut cur)?;
            let temp_c = cur.read_f64::<LittleEndian>()?;
            let baro = cur.read_f64::<LittleEndian>()?;
            let latlon = read_vec3(&mut cur)?;
            let avail_bits = cur.read_u8()?;
            let log_len = cur.read_u8()? as usize;
            let mut log_buf = vec![0u8; log_len];
            cur.read_exact(&mut log_buf)?;
            Ok(SensorPacket {
                header: PacketHeader { packet_type, t_send, t_sample, custom_16: [c0, c1] },
                gyro_dps,
                accel_g,
                mag,
                temp_c,
                baro,
                latlon,
                avail: AvailFlags::from_bits_truncate(avail_bits),
                log_text: String::from_utf8_lossy(&log_buf).into_owned(),
            })
        })()
        .map_err(|e| AggregatorError::Wire(e.to_string()))
    }
}
