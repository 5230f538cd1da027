//! GPS packet (spec §6): a 256-byte fixed block carrying a raw NMEA
//! sentence, which the driver parses for position, speed, and course to
//! feed the router (spec §4.D "Router ... also consumes GPS as an
//! opaque stream"). RMC and GGA are the two sentence types actually
//! needed: RMC gives speed/track/date, GGA gives the fix itself.

use crate::error::{DriverError, Result};

pub const GPS_PACKET_LEN: usize = 256;

/// A parsed GPS fix (spec §6 "consumer parses RMC/GGA to extract
/// `{lat, lon, speed, track, zulu_time, zulu_date}`").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub lat_deg: f64,
    pub lon_deg: f64,
    /// Speed over ground, knots.
    pub speed_kts: f64,
    /// Course over ground, degrees true.
    pub track_deg: f64,
    /// UTC time of day, seconds since midnight.
    pub zulu_time_sec: f64,
    /// UTC date as `ddmmyy`, as transmitted by RMC.
    pub zulu_date: u32,
}

/// Parse a fixed 256-byte GPS packet: ASCII decimal seconds, a space,
/// then the raw NMEA sentence (spec §6).
pub fn parse_gps_packet(packet: &[u8]) -> Result<GpsFix> {
    if packet.len() < GPS_PACKET_LEN {
        return Err(DriverError::Framing(format!(
            "GPS packet too short: {} < {GPS_PACKET_LEN}",
            packet.len()
        )));
    }
    let text = std::str::from_utf8(packet)
        .map_err(|e| DriverError::Framing(format!("GPS packet is not valid ASCII: {e}")))?;
    let text = text.trim_end_matches('\0');
    let (_seconds, nmea) = text
        .split_once(' ')
        .ok_or_else(|| DriverError::Framing("GPS packet missing seconds/NMEA separator".into()))?;
    parse_nmea(nmea.trim_end())
}

/// Parse whichever of RMC or GGA the sentence is; a caller assembling a
/// fix from a live stream calls this per-sentence and merges fields that
/// arrive from either, but each sentence alone carries everything this
/// type needs.
fn parse_nmea(sentence: &str) -> Result<GpsFix> {
    let sentence = sentence.trim_start_matches('$');
    let fields: Vec<&str> = sentence.split(',').collect();
    let talker = fields.first().copied().unwrap_or_default();

    if talker.len() >= 5 && &talker[2..5] == "RMC" {
        parse_rmc(&fields)
    } else if talker.len() >= 5 && &talker[2..5] == "GGA" {
        parse_gga(&fields)
    } else {
        Err(DriverError::Framing(format!("unsupported NMEA sentence type: {talker}")))
    }
}

fn parse_lat(field: &str, hemi: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    let split = field.find('.')? - 2;
    let deg: f64 = field[..split].parse().ok()?;
    let min: f64 = field[split..].parse().ok()?;
    let mut lat = deg + min / 60.0;
    if hemi == "S" {
        lat = -lat;
    }
    Some(lat)
}

fn parse_lon(field: &str, hemi: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    let split = field.find('.')? - 2;
    let deg: f64 = field[..split].parse().ok()?;
    let min: f64 = field[split..].parse().ok()?;
    let mut lon = deg + min / 60.0;
    if hemi == "W" {
        lon = -lon;
    }
    Some(lon)
}

fn parse_hhmmss(field: &str) -> Option<f64> {
    if field.len() < 6 {
        return None;
    }
    let hh: f64 = field[0..2].parse().ok()?;
    let mm: f64 = field[2..4].parse().ok()?;
    let ss: f64 = field[4..].parse().ok()?;
    Some(hh * 3600.0 + mm * 60.0 + ss)
}

/// `$GPRMC,hhmmss.ss,A,llll.ll,a,yyyyy.yy,a,speed_kts,track_deg,ddmmyy,...`
fn parse_rmc(fields: &[&str]) -> Result<GpsFix> {
    let bad = || DriverError::Framing("malformed RMC sentence".to_string());
    if fields.len() < 10 {
        return Err(bad());
    }
    let zulu_time_sec = parse_hhmmss(fields[1]).ok_or_else(bad)?;
    let lat = parse_lat(fields[3], fields[4]).ok_or_else(bad)?;
    let lon = parse_lon(fields[5], fields[6]).ok_or_else(bad)?;
    let speed_kts: f64 = fields[7].parse().map_err(|_| bad())?;
    let track_deg: f64 = fields[8].parse().unwrap_or(0.0);
    let zulu_date: u32 = fields[9].parse().map_err(|_| bad())?;
    Ok(GpsFix { lat_deg: lat, lon_deg: lon, speed_kts, track_deg, zulu_time_sec, zulu_date })
}

/// `$GPGGA,hhmmss.ss,llll.ll,a,yyyyy.yy,a,fix_quality,...` -- no
/// speed/track/date, so those fields default to zero.
fn parse_gga(fields: &[&str]) -> Result<GpsFix> {
    let bad = || DriverError::Framing("malformed GGA sentence".to_string());
    if fields.len() < 6 {
        return Err(bad());
    }
    let zulu_time_sec = parse_hhmmss(fields[1]).ok_or_else(bad)?;
    let lat = parse_lat(fields[2], fields[3]).ok_or_else(bad)?;
    let lon = parse_lon(fields[4], fields[5]).ok_or_else(bad)?;
    Ok(GpsFix { lat_deg: lat, lon_deg: lon, speed_kts: 0.0, track_deg: 0.0, zulu_time_sec, zulu_date: 0 })
}
