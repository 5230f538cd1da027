//! Camera handshake and image packet wire format (spec §6): how a camera
//! connection identifies itself and how perspective frames cross the
//! network into the panorama stage. Image *content* interpretation
//! (undistortion, projection) lives in [`crate::pyramid`]; this module is
//! purely the framing.

use crate::error::{PanoramaError, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Magic value a camera connection sends first, network byte order
/// (spec §6 "Handshake").
pub const VY_STREAM_ID: u32 = 0x5659_4944; // "VYID"
/// Reply confirming the handshake; anything else (or a dropped
/// connection) means the server rejected it.
pub const HANDSHAKE_OK: u32 = 0x4F4B_0000; // "OK\0\0"

/// Packet type tag for an image packet on the wire (spec §6).
pub const VY_PACKET_TYPE: u16 = 2;

/// Perform the client side of the camera handshake: send the stream ID,
/// read back the reply, and confirm it matches [`HANDSHAKE_OK`].
pub fn send_handshake(stream: &mut impl Write) -> Result<()> {
    stream
        .write_u32::<BigEndian>(VY_STREAM_ID)
        .map_err(|e| PanoramaError::Wire(e.to_string()))
}

/// Perform the server side: read the stream ID the client sent and reply
/// with [`HANDSHAKE_OK`] if (and only if) it matches, mirroring "server
/// replies `htonl(HANDSHAKE_OK)` or the connection is dropped" (spec §6).
pub fn accept_handshake(stream: &mut (impl Read + Write)) -> Result<bool> {
    let id = stream.read_u32::<BigEndian>().map_err(|e| PanoramaError::Wire(e.to_string()))?;
    if id != VY_STREAM_ID {
        return Ok(false);
    }
    stream
        .write_u32::<BigEndian>(HANDSHAKE_OK)
        .map_err(|e| PanoramaError::Wire(e.to_string()))?;
    Ok(true)
}

/// Confirm a handshake reply received after calling [`send_handshake`].
pub fn read_handshake_reply(stream: &mut impl Read) -> Result<bool> {
    let reply = stream.read_u32::<BigEndian>().map_err(|e| PanoramaError::Wire(e.to_string()))?;
    Ok(reply == HANDSHAKE_OK)
}

/// Header of one image packet: `rows`/`cols` travel in the `custom_16`
/// fields in network (big-endian) order even though the rest of the wire
/// protocol is little-endian (spec §6 explicitly calls this out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub packet_type: u16,
    pub rows: u16,
    pub cols: u16,
}

/// A decoded image packet: the header plus the V and Y planar buffers, in
/// that wire order (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePacket {
    pub header: ImageHeader,
    pub v_plane: Vec<u8>,
    pub y_plane: Vec<u8>,
}

impl ImagePacket {
    pub fn new(rows: u16, cols: u16, v_plane: Vec<u8>, y_plane: Vec<u8>) -> Result<Self> {
        let plane_len = (rows as usize * cols as usize) / 2;
        if v_plane.len() != plane_len || y_plane.len() != plane_len {
            return Err(PanoramaError::Wire(format!(
                "expected {plane_len}-byte planes for a {rows}x{cols} frame, got v={} y={}",
                v_plane.len(),
                y_plane.len()
            )));
        }
        Ok(ImagePacket { header: ImageHeader { packet_type: VY_PACKET_TYPE, rows, cols }, v_plane, y_plane })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.v_plane.len() + self.y_plane.len());
        buf.write_u16::<LittleEndian>(self.header.packet_type).unwrap();
        buf.write_u16::<BigEndian>(self.header.rows).unwrap();
        buf.write_u16::<BigEndian>(self.header.cols).unwrap();
        buf.extend_from_slice(&self.v_plane);
        buf.extend_from_slice(&self.y_plane);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let packet_type =
            cur.read_u16::<LittleEndian>().map_err(|e| PanoramaError::Wire(e.to_string()))?;
        let rows = cur.read_u16::<BigEndian>().map_err(|e| PanoramaError::Wire(e.to_string()))?;
        let cols = cur.read_u16::<BigEndian>().map_err(|e| PanoramaError::Wire(e.to_string()))?;
        let plane_len = (rows as usize * cols as usize) / 2;
        let mut v_plane = vec![0u8; plane_len];
        let mut y_plane = vec![0u8; plane_len];
        cur.read_exact(&mut v_plane).map_err(|e| PanoramaError::Wire(e.to_string()))?;
        cur.read_exact(&mut y_plane).map_err(|e| PanoramaError::Wire(e.to_string()))?;
        Ok(ImagePacket { header: ImageHeader { packet_type, rows, cols }, v_plane, y_plane })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Loopback(VecDeque<u8>);
    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.0.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }
    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend(buf.iter().copied());
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handshake_accepts_matching_stream_id_and_rejects_otherwise() {
        let mut good = Loopback(VecDeque::new());
        good.write_u32::<BigEndian>(VY_STREAM_ID).unwrap();
        assert!(accept_handshake(&mut good).unwrap());

        let mut bad = Loopback(VecDeque::new());
        bad.write_u32::<BigEndian>(0xDEAD_BEEF).unwrap();
        assert!(!accept_handshake(&mut bad).unwrap());
    }

    #[test]
    fn image_packet_round_trips() {
        let packet = ImagePacket::new(4, 4, vec![128; 8], vec![200; 8]).unwrap();
        let bytes = packet.encode();
        let decoded = ImagePacket::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn mismatched_plane_length_is_rejected() {
        assert!(ImagePacket::new(4, 4, vec![0; 4], vec![0; 8]).is_err());
    }
}
