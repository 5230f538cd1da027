//! Tiller autopilot serial framing (spec §4.E "autopilot link"). Packets
//! carry 7-bit data bytes between two sentinel bytes whose top bit is set;
//! this mirrors the original `comm.c` bit layout exactly so the physical
//! Arduino-side autopilot firmware needs no change.

use crate::error::{DriverError, Result};

/// Marks the start of a packet; never appears as a data byte since data
/// bytes always have their high bit clear.
pub const SERIAL_PACKET_START: u8 = 0x81;
/// Marks the end of a packet.
pub const SERIAL_PACKET_END: u8 = 0x82;
/// Any byte with these bits set (and not a start/end sentinel) introduces
/// a debug text line, terminated by `\n`.
pub const SERIAL_DEBUG_MASK: u8 = 0x90;

/// Computer-to-autopilot packet: six 7-bit bytes encoding heading, course,
/// and turn rate (spec §4.E, `comm.c` `convert_heading_to_packet8`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingPacket {
    /// Compass heading in degrees, `0..360`.
    pub heading_degs: u16,
    /// Desired course in degrees; `>= 360` tells the autopilot to center
    /// the rudder rather than steer.
    pub course_degs: u16,
    /// Approximate turn rate, degrees per second.
    pub turn_rate_dps: f32,
}

impl HeadingPacket {
    /// Pack into the 6 data bytes sent between the start/end sentinels.
    /// Each 14-bit value splits into a high 7-bit byte and a low 7-bit
    /// byte, both with the high bit clear.
    pub fn encode(&self) -> [u8; 6] {
        let idps = (self.turn_rate_dps * 100.0).round() as i32;
        [
            ((self.heading_degs >> 7) & 0x7f) as u8,
            (self.heading_degs & 0x7f) as u8,
            ((self.course_degs >> 7) & 0x7f) as u8,
            (self.course_degs & 0x7f) as u8,
            ((idps >> 7) & 0x7f) as u8,
            (idps & 0x7f) as u8,
        ]
    }
}

/// Autopilot-to-computer packet: tiller position, course/heading
/// confirmation, and measured turn rate (spec §4.E, `comm.c`
/// `convert_packet8_to_tiller`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TillerReply {
    /// Tiller position, `0..=1024`; values above that indicate a fault
    /// (no power, or reversed polarity).
    pub tiller_position: i16,
    pub course_degs: i16,
    pub heading_degs: i16,
    /// Turn rate in degrees per second, hundredths (divide by 100).
    pub turn_rate_centidps: i16,
}

/// Tiller-position values at or above this indicate the tiller arm isn't
/// responding (spec §4.E).
pub const TILLER_FAULT_THRESHOLD: i16 = 2048;

impl TillerReply {
    /// Unpack from the 8 data bytes of a completed reply packet.
    pub fn decode(data: &[u8; 8]) -> Result<Self> {
        if data.iter().any(|b| b & 0x80 != 0) {
            return Err(DriverError::Framing(
                "tiller reply byte had high bit set".into(),
            ));
        }
        let field = |hi: u8, lo: u8| -> i16 { (((hi as u16) << 7) | (lo as u16 & 0x7f)) as i16 };
        let tiller_position = field(data[0], data[1]);
        let course_degs = field(data[2], data[3]);
        let heading_degs = field(data[4], data[5]);
        let mut turn_rate_centidps = field(data[6], data[7]);
        // sign-extend bit 13 up through the top two bits of the i16
        if turn_rate_centidps & 0x2000 != 0 {
            turn_rate_centidps |= !0x3fffu16 as i16;
        }
        Ok(TillerReply { tiller_position, course_degs, heading_degs, turn_rate_centidps })
    }
}

/// Incrementally reassembles framed packets (and debug text lines) from a
/// raw byte stream (spec §4.E, `comm.c` `check_autopilot_response`).
pub enum PacketAssembler {
    /// Waiting for `SERIAL_PACKET_START`, or mid-packet.
    Idle { buf: Vec<u8>, expected: usize },
    /// Inside a debug text line, accumulating until `\n`.
    Debug(String),
}

/// One event yielded by feeding a byte into the [`PacketAssembler`].
#[derive(Debug, Clone, PartialEq)]
pub enum PacketEvent {
    /// No complete unit yet.
    Pending,
    /// A full 8-byte data packet was framed.
    Packet([u8; 8]),
    /// A complete debug text line (sans trailing newline).
    DebugLine(String),
}

impl PacketAssembler {
    pub fn new(expected: usize) -> Self {
        PacketAssembler::Idle { buf: Vec::with_capacity(expected), expected }
    }

    /// Feed one raw byte, returning whatever unit (if any) it completed.
    pub fn push_byte(&mut self, byte: u8) -> PacketEvent {
        if let PacketAssembler::Debug(line) = self {
            if byte == b'\n' {
                let finished = std::mem::take(line);
                let expected = 8;
                *self = PacketAssembler::Idle { buf: Vec::with_capacity(expected), expected };
                return PacketEvent::DebugLine(finished);
            }
            line.push(byte as char);
            return PacketEvent::Pending;
        }

        if byte & SERIAL_DEBUG_MASK == SERIAL_DEBUG_MASK
            && byte != SERIAL_PACKET_START
            && byte != SERIAL_PACKET_END
        {
            *self = PacketAssembler::Debug(String::new());
            return PacketEvent::Pending;
        }

        let PacketAssembler::Idle { buf, expected } = self else { unreachable!() };
        if byte == SERIAL_PACKET_START {
            buf.clear();
            return PacketEvent::Pending;
        }
        if byte == SERIAL_PACKET_END {
            if buf.len() == *expected {
                let mut out = [0u8; 8];
                out[..buf.len()].copy_from_slice(buf);
                buf.clear();
                return PacketEvent::Packet(out);
            }
            buf.clear();
            return PacketEvent::Pending;
        }
        if buf.len() >= *expected {
            buf.clear();
            return PacketEvent::Pending;
        }
        buf.push(byte);
        PacketEvent::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_packet_round_trips_through_decode_shaped_fields() {
        let packet = HeadingPacket { heading_degs: 271, course_degs: 90, turn_rate_dps: 1.23 };
        let bytes = packet.encode();
        let heading = ((bytes[0] as u16) << 7) | (bytes[1] as u16 & 0x7f);
        let course = ((bytes[2] as u16) << 7) | (bytes[3] as u16 & 0x7f);
        assert_eq!(heading, 271);
        assert_eq!(course, 90);
        assert!(bytes.iter().all(|b| b & 0x80 == 0));
    }

    #[test]
    fn tiller_reply_sign_extends_negative_turn_rate() {
        // -50 centidegrees/sec as a 14-bit two's complement value.
        let raw: u16 = (16384u32.wrapping_sub(50)) as u16 & 0x3fff;
        let hi = ((raw >> 7) & 0x7f) as u8;
        let lo = (raw & 0x7f) as u8;
        let data = [0, 0, 0, 0, 0, 0, hi, lo];
        let reply = TillerReply::decode(&data).unwrap();
        assert_eq!(reply.turn_rate_centidps, -50);
    }

    #[test]
    fn rejects_high_bit_set_data_byte() {
        let data = [0x80, 0, 0, 0, 0, 0, 0, 0];
        assert!(TillerReply::decode(&data).is_err());
    }

    #[test]
    fn assembler_frames_a_complete_packet() {
        let mut asm = PacketAssembler::new(8);
        assert_eq!(asm.push_byte(SERIAL_PACKET_START), PacketEvent::Pending);
        for b in [1u8, 2, 3, 4, 5, 6, 7, 8] {
            assert_eq!(asm.push_byte(b), PacketEvent::Pending);
        }
        let event = asm.push_byte(SERIAL_PACKET_END);
        assert_eq!(event, PacketEvent::Packet([1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn assembler_drops_incomplete_packet_on_early_end() {
        let mut asm = PacketAssembler::new(8);
        asm.push_byte(SERIAL_PACKET_START);
        asm.push_byte(1);
        let event = asm.push_byte(SERIAL_PACKET_END);
        assert_eq!(event, PacketEvent::Pending);
    }

    #[test]
    fn assembler_captures_debug_line() {
        let mut asm = PacketAssembler::new(8);
        for b in b"hello" {
            assert_eq!(asm.push_byte(SERIAL_DEBUG_MASK | 0x01), PacketEvent::Pending);
            break;
        }
        for b in b"ello" {
            asm.push_byte(*b);
        }
        let event = asm.push_byte(b'\n');
        assert_eq!(event, PacketEvent::DebugLine("ello".to_string()));
    }
}
