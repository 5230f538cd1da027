//! Driver-comm thread (spec §4.E, §5): owns the tiller serial link
//! exclusively, framing outgoing heading packets and reassembling
//! incoming tiller replies. Kept separate from the decision thread so a
//! slow or wedged serial port never blocks course planning (`comm.c`
//! `check_autopilot_response` / `send_heading_packet`).

use crate::error::{DriverError, Result};
use crate::serial::{HeadingPacket, PacketAssembler, PacketEvent, TillerReply, SERIAL_PACKET_END, SERIAL_PACKET_START};
use kharon_types::{MasterClock, Timestamp};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A serial-like byte stream. `Box<dyn serialport::SerialPort>` satisfies
/// this automatically; tests use an in-memory double instead of real
/// hardware.
pub trait TillerPort: Read + Write + Send {}
impl<T: Read + Write + Send> TillerPort for T {}

/// Shared record of the last time a tiller reply was received, read by
/// the decision thread to evaluate the `OTTO_ERR_TIMEOUT_SEC` condition
/// (spec §4.E "autopilot timeout") without the two threads sharing the
/// serial port itself.
#[derive(Clone)]
pub struct OttoReplyTracker(Arc<Mutex<Option<Timestamp>>>);

impl OttoReplyTracker {
    pub fn new() -> Self {
        OttoReplyTracker(Arc::new(Mutex::new(None)))
    }

    pub fn record(&self, now: Timestamp) {
        *self.0.lock() = Some(now);
    }

    pub fn last(&self) -> Option<Timestamp> {
        *self.0.lock()
    }
}

impl Default for OttoReplyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Mailbox the decision thread drops the latest outgoing heading packet
/// into; single slot, freshness flag, no blocking on either side (spec §9
/// design notes, "silent shared-memory access... re-express as a small
/// pair of lock-free single-producer/single-consumer mailboxes").
#[derive(Clone)]
pub struct OutgoingHeading {
    slot: Arc<Mutex<Option<HeadingPacket>>>,
    dirty: Arc<AtomicBool>,
}

impl OutgoingHeading {
    pub fn new() -> Self {
        OutgoingHeading { slot: Arc::new(Mutex::new(None)), dirty: Arc::new(AtomicBool::new(false)) }
    }

    pub fn post(&self, packet: HeadingPacket) {
        *self.slot.lock() = Some(packet);
        self.dirty.store(true, Ordering::Release);
    }

    fn take_if_dirty(&self) -> Option<HeadingPacket> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            *self.slot.lock()
        } else {
            None
        }
    }
}

impl Default for OutgoingHeading {
    fn default() -> Self {
        Self::new()
    }
}

/// Interval between serial poll/push cycles (spec §5, `usleep(20_000)`).
pub const COMM_POLL_INTERVAL: Duration = Duration::from_micros(20_000);

/// Frames a [`HeadingPacket`] between the start/end sentinels, 7-bit data
/// bytes unchanged (`comm.c` `send_heading_packet`).
fn frame_outgoing(packet: &HeadingPacket) -> [u8; 8] {
    let data = packet.encode();
    [
        SERIAL_PACKET_START,
        data[0],
        data[1],
        data[2],
        data[3],
        data[4],
        data[5],
        SERIAL_PACKET_END,
    ]
}

/// One pass over the serial link: push any pending outgoing heading
/// packet, then drain whatever bytes are presently available and feed
/// them through the assembler, recording replies and debug lines.
pub fn poll_once(
    port: &mut dyn TillerPort,
    assembler: &mut PacketAssembler,
    outgoing: &OutgoingHeading,
    reply_tracker: &OttoReplyTracker,
    clock: &MasterClock,
) -> Result<()> {
    if let Some(packet) = outgoing.take_if_dirty() {
        port.write_all(&frame_outgoing(&packet)).map_err(|e| DriverError::Io(e.to_string()))?;
    }

    let mut buf = [0u8; 64];
    match port.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => {
            for &byte in &buf[..n] {
                match assembler.push_byte(byte) {
                    PacketEvent::Pending => {}
                    PacketEvent::Packet(data) => {
                        let reply = TillerReply::decode(&data)?;
                        debug!(?reply, "tiller reply");
                        reply_tracker.record(clock.now());
                    }
                    PacketEvent::DebugLine(line) => {
                        debug!(%line, "tiller debug line");
                    }
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
        Err(e) => {
            warn!(error = %e, "tiller serial read failed");
            return Err(DriverError::Io(e.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::TILLER_FAULT_THRESHOLD;
    use std::collections::VecDeque;

    struct LoopbackPort {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
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

    impl Write for LoopbackPort {
        fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_all(buf).map(|_| buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn posted_heading_is_framed_and_written() {
        let mut port = LoopbackPort { inbound: VecDeque::new(), outbound: Vec::new() };
        let mut assembler = PacketAssembler::new(8);
        let outgoing = OutgoingHeading::new();
        let tracker = OttoReplyTracker::new();
        let clock = MasterClock::new();
        outgoing.post(HeadingPacket { heading_degs: 45, course_degs: 90, turn_rate_dps: 0.0 });

        poll_once(&mut port, &mut assembler, &outgoing, &tracker, &clock).unwrap();

        assert_eq!(port.outbound.first(), Some(&SERIAL_PACKET_START));
        assert_eq!(port.outbound.last(), Some(&SERIAL_PACKET_END));
        assert_eq!(port.outbound.len(), 8);
    }

    #[test]
    fn incoming_reply_updates_tracker() {
        let reply = TillerReply {
            tiller_position: 100,
            course_degs: 90,
            heading_degs: 91,
            turn_rate_centidps: 5,
        };
        assert!(reply.tiller_position < TILLER_FAULT_THRESHOLD);

        let mut bytes = vec![SERIAL_PACKET_START];
        let field = |v: i16| -> [u8; 2] { [((v >> 7) & 0x7f) as u8, (v & 0x7f) as u8] };
        for v in [reply.tiller_position, reply.course_degs, reply.heading_degs, reply.turn_rate_centidps] {
            bytes.extend_from_slice(&field(v));
        }
        bytes.push(SERIAL_PACKET_END);

        let mut port = LoopbackPort { inbound: bytes.into(), outbound: Vec::new() };
        let mut assembler = PacketAssembler::new(8);
        let outgoing = OutgoingHeading::new();
        let tracker = OttoReplyTracker::new();
        let clock = MasterClock::new();

        poll_once(&mut port, &mut assembler, &outgoing, &tracker, &clock).unwrap();

        assert!(tracker.last().is_some());
    }
}
