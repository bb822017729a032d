//! Frame reassembly from isochronous payloads
//!
//! Frame boundaries come from the payload header: a change of the FID bit
//! starts a new frame, EOF ends the current one. Devices that never set EOF
//! still produce frames because the FID toggle force-completes whatever is
//! capturing.

use super::payload::{HeaderError, PayloadHeader};
use super::queue::FrameSink;
use crate::error::UsbError;
use crate::transfer::StreamStats;

/// What happened to one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketOutcome {
    /// Zero-length packet, ignored
    Empty,
    /// Header rejected, packet dropped
    Malformed,
    /// Payload arrived with no buffer capturing
    Dropped,
    /// Header-only packet outside a frame
    HeaderOnly,
    /// Payload written to the capturing buffer
    Captured {
        /// This packet carried EOF and completed the frame
        frame_complete: bool,
    },
}

/// Reassembly state carried between packets
#[derive(Debug, Default)]
pub struct Reassembler {
    last_fid: Option<bool>,
}

impl Reassembler {
    /// Engine waiting for the first packet of a stream
    pub const fn new() -> Self {
        Self { last_fid: None }
    }

    /// Forget the frame ID; the next packet starts a frame
    pub fn reset(&mut self) {
        self.last_fid = None;
    }

    /// FID of the last accepted packet
    pub fn last_fid(&self) -> Option<bool> {
        self.last_fid
    }

    /// Feed one received packet
    pub fn reassemble<B: AsMut<[u8]>>(
        &mut self,
        packet: &[u8],
        sink: &mut FrameSink<'_, B>,
        stats: &StreamStats,
    ) -> PacketOutcome {
        stats.record_packet();

        let header = match PayloadHeader::parse(packet) {
            Ok(header) => header,
            Err(HeaderError::Empty) => {
                stats.record_empty();
                return PacketOutcome::Empty;
            }
            Err(e) => {
                debug!("malformed payload header ({:?}), {} byte packet dropped", e, packet.len());
                stats.record_malformed();
                return PacketOutcome::Malformed;
            }
        };

        let fid = header.fid();
        if self.last_fid != Some(fid) {
            if let Some(had_error) = sink.complete() {
                debug!("frame completed by FID toggle (no EOF)");
                stats.record_frame(had_error, true);
            }
            if !sink.begin_frame() {
                trace!("frame start with no buffer available");
            }
        }
        self.last_fid = Some(fid);

        let payload = header.payload(packet);
        if !sink.is_capturing() {
            if payload.is_empty() {
                return PacketOutcome::HeaderOnly;
            }
            stats.record_dropped();
            return PacketOutcome::Dropped;
        }

        if header.error() {
            sink.mark_error();
        }
        if let Some(outcome) = sink.write(payload) {
            if outcome.truncated > 0 {
                stats.record_truncated(outcome.truncated);
            }
        }

        let frame_complete = header.end_of_frame();
        if frame_complete {
            if let Some(had_error) = sink.complete() {
                stats.record_frame(had_error, false);
            }
        }
        PacketOutcome::Captured { frame_complete }
    }

    /// Account for an isochronous receive that failed at the transport
    pub fn transport_error<B: AsMut<[u8]>>(
        &mut self,
        error: UsbError,
        sink: &mut FrameSink<'_, B>,
        stats: &StreamStats,
    ) {
        stats.record_transport_error();
        if sink.mark_error() {
            debug!("isochronous receive failed ({}), frame marked", error);
        }
    }
}
