//! Isochronous receive path
//!
//! Two fixed packet scratch buffers ping-pong between the transport and the
//! reassembly engine. At most one receive is scheduled at a time; when it
//! completes the next receive goes into the other buffer before the
//! completed one is looked at, so the transport is never left without a
//! buffer while reassembly runs. The buffers live in `'static` storage so
//! moving the session does not move memory the transport is writing to.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::UsbError;
use crate::transport::UsbTransport;

/// Microframe timing decoded from an isochronous `wMaxPacketSize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MicroframeTiming {
    /// Bytes per transaction (bits 10..0)
    bytes_per_transaction: u16,
    /// Additional transactions per microframe (bits 12..11, high speed only)
    additional_transactions: u8,
}

impl MicroframeTiming {
    /// Decode a raw `wMaxPacketSize`
    pub const fn from_max_packet(raw: u16) -> Self {
        Self {
            bytes_per_transaction: raw & 0x07FF,
            additional_transactions: ((raw >> 11) & 0x03) as u8,
        }
    }

    /// Bytes per transaction
    pub fn bytes_per_transaction(&self) -> u16 {
        self.bytes_per_transaction
    }

    /// Additional transactions per microframe
    pub fn additional_transactions(&self) -> u8 {
        self.additional_transactions
    }

    /// Bytes a single isochronous receive may deliver
    pub fn packet_bytes(&self) -> usize {
        self.bytes_per_transaction as usize * (1 + self.additional_transactions as usize)
    }
}

/// Status reported with an isochronous completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IsoStatus {
    /// Packet received
    Ok,
    /// Transaction error; no data should be trusted
    Error(UsbError),
}

/// Completion of one isochronous receive, as seen from the interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoCompletion {
    /// Bytes written into the scheduled buffer
    pub bytes_received: usize,
    /// Transfer status
    pub status: IsoStatus,
}

impl IsoCompletion {
    /// Successful completion
    pub const fn ok(bytes_received: usize) -> Self {
        Self {
            bytes_received,
            status: IsoStatus::Ok,
        }
    }

    /// Failed completion
    pub const fn error(error: UsbError) -> Self {
        Self {
            bytes_received: 0,
            status: IsoStatus::Error(error),
        }
    }
}

/// Outcome of the re-arm step of completion handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rearmed {
    /// Scratch slot holding the packet that just completed
    pub retired: usize,
    /// Result of scheduling the next receive
    pub result: Result<(), UsbError>,
}

/// Storage for the two packet scratch buffers
///
/// The transport writes into this memory behind the driver's back, so it
/// must outlive any receive that is scheduled into it: the driver only
/// accepts it as `&'static mut`, for example from a `static` placed in DMA
/// capable RAM.
pub type ScratchBuffers<const N: usize> = [[u8; N]; 2];

/// Ping-pong packet scratch buffers
pub struct PacketScratch<const N: usize> {
    buffers: &'static mut ScratchBuffers<N>,
    in_flight: Option<usize>,
    packet_len: usize,
}

impl<const N: usize> PacketScratch<N> {
    /// Idle scratch buffers backed by `buffers`
    pub fn new(buffers: &'static mut ScratchBuffers<N>) -> Self {
        Self {
            buffers,
            in_flight: None,
            packet_len: N,
        }
    }

    /// Capacity of one scratch buffer
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Set the length requested per receive
    pub fn set_packet_len(&mut self, len: usize) -> Result<(), UsbError> {
        if len == 0 || len > N {
            return Err(UsbError::InvalidParameter);
        }
        self.packet_len = len;
        Ok(())
    }

    /// Length requested per receive
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    /// Slot currently scheduled with the transport
    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    /// Schedule the first receive into slot 0
    pub fn start<T: UsbTransport>(&mut self, transport: &mut T) -> Result<(), UsbError> {
        if self.in_flight.is_some() {
            return Ok(());
        }
        self.arm(transport, 0)
    }

    fn arm<T: UsbTransport>(&mut self, transport: &mut T, slot: usize) -> Result<(), UsbError> {
        let len = self.packet_len;
        let buffer = self.buffers[slot].as_mut_ptr();
        // Safety: the slot is `'static` memory owned only by this struct and
        // `N >= len` bytes long. It is not read until `rearm` retires it, and
        // the storage is handed back only through `cancel`, after the
        // transport has dropped the receive.
        unsafe { transport.receive_isochronous(buffer, len)? };
        self.in_flight = Some(slot);
        Ok(())
    }

    /// First half of completion handling: schedule the other slot
    ///
    /// Returns `None` when no receive was outstanding (spurious completion).
    pub fn rearm<T: UsbTransport>(&mut self, transport: &mut T) -> Option<Rearmed> {
        let retired = self.in_flight.take()?;
        let result = self.arm(transport, retired ^ 1);
        Some(Rearmed { retired, result })
    }

    /// Received bytes of a retired slot, clamped to the buffer
    pub fn packet(&self, slot: usize, bytes_received: usize) -> &[u8] {
        let len = bytes_received.min(self.packet_len);
        &self.buffers[slot & 1][..len]
    }

    /// Cancel the outstanding receive and give the storage back
    pub fn cancel<T: UsbTransport>(self, transport: &mut T) -> &'static mut ScratchBuffers<N> {
        if self.in_flight.is_some() {
            transport.cancel_isochronous();
        }
        self.buffers
    }
}

/// Streaming statistics
///
/// Counters are atomics so they can be sampled through a shared reference
/// while the interrupt path updates them.
#[derive(Debug)]
pub struct StreamStats {
    packets: AtomicU32,
    empty_packets: AtomicU32,
    malformed_packets: AtomicU32,
    dropped_packets: AtomicU32,
    transport_errors: AtomicU32,
    frames_completed: AtomicU32,
    frames_forced: AtomicU32,
    error_frames: AtomicU32,
    truncated_bytes: AtomicU32,
}

impl StreamStats {
    /// Zeroed statistics
    pub const fn new() -> Self {
        Self {
            packets: AtomicU32::new(0),
            empty_packets: AtomicU32::new(0),
            malformed_packets: AtomicU32::new(0),
            dropped_packets: AtomicU32::new(0),
            transport_errors: AtomicU32::new(0),
            frames_completed: AtomicU32::new(0),
            frames_forced: AtomicU32::new(0),
            error_frames: AtomicU32::new(0),
            truncated_bytes: AtomicU32::new(0),
        }
    }

    pub(crate) fn record_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.empty_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncated(&self, bytes: usize) {
        self.truncated_bytes.fetch_add(bytes as u32, Ordering::Relaxed);
    }

    /// Record a frame handed to the consumer
    pub(crate) fn record_frame(&self, had_error: bool, forced: bool) {
        self.frames_completed.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.frames_forced.fetch_add(1, Ordering::Relaxed);
        }
        if had_error {
            self.error_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Packets processed (including empty and malformed)
    pub fn packets(&self) -> u32 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Zero-length packets
    pub fn empty_packets(&self) -> u32 {
        self.empty_packets.load(Ordering::Relaxed)
    }

    /// Packets with an invalid payload header
    pub fn malformed_packets(&self) -> u32 {
        self.malformed_packets.load(Ordering::Relaxed)
    }

    /// Payload packets that arrived with no buffer capturing
    pub fn dropped_packets(&self) -> u32 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    /// Completions reported with a transport error
    pub fn transport_errors(&self) -> u32 {
        self.transport_errors.load(Ordering::Relaxed)
    }

    /// Frames that reached `Ready`
    pub fn frames_completed(&self) -> u32 {
        self.frames_completed.load(Ordering::Relaxed)
    }

    /// Frames completed by a frame-ID toggle instead of EOF
    pub fn frames_forced(&self) -> u32 {
        self.frames_forced.load(Ordering::Relaxed)
    }

    /// Frames delivered with the error flag set
    pub fn error_frames(&self) -> u32 {
        self.error_frames.load(Ordering::Relaxed)
    }

    /// Payload bytes discarded because a buffer was full
    pub fn truncated_bytes(&self) -> u32 {
        self.truncated_bytes.load(Ordering::Relaxed)
    }

    /// Fraction of completed frames that carried the error flag
    pub fn frame_error_rate(&self) -> f32 {
        let error_frames = self.error_frames() as f32;
        let total_frames = self.frames_completed() as f32;
        if total_frames > 0.0 {
            error_frames / total_frames
        } else {
            0.0
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}
