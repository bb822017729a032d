//! USB Video Class streaming
//!
//! [`UvcClass`] is the [`ClassDriver`] for UVC cameras. It picks a format
//! from the configuration descriptor, negotiates it with probe/commit, and
//! turns isochronous completions into frames handed out through a
//! [`FrameSink`].

use core::task::Poll;

use crate::class::ClassDriver;
use crate::config::{StreamConfig, DEVICE_ADDRESS};
use crate::descriptor::{parse_configuration, PayloadKind, UvcVersion};
use crate::error::{Result, UvcError};
use crate::transfer::{ControlChannel, IsoCompletion, IsoStatus, PacketScratch, ScratchBuffers, StreamStats};
use crate::transport::{Speed, UsbTransport};

pub mod format;
pub mod negotiation;
pub mod payload;
pub mod probe;
pub mod queue;
pub mod reassembly;

pub use format::{select_format, FormatSelection};
pub use negotiation::{Negotiation, NegotiationState};
pub use payload::{HeaderInfo, PayloadHeader};
pub use probe::ProbeCommit;
pub use queue::{AlreadyFull, CaptureInfo, FrameQueue, FrameSink, FrameSupply, NotReady};
pub use reassembly::{PacketOutcome, Reassembler};

/// Negotiated streaming configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    /// VideoStreaming interface number
    pub interface: u8,
    /// `bFormatIndex`
    pub format_index: u8,
    /// `bFrameIndex`
    pub frame_index: u8,
    /// Frame interval in 100 ns units
    pub frame_interval: u32,
    /// Streaming alternate setting
    pub alternate: u8,
    /// Isochronous IN endpoint address
    pub endpoint_address: u8,
    /// Bytes per isochronous receive
    pub max_packet_size: usize,
    /// Payload format
    pub payload: PayloadKind,
    /// Frame width
    pub width: u16,
    /// Frame height
    pub height: u16,
    /// Protocol version of the device
    pub uvc_version: UvcVersion,
    /// `dwMaxVideoFrameSize` from the committed probe
    pub max_video_frame_size: u32,
}

/// UVC class driver
///
/// `B` is the frame buffer type handed in by the consumer; `N` is the size of
/// each isochronous scratch buffer and caps the endpoint that may be
/// selected.
pub struct UvcClass<'a, B, const N: usize> {
    request: StreamConfig,
    version: Option<UvcVersion>,
    negotiation: Option<Negotiation>,
    info: Option<DeviceInfo>,
    scratch: PacketScratch<N>,
    frames: FrameSink<'a, B>,
    engine: Reassembler,
    stats: StreamStats,
}

impl<'a, B: AsMut<[u8]>, const N: usize> UvcClass<'a, B, N> {
    /// Driver for `request`, not yet attached to a device
    ///
    /// Completed frames go out through `frames`; the matching
    /// [`FrameSupply`] stays with the consumer.
    pub fn new(request: StreamConfig, scratch: &'static mut ScratchBuffers<N>, frames: FrameSink<'a, B>) -> Self {
        Self {
            request,
            version: None,
            negotiation: None,
            info: None,
            scratch: PacketScratch::new(scratch),
            frames,
            engine: Reassembler::new(),
            stats: StreamStats::new(),
        }
    }

    /// Negotiated configuration, once streaming
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.info
    }

    /// Whether isochronous receives are being scheduled
    pub fn is_streaming(&self) -> bool {
        self.info.is_some()
    }

    /// Negotiation in progress, if any
    pub fn negotiation(&self) -> Option<&Negotiation> {
        self.negotiation.as_ref()
    }

    /// Streaming statistics
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Capture half of the frame queue
    pub fn frames(&self) -> &FrameSink<'a, B> {
        &self.frames
    }

    /// Stop streaming and give the scratch storage back
    ///
    /// The outstanding receive is cancelled first, so the transport no
    /// longer writes into the returned memory.
    pub fn release<T: UsbTransport>(self, transport: &mut T) -> &'static mut ScratchBuffers<N> {
        if self.info.is_some() {
            debug!("streaming stopped");
        }
        self.scratch.cancel(transport)
    }

    fn start_streaming<T: UsbTransport>(&mut self, transport: &mut T) -> Result<DeviceInfo> {
        let negotiation = self.negotiation.as_ref().ok_or(UvcError::InvalidState)?;
        let version = self.version.ok_or(UvcError::InvalidState)?;
        let selection = *negotiation.selection();
        let probe = *negotiation.probe();

        transport.open_streaming_pipe(DEVICE_ADDRESS, selection.endpoint_address, selection.max_packet_size)?;
        self.scratch.set_packet_len(selection.packet_bytes)?;
        self.engine.reset();
        self.scratch.start(transport)?;

        let info = DeviceInfo {
            interface: selection.interface,
            format_index: selection.format_index,
            frame_index: selection.frame_index,
            frame_interval: probe.frame_interval,
            alternate: selection.alternate,
            endpoint_address: selection.endpoint_address,
            max_packet_size: selection.packet_bytes,
            payload: selection.payload,
            width: selection.width,
            height: selection.height,
            uvc_version: version,
            max_video_frame_size: probe.max_video_frame_size,
        };
        info!(
            "streaming {}x{} {:?} from endpoint {:#04x}, {} byte packets",
            info.width,
            info.height,
            info.payload,
            info.endpoint_address,
            info.max_packet_size
        );
        self.info = Some(info);
        Ok(info)
    }
}

impl<'a, B: AsMut<[u8]>, const N: usize> ClassDriver for UvcClass<'a, B, N> {
    type Info = DeviceInfo;

    fn init(&mut self, config_descriptor: &[u8], speed: Speed) -> Result<()> {
        let function = parse_configuration(config_descriptor, speed)?;
        let selection = select_format(
            &function,
            self.request.width,
            self.request.height,
            self.request.frame_interval,
            self.request.payload,
            N,
        )
        .ok_or(UvcError::NoSupportedFormat)?;

        self.version = Some(function.uvc_version);
        self.negotiation = Some(Negotiation::new(selection, function.uvc_version));
        self.info = None;
        Ok(())
    }

    fn handle_class_request<T: UsbTransport>(
        &mut self,
        transport: &mut T,
        channel: &mut ControlChannel,
    ) -> Poll<Result<DeviceInfo>> {
        if let Some(info) = self.info {
            return Poll::Ready(Ok(info));
        }
        let Some(negotiation) = self.negotiation.as_mut() else {
            return Poll::Ready(Err(UvcError::InvalidState));
        };
        match negotiation.poll(transport, channel) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => Poll::Ready(self.start_streaming(transport)),
        }
    }

    fn background_process<T: UsbTransport>(&mut self, transport: &mut T, completion: IsoCompletion) {
        if !self.is_streaming() {
            trace!("isochronous completion before streaming, ignored");
            return;
        }
        // schedule the other scratch buffer before touching this one
        let Some(rearmed) = self.scratch.rearm(transport) else {
            trace!("spurious isochronous completion");
            return;
        };
        if let Err(e) = rearmed.result {
            warn!("failed to schedule isochronous receive: {}", e);
            self.stats.record_transport_error();
        }

        match completion.status {
            IsoStatus::Ok => {
                let packet = self.scratch.packet(rearmed.retired, completion.bytes_received);
                self.engine.reassemble(packet, &mut self.frames, &self.stats);
            }
            IsoStatus::Error(e) => self.engine.transport_error(e, &mut self.frames, &self.stats),
        }
    }
}
