//! Capture session
//!
//! One [`CaptureSession`] drives one attached camera from reset to
//! streaming. It owns the transport, the control channel and the class
//! driver, so several sessions can coexist on different host ports.
//!
//! Frames leave the session through a [`FrameQueue`](crate::FrameQueue)
//! split in two: the session keeps the capture half and runs in the USB
//! interrupt, the application keeps the [`FrameSupply`] half and pushes
//! and pops buffers without locking the session.
//!
//! # Example
//!
//! ```no_run
//! use usbh_uvc::{CaptureSession, FrameQueue, ScratchBuffers, StreamConfig, UsbTransport, UvcError};
//!
//! type Frame = [u8; 65536];
//!
//! fn capture<T: UsbTransport>(
//!     transport: T,
//!     scratch: &'static mut ScratchBuffers<3072>,
//!     frames: &'static mut FrameQueue<Frame>,
//! ) -> Result<(), UvcError> {
//!     let (mut supply, sink) = frames.split();
//!     let mut session: CaptureSession<'_, T, Frame> =
//!         CaptureSession::init(transport, StreamConfig::new(320, 240), scratch, sink)?;
//!     let _info = session.setup_device()?;
//!     // hand `session` to the USB interrupt, which calls
//!     // session.on_isochronous_complete(..)
//!
//!     supply.push_buffer([0; 65536]).ok();
//!     supply.push_buffer([0; 65536]).ok();
//!     loop {
//!         if let Ok(frame) = supply.pop_buffer() {
//!             let _jpeg = frame.frame();
//!             supply.push_buffer(frame.into_buffer()).ok();
//!         }
//!     }
//! }
//! ```

use core::task::{ready, Poll};

use crate::class::ClassDriver;
use crate::config::{StreamConfig, DEFAULT_PACKET_SIZE};
use crate::enumeration::{DeviceStrings, Enumeration};
use crate::error::{Result, UvcError};
use crate::transfer::{ControlChannel, IsoCompletion, ScratchBuffers, SetupPacket, StreamStats};
use crate::transport::UsbTransport;
use crate::uvc::{AlreadyFull, CaptureInfo, DeviceInfo, FrameSink, FrameSupply, NotReady, UvcClass};

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Enumeration state machine running
    Enumerating,
    /// SET_CONFIGURATION in flight
    Configuring,
    /// Probe/commit running
    Negotiating,
    /// Isochronous receives scheduled
    Streaming,
    /// Terminal failure
    Failed(UvcError),
}

/// Capture session for one camera
///
/// `B` is the frame buffer type, `N` the isochronous scratch size.
///
/// The session may be moved freely, also while streaming: the isochronous
/// scratch buffers are `'static` and never move with it.
pub struct CaptureSession<'a, T, B, const N: usize = DEFAULT_PACKET_SIZE> {
    transport: T,
    channel: ControlChannel,
    enumeration: Enumeration,
    class: UvcClass<'a, B, N>,
    state: SessionState,
}

impl<'a, T: UsbTransport, B: AsMut<[u8]>, const N: usize> CaptureSession<'a, T, B, N> {
    /// Create a session for `config` on top of `transport`
    ///
    /// `scratch` receives isochronous packets; `frames` is the capture half
    /// of the frame queue whose other half the application keeps.
    ///
    /// Nothing is sent on the bus until [`setup_device`](Self::setup_device)
    /// or [`process`](Self::process) is called.
    pub fn init(
        transport: T,
        config: StreamConfig,
        scratch: &'static mut ScratchBuffers<N>,
        frames: FrameSink<'a, B>,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            "capture session: {}x{} {:?} interval {}",
            config.width,
            config.height,
            config.payload,
            config.frame_interval
        );
        Ok(Self {
            transport,
            channel: ControlChannel::new(),
            enumeration: Enumeration::new(),
            class: UvcClass::new(config, scratch, frames),
            state: SessionState::Enumerating,
        })
    }

    fn fail(&mut self, error: UvcError) -> Poll<Result<DeviceInfo>> {
        error!("capture session failed: {}", error);
        self.state = SessionState::Failed(error);
        Poll::Ready(Err(error))
    }

    /// Advance setup by one step
    ///
    /// Returns `Ready(Ok(info))` once streaming has started, and the terminal
    /// error if setup failed.
    pub fn process(&mut self) -> Poll<Result<DeviceInfo>> {
        match self.state {
            SessionState::Enumerating => match ready!(self.enumeration.poll(&mut self.transport, &mut self.channel)) {
                Ok(()) => {
                    self.state = SessionState::Configuring;
                    Poll::Pending
                }
                Err(e) => self.fail(e),
            },
            SessionState::Configuring => {
                let Some(header) = self.enumeration.configuration_header().copied() else {
                    return self.fail(UvcError::InvalidState);
                };
                let setup = SetupPacket::set_configuration(header.configuration_value);
                if let Err(e) = ready!(self.channel.request(&mut self.transport, &setup, &[], &mut [])) {
                    return self.fail(UvcError::Transport(e));
                }
                info!("configuration {} selected", header.configuration_value);

                let speed = self.transport.port_speed();
                if let Err(e) = self.class.init(self.enumeration.configuration(), speed) {
                    return self.fail(e);
                }
                self.state = SessionState::Negotiating;
                Poll::Pending
            }
            SessionState::Negotiating => {
                match ready!(self.class.handle_class_request(&mut self.transport, &mut self.channel)) {
                    Ok(info) => {
                        self.state = SessionState::Streaming;
                        Poll::Ready(Ok(info))
                    }
                    Err(e) => self.fail(e),
                }
            }
            SessionState::Streaming => Poll::Ready(self.class.device_info().ok_or(UvcError::InvalidState)),
            SessionState::Failed(e) => Poll::Ready(Err(e)),
        }
    }

    /// Run setup to completion
    ///
    /// Parks in [`UsbTransport::wait_for_event`] whenever a control transfer
    /// is outstanding.
    pub fn setup_device(&mut self) -> Result<DeviceInfo> {
        loop {
            if let Poll::Ready(result) = self.process() {
                return result;
            }
            if self.channel.is_busy() {
                self.transport.wait_for_event();
            }
        }
    }

    /// Report a completed isochronous receive
    ///
    /// Called from the transfer-complete interrupt.
    pub fn on_isochronous_complete(&mut self, completion: IsoCompletion) {
        if self.state != SessionState::Streaming {
            trace!("isochronous completion in {:?}, ignored", self.state);
            return;
        }
        self.class.background_process(&mut self.transport, completion);
    }

    /// Negotiated configuration, once streaming
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.class.device_info()
    }

    /// Identification strings read during enumeration
    pub fn strings(&self) -> &DeviceStrings {
        self.enumeration.strings()
    }

    /// Streaming statistics
    pub fn stats(&self) -> &StreamStats {
        self.class.stats()
    }

    /// Session phase
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Enumeration state machine
    pub fn enumeration(&self) -> &Enumeration {
        &self.enumeration
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// End the session
    ///
    /// Cancels the outstanding isochronous receive, then hands back the
    /// transport and the scratch storage.
    pub fn release(self) -> (T, &'static mut ScratchBuffers<N>) {
        let Self { mut transport, class, .. } = self;
        let scratch = class.release(&mut transport);
        info!("capture session released");
        (transport, scratch)
    }
}

/// Consumer side of a capture session
///
/// Both calls only touch the frame rings, never the session, so they are
/// safe to make while the interrupt handler owns the session.
impl<'a, B> FrameSupply<'a, B> {
    /// Hand an empty frame buffer to the driver
    pub fn push_buffer(&mut self, buffer: B) -> core::result::Result<(), AlreadyFull<B>> {
        self.push(buffer)
    }

    /// Take the next completed frame
    pub fn pop_buffer(&mut self) -> core::result::Result<CaptureInfo<B>, NotReady> {
        self.pop()
    }
}
