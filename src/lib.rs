#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! USB Video Class host capture driver
//!
//! Finds a UVC camera on a USB host port, negotiates a streaming format
//! with it, and reassembles its isochronous payload packets into complete
//! frames handed to the application through a two-buffer queue.
//!
//! The crate does not drive a host controller. A board support layer
//! implements [`UsbTransport`] on top of its EHCI/OTG driver and forwards
//! isochronous completions from its interrupt handler to
//! [`CaptureSession::on_isochronous_complete`].
//!
//! # Core Components
//!
//! - [`session`] - capture session: enumeration, configuration, negotiation, streaming
//! - [`enumeration`] - standard enumeration state machine
//! - [`descriptor`] - descriptor model and configuration parser
//! - [`uvc`] - format selection, probe/commit, payload reassembly, frame queue
//! - [`transfer`] - setup packets, control channel, isochronous ping-pong
//! - [`transport`] - host transport boundary
//! - [`error`] - transfer and session errors

#[cfg(feature = "defmt")]
use defmt as _;

#[macro_use]
mod fmt;

pub mod class;
pub mod config;
pub mod descriptor;
pub mod enumeration;
pub mod error;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod uvc;

pub use class::ClassDriver;
pub use config::StreamConfig;
pub use descriptor::PayloadKind;
pub use enumeration::{DeviceStrings, EnumerationState};
pub use error::{Result, UsbError, UvcError};
pub use session::{CaptureSession, SessionState};
pub use transfer::{ControlStatus, IsoCompletion, IsoStatus, ScratchBuffers, SetupPacket, StreamStats};
pub use transport::{Speed, UsbTransport};
pub use uvc::{AlreadyFull, CaptureInfo, DeviceInfo, FrameQueue, FrameSink, FrameSupply, NotReady, UvcClass};
