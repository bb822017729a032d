//! Class driver interface
//!
//! The session handles everything common to any USB function (reset,
//! addressing, descriptors, configuration). Once the device is configured
//! it hands over to a class driver: first to claim the function from the
//! configuration descriptor, then to run its class-specific control
//! requests, then to consume the data stream.

use core::task::Poll;

use crate::error::Result;
use crate::transfer::{ControlChannel, IsoCompletion};
use crate::transport::{Speed, UsbTransport};

/// A USB class driver attached to a configured device
pub trait ClassDriver {
    /// What the driver reports once it is ready to stream
    type Info;

    /// Claim the function described by `config_descriptor`
    ///
    /// Called once, after the configuration descriptor has been read.
    fn init(&mut self, config_descriptor: &[u8], speed: Speed) -> Result<()>;

    /// Drive class-specific control requests
    ///
    /// Called repeatedly with the session's control channel until it
    /// returns `Ready`.
    fn handle_class_request<T: UsbTransport>(
        &mut self,
        transport: &mut T,
        channel: &mut ControlChannel,
    ) -> Poll<Result<Self::Info>>;

    /// Handle one completed data transfer
    fn background_process<T: UsbTransport>(&mut self, transport: &mut T, completion: IsoCompletion);
}
