//! Host transport boundary
//!
//! The driver never touches a host controller directly. Everything it needs
//! from the bus goes through [`UsbTransport`], which a board support layer
//! implements on top of its EHCI/OTG driver.

use crate::error::UsbError;
use crate::transfer::{ControlStatus, SetupPacket};

/// Bus speed of the attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    /// 1.5 Mbit/s
    Low,
    /// 12 Mbit/s
    Full,
    /// 480 Mbit/s
    High,
}

impl Speed {
    /// Largest isochronous packet a single transaction may carry
    pub const fn max_iso_packet(&self) -> u16 {
        match self {
            Speed::Low => 0,
            Speed::Full => 1023,
            Speed::High => 1024,
        }
    }

    /// Largest number of additional transactions per microframe
    pub const fn max_additional_transactions(&self) -> u8 {
        match self {
            Speed::High => 2,
            _ => 0,
        }
    }
}

/// USB host transport used by the capture session
///
/// Control transfers follow a submit/poll split: the driver submits one
/// request, then polls until it leaves [`ControlStatus::Pending`]. A second
/// request is never submitted while one is outstanding.
///
/// Isochronous completions are reported back by the interrupt glue calling
/// [`CaptureSession::on_isochronous_complete`](crate::CaptureSession::on_isochronous_complete).
pub trait UsbTransport {
    /// Drive a bus reset on the root port and wait for the device to settle
    fn reset_port(&mut self) -> Result<(), UsbError>;

    /// Speed the attached device came up at
    fn port_speed(&self) -> Speed;

    /// (Re)open the default control pipe towards `address`
    fn open_control_pipe(&mut self, address: u8, max_packet: u16) -> Result<(), UsbError>;

    /// Open the isochronous IN pipe used for streaming
    fn open_streaming_pipe(&mut self, address: u8, endpoint: u8, max_packet: u16) -> Result<(), UsbError>;

    /// Submit a control transfer
    ///
    /// `out_data` carries the data stage of host-to-device requests.
    fn submit_control(&mut self, setup: &SetupPacket, out_data: &[u8]) -> Result<(), UsbError>;

    /// Poll the outstanding control transfer
    ///
    /// On [`ControlStatus::Done`] the data stage of a device-to-host request
    /// has been copied into `in_data`.
    fn poll_control(&mut self, in_data: &mut [u8]) -> ControlStatus;

    /// Schedule one isochronous IN transfer into `buffer`
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writes of `len` bytes. The caller keeps the
    /// memory alive and untouched until the matching completion is reported.
    unsafe fn receive_isochronous(&mut self, buffer: *mut u8, len: usize) -> Result<(), UsbError>;

    /// Drop the scheduled isochronous receive, if any
    ///
    /// After this returns the transport must not write to the buffer passed
    /// to [`receive_isochronous`](Self::receive_isochronous) again, and no
    /// completion is reported for it.
    fn cancel_isochronous(&mut self);

    /// Called while a blocking operation waits on a pending transfer
    ///
    /// Implementations typically sleep until the next USB interrupt.
    fn wait_for_event(&mut self) {}
}

#[cfg(test)]
pub(crate) mod mock;
