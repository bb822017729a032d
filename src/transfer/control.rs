//! Control transfer channel
//!
//! Keeps exactly one control request outstanding. State machines call
//! [`ControlChannel::request`] with the same request on every step until it
//! returns `Ready`; the request is submitted only on the first call.

use core::task::Poll;

use crate::error::UsbError;
use crate::transfer::{ControlStatus, SetupPacket};
use crate::transport::UsbTransport;

/// One-outstanding-request wrapper around the transport control pipe
#[derive(Debug, Default)]
pub struct ControlChannel {
    in_flight: Option<SetupPacket>,
    submitted: u32,
}

impl ControlChannel {
    /// Create an idle channel
    pub const fn new() -> Self {
        Self {
            in_flight: None,
            submitted: 0,
        }
    }

    /// Submit `setup` if nothing is in flight, then poll it once
    ///
    /// Returns the number of data-stage bytes on completion. A STALL maps to
    /// [`UsbError::Stall`].
    pub fn request<T: UsbTransport>(
        &mut self,
        transport: &mut T,
        setup: &SetupPacket,
        out_data: &[u8],
        in_data: &mut [u8],
    ) -> Poll<Result<usize, UsbError>> {
        match self.in_flight {
            Some(pending) if pending != *setup => {
                // a state machine changed its mind mid-transfer; keep waiting
                // for the old request rather than issuing a second one
                warn!("control request changed while in flight");
            }
            Some(_) => {}
            None => {
                if let Err(e) = transport.submit_control(setup, out_data) {
                    return Poll::Ready(Err(e));
                }
                self.in_flight = Some(*setup);
                self.submitted = self.submitted.wrapping_add(1);
                trace!(
                    "control submit: type={:#04x} req={:#04x} value={:#06x} index={} len={}",
                    setup.request_type,
                    setup.request,
                    setup.value,
                    setup.index,
                    setup.length
                );
            }
        }

        let result = match transport.poll_control(in_data) {
            ControlStatus::Pending => return Poll::Pending,
            ControlStatus::Done(len) => Ok(len),
            ControlStatus::Stalled => Err(UsbError::Stall),
            ControlStatus::Failed(e) => Err(e),
        };
        self.in_flight = None;
        Poll::Ready(result)
    }

    /// Whether a request is outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Forget any outstanding request (pipes were re-opened)
    pub fn reset(&mut self) {
        self.in_flight = None;
    }

    /// Total requests submitted through this channel
    pub fn submitted(&self) -> u32 {
        self.submitted
    }
}
