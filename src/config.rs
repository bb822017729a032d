//! Driver configuration
//!
//! Table capacities are compile-time constants so every parse is bounded
//! and nothing is allocated. The stream request itself is a
//! [`StreamConfig`], built the same way as a device filter.

use crate::descriptor::PayloadKind;
use crate::error::{Result, UvcError};

/// Video interfaces kept from one association
pub const MAX_INTERFACES: usize = 4;
/// Alternate settings kept per interface
pub const MAX_ALT_SETTINGS: usize = 8;
/// Endpoints kept per alternate setting
pub const MAX_ENDPOINTS: usize = 2;
/// Formats kept per streaming interface
pub const MAX_FORMATS: usize = 4;
/// Frame descriptors kept per format
pub const MAX_FRAMES: usize = 10;
/// Discrete frame intervals kept per frame descriptor
pub const MAX_FRAME_INTERVALS: usize = 8;
/// Characters kept from a string descriptor
pub const MAX_STRING_LEN: usize = 64;
/// Bytes of configuration descriptor fetched and parsed
pub const MAX_CONFIG_DESCRIPTOR_SIZE: usize = 2048;
/// Enumeration restarts before the session aborts
pub const MAX_ENUM_RETRIES: u8 = 3;
/// Default isochronous scratch buffer size (high-bandwidth high speed)
pub const DEFAULT_PACKET_SIZE: usize = 3072;
/// Control pipe packet size used before the device descriptor is known
pub const DEFAULT_EP0_MAX_PACKET: u16 = 8;
/// Address assigned to the camera
pub const DEVICE_ADDRESS: u8 = 1;

/// Frame interval unit: 100 ns
pub const INTERVAL_UNITS_PER_SECOND: u32 = 10_000_000;

/// Requested stream parameters
///
/// # Example
///
/// ```
/// use usbh_uvc::config::StreamConfig;
/// use usbh_uvc::descriptor::PayloadKind;
///
/// let config = StreamConfig::new(640, 480)
///     .payload(PayloadKind::Yuy2)
///     .frames_per_second(30);
/// assert_eq!(config.frame_interval, 333_333);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Frame interval in 100 ns units; 0 selects the frame's default
    pub frame_interval: u32,
    /// Payload format
    pub payload: PayloadKind,
}

impl StreamConfig {
    /// MJPEG at the device's default frame interval
    pub const fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            frame_interval: 0,
            payload: PayloadKind::Mjpeg,
        }
    }

    /// Select the payload format
    pub const fn payload(mut self, payload: PayloadKind) -> Self {
        self.payload = payload;
        self
    }

    /// Frame interval in 100 ns units
    pub const fn frame_interval(mut self, interval: u32) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Frame interval from a frame rate
    pub const fn frames_per_second(mut self, fps: u32) -> Self {
        self.frame_interval = if fps == 0 {
            0
        } else {
            INTERVAL_UNITS_PER_SECOND / fps
        };
        self
    }

    /// Reject requests no device could satisfy
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(UvcError::InvalidParameter);
        }
        Ok(())
    }
}
