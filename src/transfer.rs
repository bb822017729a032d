//! USB transfer primitives
//!
//! Setup packets for the standard and UVC class requests, control transfer
//! status, and the isochronous receive path.

use crate::error::UsbError;

pub mod control;
pub mod isochronous;

pub use control::ControlChannel;
pub use isochronous::{IsoCompletion, IsoStatus, PacketScratch, ScratchBuffers, StreamStats};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    In,
    Out,
}

/// Standard request codes
pub mod request {
    /// GET_DESCRIPTOR
    pub const GET_DESCRIPTOR: u8 = 0x06;
    /// SET_ADDRESS
    pub const SET_ADDRESS: u8 = 0x05;
    /// SET_CONFIGURATION
    pub const SET_CONFIGURATION: u8 = 0x09;
    /// SET_INTERFACE
    pub const SET_INTERFACE: u8 = 0x0B;

    /// UVC SET_CUR
    pub const UVC_SET_CUR: u8 = 0x01;
    /// UVC GET_CUR
    pub const UVC_GET_CUR: u8 = 0x81;
}

/// VideoStreaming interface control selectors
pub mod vs_control {
    /// VS_PROBE_CONTROL
    pub const PROBE: u8 = 0x01;
    /// VS_COMMIT_CONTROL
    pub const COMMIT: u8 = 0x02;
}

/// Descriptor type codes used in GET_DESCRIPTOR
pub mod descriptor_type {
    /// DEVICE
    pub const DEVICE: u8 = 0x01;
    /// CONFIGURATION
    pub const CONFIGURATION: u8 = 0x02;
    /// STRING
    pub const STRING: u8 = 0x03;
}

/// LANGID used for string descriptor requests (US English)
pub const LANGID_EN_US: u16 = 0x0409;

/// USB Setup packet for control transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    /// `bmRequestType`
    pub request_type: u8,
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`
    pub length: u16,
}

impl SetupPacket {
    /// Create GET_DESCRIPTOR request
    pub const fn get_descriptor(desc_type: u8, desc_index: u8, language_id: u16, length: u16) -> Self {
        Self {
            request_type: 0x80, // Device-to-host, standard, device
            request: request::GET_DESCRIPTOR,
            value: ((desc_type as u16) << 8) | (desc_index as u16),
            index: language_id,
            length,
        }
    }

    /// Create SET_ADDRESS request
    pub const fn set_address(address: u8) -> Self {
        Self {
            request_type: 0x00, // Host-to-device, standard, device
            request: request::SET_ADDRESS,
            value: address as u16,
            index: 0,
            length: 0,
        }
    }

    /// Create SET_CONFIGURATION request
    pub const fn set_configuration(configuration: u8) -> Self {
        Self {
            request_type: 0x00,
            request: request::SET_CONFIGURATION,
            value: configuration as u16,
            index: 0,
            length: 0,
        }
    }

    /// Create SET_INTERFACE request
    pub const fn set_interface(interface: u8, alternate: u8) -> Self {
        Self {
            request_type: 0x01, // Host-to-device, standard, interface
            request: request::SET_INTERFACE,
            value: alternate as u16,
            index: interface as u16,
            length: 0,
        }
    }

    /// Create a UVC SET_CUR on a VideoStreaming control
    pub const fn uvc_set_cur(selector: u8, interface: u8, length: u16) -> Self {
        Self {
            request_type: 0x21, // Host-to-device, class, interface
            request: request::UVC_SET_CUR,
            value: (selector as u16) << 8,
            index: interface as u16,
            length,
        }
    }

    /// Create a UVC GET_CUR on a VideoStreaming control
    pub const fn uvc_get_cur(selector: u8, interface: u8, length: u16) -> Self {
        Self {
            request_type: 0xA1, // Device-to-host, class, interface
            request: request::UVC_GET_CUR,
            value: (selector as u16) << 8,
            index: interface as u16,
            length,
        }
    }

    /// Check if this is an IN transfer
    pub fn is_in(&self) -> bool {
        (self.request_type & 0x80) != 0
    }

    /// Direction of the data stage
    pub fn direction(&self) -> Direction {
        if self.is_in() {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Wire representation (little-endian)
    pub fn to_bytes(&self) -> [u8; 8] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }
}

/// Result of polling an outstanding control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlStatus {
    /// Transfer still in flight
    Pending,
    /// Transfer complete, data stage moved this many bytes
    Done(usize),
    /// Device answered with STALL
    Stalled,
    /// Transfer failed for another reason
    Failed(UsbError),
}
