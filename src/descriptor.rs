//! USB descriptor model
//!
//! Typed views over raw descriptor bytes. Fields are extracted explicitly
//! as little-endian values; nothing here overlays structs on the buffer.

use heapless::String;

use crate::config::MAX_STRING_LEN;
use crate::transport::Speed;

pub mod parser;
pub mod video;

pub use parser::{
    find_video_association, gather_interfaces, parse_configuration, AltSetting, InterfaceRecord,
    InterfaceTable, VideoFunction,
};
pub use video::{FormatDescriptor, FormatKind, FrameDescriptor, FrameIntervals, PayloadKind, UvcVersion};

/// Standard descriptor type codes
pub mod kind {
    /// Device descriptor
    pub const DEVICE: u8 = 0x01;
    /// Configuration descriptor
    pub const CONFIGURATION: u8 = 0x02;
    /// String descriptor
    pub const STRING: u8 = 0x03;
    /// Interface descriptor
    pub const INTERFACE: u8 = 0x04;
    /// Endpoint descriptor
    pub const ENDPOINT: u8 = 0x05;
    /// Interface Association descriptor
    pub const INTERFACE_ASSOCIATION: u8 = 0x0B;
    /// Class-specific interface descriptor
    pub const CS_INTERFACE: u8 = 0x24;
    /// Class-specific endpoint descriptor
    pub const CS_ENDPOINT: u8 = 0x25;
}

/// Video class codes
pub mod class {
    /// `bInterfaceClass` of video interfaces
    pub const VIDEO: u8 = 0x0E;
    /// VideoControl subclass
    pub const SUBCLASS_VIDEO_CONTROL: u8 = 0x01;
    /// VideoStreaming subclass
    pub const SUBCLASS_VIDEO_STREAMING: u8 = 0x02;
    /// Video interface collection (IAD function subclass)
    pub const SUBCLASS_INTERFACE_COLLECTION: u8 = 0x03;
}

/// Placeholder stored for strings the device does not provide
pub const STRING_PLACEHOLDER: &str = "N/A";

/// Fixed-capacity string decoded from a string descriptor
pub type DescriptorString = String<MAX_STRING_LEN>;

pub(crate) fn le16(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn le32(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// One descriptor as found in a configuration blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDescriptor<'a> {
    /// `bDescriptorType`
    pub kind: u8,
    /// The whole descriptor, `bLength` bytes including the header
    pub bytes: &'a [u8],
}

impl<'a> RawDescriptor<'a> {
    /// `bDescriptorSubtype` of class-specific descriptors
    pub fn subtype(&self) -> Option<u8> {
        self.bytes.get(2).copied()
    }
}

/// Walks the descriptors of a configuration blob
///
/// The walk stops at the end of the slice, at a descriptor shorter than its
/// own header, or at one that claims to run past the end.
#[derive(Debug, Clone)]
pub struct DescriptorIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> DescriptorIter<'a> {
    /// Iterate over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Iterate over a configuration blob, bounded by its own `wTotalLength`
    pub fn configuration(data: &'a [u8]) -> Self {
        let bound = configuration_bound(data);
        Self::new(&data[..bound])
    }

    /// Byte offset of the next descriptor
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = RawDescriptor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.data.get(self.offset..)?;
        if rest.len() < 2 {
            return None;
        }
        let len = rest[0] as usize;
        if len < 2 || len > rest.len() {
            warn!(
                "descriptor walk stopped at offset {}: bLength={} remaining={}",
                self.offset,
                len,
                rest.len()
            );
            self.offset = self.data.len();
            return None;
        }
        self.offset += len;
        Some(RawDescriptor {
            kind: rest[1],
            bytes: &rest[..len],
        })
    }
}

/// Number of bytes of `data` a configuration walk may cover
///
/// `min(wTotalLength, data.len())`, or the whole slice when the header is
/// not a configuration descriptor.
pub fn configuration_bound(data: &[u8]) -> usize {
    match ConfigurationHeader::parse(data) {
        Some(header) => (header.total_length as usize).min(data.len()),
        None => data.len(),
    }
}

/// USB device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceDescriptor {
    /// `bcdUSB`
    pub bcd_usb: u16,
    /// `bDeviceClass`
    pub device_class: u8,
    /// `bDeviceSubClass`
    pub device_sub_class: u8,
    /// `bDeviceProtocol`
    pub device_protocol: u8,
    /// `bMaxPacketSize0`
    pub max_packet_size0: u8,
    /// `idVendor`
    pub vendor_id: u16,
    /// `idProduct`
    pub product_id: u16,
    /// `bcdDevice`
    pub bcd_device: u16,
    /// `iManufacturer`
    pub manufacturer_index: u8,
    /// `iProduct`
    pub product_index: u8,
    /// `iSerialNumber`
    pub serial_index: u8,
    /// `bNumConfigurations`
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Length of a full device descriptor
    pub const LEN: usize = 18;

    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN || data[1] != kind::DEVICE {
            return None;
        }
        Some(Self {
            bcd_usb: le16(data, 2)?,
            device_class: data[4],
            device_sub_class: data[5],
            device_protocol: data[6],
            max_packet_size0: data[7],
            vendor_id: le16(data, 8)?,
            product_id: le16(data, 10)?,
            bcd_device: le16(data, 12)?,
            manufacturer_index: data[14],
            product_index: data[15],
            serial_index: data[16],
            num_configurations: data[17],
        })
    }

    /// `bMaxPacketSize0` out of the first 8 bytes of a device descriptor
    pub fn partial_max_packet_size(data: &[u8]) -> Option<u8> {
        if data.len() < 8 || data[1] != kind::DEVICE {
            return None;
        }
        match data[7] {
            8 | 16 | 32 | 64 => Some(data[7]),
            _ => None,
        }
    }
}

/// Configuration descriptor header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigurationHeader {
    /// `wTotalLength`
    pub total_length: u16,
    /// `bNumInterfaces`
    pub num_interfaces: u8,
    /// `bConfigurationValue`
    pub configuration_value: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// `bMaxPower` (2 mA units)
    pub max_power: u8,
}

impl ConfigurationHeader {
    /// Length of the header
    pub const LEN: usize = 9;

    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN || data[1] != kind::CONFIGURATION {
            return None;
        }
        Some(Self {
            total_length: le16(data, 2)?,
            num_interfaces: data[4],
            configuration_value: data[5],
            attributes: data[7],
            max_power: data[8],
        })
    }
}

/// Interface Association Descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAssociation {
    /// `bFirstInterface`
    pub first_interface: u8,
    /// `bInterfaceCount`
    pub interface_count: u8,
    /// `bFunctionClass`
    pub function_class: u8,
    /// `bFunctionSubClass`
    pub function_sub_class: u8,
}

impl InterfaceAssociation {
    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 8 || data[1] != kind::INTERFACE_ASSOCIATION {
            return None;
        }
        Some(Self {
            first_interface: data[2],
            interface_count: data[3],
            function_class: data[4],
            function_sub_class: data[5],
        })
    }

    /// Video Interface Collection association
    pub fn is_video(&self) -> bool {
        self.function_class == class::VIDEO
            && self.function_sub_class == class::SUBCLASS_INTERFACE_COLLECTION
    }
}

/// Interface descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// `bInterfaceNumber`
    pub interface_number: u8,
    /// `bAlternateSetting`
    pub alternate_setting: u8,
    /// `bNumEndpoints`
    pub num_endpoints: u8,
    /// `bInterfaceClass`
    pub interface_class: u8,
    /// `bInterfaceSubClass`
    pub interface_sub_class: u8,
    /// `bInterfaceProtocol`
    pub interface_protocol: u8,
}

impl InterfaceDescriptor {
    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 9 || data[1] != kind::INTERFACE {
            return None;
        }
        Some(Self {
            interface_number: data[2],
            alternate_setting: data[3],
            num_endpoints: data[4],
            interface_class: data[5],
            interface_sub_class: data[6],
            interface_protocol: data[7],
        })
    }

    /// VideoControl interface
    pub fn is_video_control(&self) -> bool {
        self.interface_class == class::VIDEO && self.interface_sub_class == class::SUBCLASS_VIDEO_CONTROL
    }

    /// VideoStreaming interface
    pub fn is_video_streaming(&self) -> bool {
        self.interface_class == class::VIDEO
            && self.interface_sub_class == class::SUBCLASS_VIDEO_STREAMING
    }

    /// Interface of the Video class (control or streaming)
    pub fn is_video(&self) -> bool {
        self.interface_class == class::VIDEO
    }
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Reason an endpoint descriptor was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointFault {
    /// `wMaxPacketSize` is zero
    ZeroPacketSize,
    /// Packet size or transactions per microframe above the speed maximum
    PacketTooLarge,
    /// `bInterval` outside the range allowed at this speed
    IntervalOutOfRange,
    /// Transfer type not allowed at this speed
    UnsupportedAtSpeed,
}

/// Endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointDescriptor {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Endpoint attributes (transfer type in bits 1..0)
    pub attributes: u8,
    /// Raw `wMaxPacketSize`, including the transaction bits
    pub max_packet_size: u16,
    /// Polling interval
    pub interval: u8,
}

impl EndpointDescriptor {
    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 || data[1] != kind::ENDPOINT {
            return None;
        }
        Some(Self {
            address: data[2],
            attributes: data[3],
            max_packet_size: le16(data, 4)?,
            interval: data[6],
        })
    }

    /// Get endpoint number (0-15)
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    /// Check if this is an IN endpoint
    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }

    /// Get transfer type
    pub fn transfer_type(&self) -> TransferType {
        match self.attributes & 0x03 {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }

    /// Bytes one transaction carries
    pub fn transaction_bytes(&self) -> u16 {
        self.max_packet_size & 0x07FF
    }

    /// Bytes a whole microframe may deliver (transactions included)
    pub fn packet_bytes(&self) -> usize {
        crate::transfer::isochronous::MicroframeTiming::from_max_packet(self.max_packet_size).packet_bytes()
    }

    /// Check the descriptor against what the bus speed allows
    pub fn validate(&self, speed: Speed) -> Result<(), EndpointFault> {
        let bytes = self.transaction_bytes();
        if bytes == 0 {
            return Err(EndpointFault::ZeroPacketSize);
        }
        let additional = ((self.max_packet_size >> 11) & 0x03) as u8;

        match self.transfer_type() {
            TransferType::Isochronous => {
                if speed == Speed::Low {
                    return Err(EndpointFault::UnsupportedAtSpeed);
                }
                if bytes > speed.max_iso_packet() || additional > speed.max_additional_transactions() {
                    return Err(EndpointFault::PacketTooLarge);
                }
                if !(1..=16).contains(&self.interval) {
                    return Err(EndpointFault::IntervalOutOfRange);
                }
            }
            TransferType::Interrupt => {
                let limit = match speed {
                    Speed::Low => 8,
                    Speed::Full => 64,
                    Speed::High => 1024,
                };
                if bytes > limit || additional > speed.max_additional_transactions() {
                    return Err(EndpointFault::PacketTooLarge);
                }
                let interval_ok = match speed {
                    Speed::High => (1..=16).contains(&self.interval),
                    _ => self.interval >= 1,
                };
                if !interval_ok {
                    return Err(EndpointFault::IntervalOutOfRange);
                }
            }
            TransferType::Bulk | TransferType::Control => {
                let limit = if speed == Speed::High { 512 } else { 64 };
                if bytes > limit {
                    return Err(EndpointFault::PacketTooLarge);
                }
            }
        }
        Ok(())
    }
}

/// Decode a string descriptor (UTF-16LE) into a fixed-capacity string
///
/// Characters outside ASCII become `?`; the result is truncated to the
/// string capacity.
pub fn decode_string(data: &[u8]) -> Option<DescriptorString> {
    if data.len() < 2 || data[1] != kind::STRING {
        return None;
    }
    let len = (data[0] as usize).min(data.len());
    let mut out = DescriptorString::new();
    for unit in data.get(2..len)?.chunks_exact(2) {
        let code = u16::from_le_bytes([unit[0], unit[1]]);
        let ch = match code {
            0x20..=0x7E => code as u8 as char,
            _ => '?',
        };
        if out.push(ch).is_err() {
            break;
        }
    }
    Some(out)
}

/// Placeholder string for absent or rejected string descriptors
pub fn placeholder_string() -> DescriptorString {
    let mut s = DescriptorString::new();
    // capacity is well above the placeholder length
    let _ = s.push_str(STRING_PLACEHOLDER);
    s
}
