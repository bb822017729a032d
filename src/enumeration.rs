//! USB device enumeration
//!
//! Brings a freshly attached device from the default address to a known
//! configuration descriptor: reset, device descriptor (partial then full),
//! address assignment, configuration descriptor (header then full), and the
//! three identification strings. Each state issues one control transfer and
//! stays put while it is pending.
//!
//! A failed transfer restarts the whole sequence from [`EnumerationState::Idle`]
//! with freshly opened control pipes, up to [`MAX_ENUM_RETRIES`] times.
//! String requests never fail enumeration; a missing or rejected string is
//! stored as `"N/A"`.

use core::task::{ready, Poll};

use crate::config::{DEFAULT_EP0_MAX_PACKET, DEVICE_ADDRESS, MAX_CONFIG_DESCRIPTOR_SIZE, MAX_ENUM_RETRIES};
use crate::descriptor::{
    decode_string, placeholder_string, ConfigurationHeader, DescriptorString, DeviceDescriptor,
};
use crate::error::{Result, UsbError, UvcError};
use crate::transfer::{descriptor_type, ControlChannel, SetupPacket, LANGID_EN_US};
use crate::transport::UsbTransport;

/// Enumeration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnumerationState {
    /// Reset the port, open the default pipe
    Idle,
    /// First 8 bytes of the device descriptor
    GetPartialDeviceDescriptor,
    /// Full device descriptor
    GetFullDeviceDescriptor,
    /// Assign the device address
    SetAddress,
    /// Configuration descriptor header
    GetConfigDescriptor,
    /// Configuration descriptor with all interfaces
    GetFullConfigDescriptor,
    /// Manufacturer string
    GetManufacturerString,
    /// Product string
    GetProductString,
    /// Serial number string
    GetSerialString,
    /// Enumeration complete
    Done,
    /// Retries exhausted
    Abort,
}

/// Identification strings read during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStrings {
    /// `iManufacturer` string
    pub manufacturer: DescriptorString,
    /// `iProduct` string
    pub product: DescriptorString,
    /// `iSerialNumber` string
    pub serial: DescriptorString,
}

impl Default for DeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: placeholder_string(),
            product: placeholder_string(),
            serial: placeholder_string(),
        }
    }
}

/// Length of the partial device descriptor read at address 0
const PARTIAL_DEVICE_DESCRIPTOR_LEN: usize = 8;
/// Largest string descriptor
const MAX_STRING_DESCRIPTOR_LEN: usize = 255;

/// Enumeration state machine
pub struct Enumeration {
    state: EnumerationState,
    retries: u8,
    ep0_max_packet: u16,
    device: Option<DeviceDescriptor>,
    config_header: Option<ConfigurationHeader>,
    config: [u8; MAX_CONFIG_DESCRIPTOR_SIZE],
    config_len: usize,
    strings: DeviceStrings,
    scratch: [u8; MAX_STRING_DESCRIPTOR_LEN],
}

impl Enumeration {
    /// Machine waiting in `Idle`
    pub fn new() -> Self {
        Self {
            state: EnumerationState::Idle,
            retries: 0,
            ep0_max_packet: DEFAULT_EP0_MAX_PACKET,
            device: None,
            config_header: None,
            config: [0; MAX_CONFIG_DESCRIPTOR_SIZE],
            config_len: 0,
            strings: DeviceStrings::default(),
            scratch: [0; MAX_STRING_DESCRIPTOR_LEN],
        }
    }

    /// Current state
    pub fn state(&self) -> EnumerationState {
        self.state
    }

    /// Restarts spent so far
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Device descriptor, once read
    pub fn device_descriptor(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Configuration descriptor header, once read
    pub fn configuration_header(&self) -> Option<&ConfigurationHeader> {
        self.config_header.as_ref()
    }

    /// Configuration descriptor bytes received
    pub fn configuration(&self) -> &[u8] {
        &self.config[..self.config_len]
    }

    /// Identification strings
    pub fn strings(&self) -> &DeviceStrings {
        &self.strings
    }

    /// `bMaxPacketSize0` in use on the control pipe
    pub fn ep0_max_packet(&self) -> u16 {
        self.ep0_max_packet
    }

    fn advance(&mut self, next: EnumerationState) {
        debug!("enumeration: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Restart from `Idle`, or abort when the retry budget is spent
    fn fail(&mut self, error: UsbError) -> Poll<Result<()>> {
        if !error.is_retryable() || self.retries >= MAX_ENUM_RETRIES {
            error!(
                "enumeration aborted in {:?}: {} after {} retries",
                self.state,
                error,
                self.retries
            );
            self.state = EnumerationState::Abort;
            return Poll::Ready(Err(UvcError::EnumerationFailed));
        }
        self.retries += 1;
        warn!(
            "enumeration failed in {:?}: {}, retry {}/{}",
            self.state,
            error,
            self.retries,
            MAX_ENUM_RETRIES
        );
        self.state = EnumerationState::Idle;
        Poll::Pending
    }

    /// Advance by at most one control transfer
    ///
    /// Returns `Ready(Ok(()))` in `Done` and `Ready(Err(EnumerationFailed))`
    /// in `Abort`.
    pub fn poll<T: UsbTransport>(&mut self, transport: &mut T, channel: &mut ControlChannel) -> Poll<Result<()>> {
        match self.state {
            EnumerationState::Done => Poll::Ready(Ok(())),
            EnumerationState::Abort => Poll::Ready(Err(UvcError::EnumerationFailed)),
            EnumerationState::Idle => {
                channel.reset();
                self.ep0_max_packet = DEFAULT_EP0_MAX_PACKET;
                self.device = None;
                self.config_header = None;
                self.config_len = 0;
                self.strings = DeviceStrings::default();
                if let Err(e) = transport.reset_port() {
                    return self.fail(e);
                }
                if let Err(e) = transport.open_control_pipe(0, DEFAULT_EP0_MAX_PACKET) {
                    return self.fail(e);
                }
                info!("device attached at {:?} speed", transport.port_speed());
                self.advance(EnumerationState::GetPartialDeviceDescriptor);
                Poll::Pending
            }
            EnumerationState::GetPartialDeviceDescriptor => {
                let setup = SetupPacket::get_descriptor(
                    descriptor_type::DEVICE,
                    0,
                    0,
                    PARTIAL_DEVICE_DESCRIPTOR_LEN as u16,
                );
                let buf = &mut self.scratch[..PARTIAL_DEVICE_DESCRIPTOR_LEN];
                let received = match ready!(channel.request(transport, &setup, &[], buf)) {
                    Ok(received) => received,
                    Err(e) => return self.fail(e),
                };
                let Some(max_packet) = DeviceDescriptor::partial_max_packet_size(&self.scratch[..received]) else {
                    return self.fail(UsbError::InvalidDescriptor);
                };
                self.ep0_max_packet = max_packet as u16;
                if let Err(e) = transport.open_control_pipe(0, self.ep0_max_packet) {
                    return self.fail(e);
                }
                self.advance(EnumerationState::GetFullDeviceDescriptor);
                Poll::Pending
            }
            EnumerationState::GetFullDeviceDescriptor => {
                let setup =
                    SetupPacket::get_descriptor(descriptor_type::DEVICE, 0, 0, DeviceDescriptor::LEN as u16);
                let buf = &mut self.scratch[..DeviceDescriptor::LEN];
                let received = match ready!(channel.request(transport, &setup, &[], buf)) {
                    Ok(received) => received,
                    Err(e) => return self.fail(e),
                };
                let Some(device) = DeviceDescriptor::parse(&self.scratch[..received]) else {
                    return self.fail(UsbError::InvalidDescriptor);
                };
                info!(
                    "device {:04x}:{:04x} USB {:#06x}, {} configuration(s)",
                    device.vendor_id,
                    device.product_id,
                    device.bcd_usb,
                    device.num_configurations
                );
                self.device = Some(device);
                self.advance(EnumerationState::SetAddress);
                Poll::Pending
            }
            EnumerationState::SetAddress => {
                let setup = SetupPacket::set_address(DEVICE_ADDRESS);
                if let Err(e) = ready!(channel.request(transport, &setup, &[], &mut [])) {
                    return self.fail(e);
                }
                if let Err(e) = transport.open_control_pipe(DEVICE_ADDRESS, self.ep0_max_packet) {
                    return self.fail(e);
                }
                self.advance(EnumerationState::GetConfigDescriptor);
                Poll::Pending
            }
            EnumerationState::GetConfigDescriptor => {
                let setup = SetupPacket::get_descriptor(
                    descriptor_type::CONFIGURATION,
                    0,
                    0,
                    ConfigurationHeader::LEN as u16,
                );
                let buf = &mut self.config[..ConfigurationHeader::LEN];
                let received = match ready!(channel.request(transport, &setup, &[], buf)) {
                    Ok(received) => received,
                    Err(e) => return self.fail(e),
                };
                let Some(header) = ConfigurationHeader::parse(&self.config[..received]) else {
                    return self.fail(UsbError::InvalidDescriptor);
                };
                if header.total_length as usize > MAX_CONFIG_DESCRIPTOR_SIZE {
                    warn!(
                        "configuration descriptor of {} bytes clamped to {}",
                        header.total_length,
                        MAX_CONFIG_DESCRIPTOR_SIZE
                    );
                }
                self.config_header = Some(header);
                self.advance(EnumerationState::GetFullConfigDescriptor);
                Poll::Pending
            }
            EnumerationState::GetFullConfigDescriptor => {
                let total = self
                    .config_header
                    .map(|header| (header.total_length as usize).min(MAX_CONFIG_DESCRIPTOR_SIZE))
                    .unwrap_or(ConfigurationHeader::LEN);
                let setup = SetupPacket::get_descriptor(descriptor_type::CONFIGURATION, 0, 0, total as u16);
                let buf = &mut self.config[..total];
                let received = match ready!(channel.request(transport, &setup, &[], buf)) {
                    Ok(received) => received,
                    Err(e) => return self.fail(e),
                };
                if received < ConfigurationHeader::LEN {
                    return self.fail(UsbError::InvalidDescriptor);
                }
                self.config_len = received;
                self.advance(EnumerationState::GetManufacturerString);
                Poll::Pending
            }
            EnumerationState::GetManufacturerString => {
                let index = self.device.map(|d| d.manufacturer_index).unwrap_or(0);
                let value = ready!(self.read_string(transport, channel, index));
                info!("manufacturer: {}", value.as_str());
                self.strings.manufacturer = value;
                self.advance(EnumerationState::GetProductString);
                Poll::Pending
            }
            EnumerationState::GetProductString => {
                let index = self.device.map(|d| d.product_index).unwrap_or(0);
                let value = ready!(self.read_string(transport, channel, index));
                info!("product: {}", value.as_str());
                self.strings.product = value;
                self.advance(EnumerationState::GetSerialString);
                Poll::Pending
            }
            EnumerationState::GetSerialString => {
                let index = self.device.map(|d| d.serial_index).unwrap_or(0);
                let value = ready!(self.read_string(transport, channel, index));
                info!("serial: {}", value.as_str());
                self.strings.serial = value;
                self.advance(EnumerationState::Done);
                Poll::Ready(Ok(()))
            }
        }
    }

    /// Read string `index`, or the placeholder if absent or rejected
    fn read_string<T: UsbTransport>(
        &mut self,
        transport: &mut T,
        channel: &mut ControlChannel,
        index: u8,
    ) -> Poll<DescriptorString> {
        if index == 0 {
            return Poll::Ready(placeholder_string());
        }
        let setup = SetupPacket::get_descriptor(
            descriptor_type::STRING,
            index,
            LANGID_EN_US,
            MAX_STRING_DESCRIPTOR_LEN as u16,
        );
        let value = match ready!(channel.request(transport, &setup, &[], &mut self.scratch)) {
            Ok(received) => decode_string(&self.scratch[..received]),
            Err(e) => {
                debug!("string {} rejected: {}", index, e);
                None
            }
        };
        Poll::Ready(value.unwrap_or_else(placeholder_string))
    }
}

impl Default for Enumeration {
    fn default() -> Self {
        Self::new()
    }
}
