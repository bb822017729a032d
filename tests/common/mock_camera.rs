//! Simulated UVC camera
//!
//! Answers control requests the way a small UVC 1.0/1.1 webcam does and
//! plays back scripted isochronous packets into whatever buffer the driver
//! scheduled.

use std::collections::VecDeque;
use std::vec::Vec;

use usbh_uvc::descriptor::video::YUY2_GUID;
use usbh_uvc::transfer::{descriptor_type, request, vs_control};
use usbh_uvc::{ControlStatus, IsoCompletion, PayloadKind, SetupPacket, Speed, UsbError, UsbTransport};

/// Payload header bits
pub const FID: u8 = 0x01;
pub const EOF: u8 = 0x02;
pub const ERR: u8 = 0x40;

/// Create a standard USB 2.0 device descriptor for a composite video device
pub fn create_test_device_descriptor() -> [u8; 18] {
    [
        0x12,       // bLength
        0x01,       // bDescriptorType (DEVICE)
        0x00, 0x02, // bcdUSB (2.0)
        0xEF,       // bDeviceClass (miscellaneous)
        0x02,       // bDeviceSubClass (common class)
        0x01,       // bDeviceProtocol (IAD)
        0x40,       // bMaxPacketSize0 (64 bytes)
        0x6D, 0x04, // idVendor
        0x25, 0x08, // idProduct
        0x10, 0x00, // bcdDevice
        0x01,       // iManufacturer
        0x02,       // iProduct
        0x00,       // iSerialNumber (none)
        0x01,       // bNumConfigurations
    ]
}

/// One frame descriptor; empty `intervals` makes a continuous range
#[derive(Clone)]
pub struct FrameSpec {
    pub width: u16,
    pub height: u16,
    pub intervals: Vec<u32>,
}

impl FrameSpec {
    pub fn new(width: u16, height: u16, intervals: &[u32]) -> Self {
        Self {
            width,
            height,
            intervals: intervals.to_vec(),
        }
    }
}

/// Builds a UVC configuration descriptor
#[derive(Clone)]
pub struct ConfigBuilder {
    bcd_uvc: u16,
    association: bool,
    formats: Vec<(PayloadKind, Vec<FrameSpec>)>,
    alternates: Vec<u16>,
    leading_audio: u8,
}

impl ConfigBuilder {
    /// UVC 1.0 camera: MJPEG 640x480 and 320x240, YUY2 320x240, three alternates
    pub fn new() -> Self {
        Self {
            bcd_uvc: 0x0100,
            association: true,
            formats: vec![
                (
                    PayloadKind::Mjpeg,
                    vec![
                        FrameSpec::new(640, 480, &[333_333, 666_666]),
                        FrameSpec::new(320, 240, &[333_333]),
                    ],
                ),
                (PayloadKind::Yuy2, vec![FrameSpec::new(320, 240, &[666_666, 1_000_000])]),
            ],
            alternates: vec![0x0080, 0x0400, 0x1400],
            leading_audio: 0,
        }
    }

    pub fn uvc_version(mut self, bcd: u16) -> Self {
        self.bcd_uvc = bcd;
        self
    }

    pub fn without_association(mut self) -> Self {
        self.association = false;
        self
    }

    pub fn formats(mut self, formats: Vec<(PayloadKind, Vec<FrameSpec>)>) -> Self {
        self.formats = formats;
        self
    }

    /// Raw `wMaxPacketSize` of the endpoint in alternates 1..
    pub fn alternates(mut self, sizes: &[u16]) -> Self {
        self.alternates = sizes.to_vec();
        self
    }

    /// Audio interfaces numbered ahead of the video function
    pub fn leading_audio_interfaces(mut self, count: u8) -> Self {
        self.leading_audio = count;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for number in 0..self.leading_audio {
            let subclass = if number == 0 { 0x01 } else { 0x02 };
            body.extend_from_slice(&[0x09, 0x04, number, 0x00, 0x00, 0x01, subclass, 0x00, 0x00]);
        }

        let vc = self.leading_audio;
        let vs = vc + 1;
        if self.association {
            body.extend_from_slice(&[0x08, 0x0B, vc, 0x02, 0x0E, 0x03, 0x00, 0x00]);
        }

        // VideoControl interface and its header
        body.extend_from_slice(&[0x09, 0x04, vc, 0x00, 0x00, 0x0E, 0x01, 0x00, 0x00]);
        let [bcd_lo, bcd_hi] = self.bcd_uvc.to_le_bytes();
        body.extend_from_slice(&[0x0D, 0x24, 0x01, bcd_lo, bcd_hi, 0x0D, 0x00, 0x80, 0x8D, 0x5B, 0x00, 0x01, vs]);

        // VideoStreaming interface, alternate 0
        body.extend_from_slice(&[0x09, 0x04, vs, 0x00, 0x00, 0x0E, 0x02, 0x00, 0x00]);
        let num_formats = self.formats.len() as u8;
        let mut input_header = vec![13 + num_formats, 0x24, 0x01, num_formats, 0x00, 0x00, 0x81, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01];
        input_header.extend(std::iter::repeat(0x00).take(num_formats as usize));
        body.extend_from_slice(&input_header);

        for (n, (kind, frames)) in self.formats.iter().enumerate() {
            let format_index = n as u8 + 1;
            let frame_subtype = match kind {
                PayloadKind::Mjpeg => {
                    body.extend_from_slice(&[0x0B, 0x24, 0x06, format_index, frames.len() as u8, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
                    0x07
                }
                PayloadKind::Yuy2 => {
                    body.extend_from_slice(&[0x1B, 0x24, 0x04, format_index, frames.len() as u8]);
                    body.extend_from_slice(&YUY2_GUID);
                    body.extend_from_slice(&[0x10, 0x01, 0x00, 0x00, 0x00, 0x00]);
                    0x05
                }
            };
            for (m, frame) in frames.iter().enumerate() {
                body.extend_from_slice(&frame_descriptor(frame_subtype, m as u8 + 1, frame));
            }
        }

        for (n, size) in self.alternates.iter().enumerate() {
            body.extend_from_slice(&[0x09, 0x04, vs, n as u8 + 1, 0x01, 0x0E, 0x02, 0x00, 0x00]);
            let [lo, hi] = size.to_le_bytes();
            body.extend_from_slice(&[0x07, 0x05, 0x81, 0x05, lo, hi, 0x01]);
        }

        let total = (9 + body.len()) as u16;
        let [total_lo, total_hi] = total.to_le_bytes();
        let mut bytes = vec![0x09, 0x02, total_lo, total_hi, vs + 1, 0x01, 0x00, 0x80, 0xFA];
        bytes.extend_from_slice(&body);
        bytes
    }
}

fn frame_descriptor(subtype: u8, index: u8, frame: &FrameSpec) -> Vec<u8> {
    let max_frame_size = frame.width as u32 * frame.height as u32 * 2;
    let default_interval = frame.intervals.first().copied().unwrap_or(333_333);
    let mut bytes = vec![0, 0x24, subtype, index, 0x00];
    bytes.extend_from_slice(&frame.width.to_le_bytes());
    bytes.extend_from_slice(&frame.height.to_le_bytes());
    bytes.extend_from_slice(&[0; 8]); // bit rates
    bytes.extend_from_slice(&max_frame_size.to_le_bytes());
    bytes.extend_from_slice(&default_interval.to_le_bytes());
    if frame.intervals.is_empty() {
        bytes.push(0);
        for value in [333_333u32, 10_000_000, 333_333] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    } else {
        bytes.push(frame.intervals.len() as u8);
        for interval in &frame.intervals {
            bytes.extend_from_slice(&interval.to_le_bytes());
        }
    }
    bytes[0] = bytes.len() as u8;
    bytes
}

fn string_descriptor(text: &str) -> Vec<u8> {
    let mut bytes = vec![(2 + text.len() * 2) as u8, 0x03];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Isochronous packet with a 2-byte payload header
pub fn payload_packet(info: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x02, info | 0x80];
    bytes.extend_from_slice(payload);
    bytes
}

/// Simulated camera
pub struct MockCamera {
    pub speed: Speed,
    pub device: [u8; 18],
    pub config: Vec<u8>,
    pub strings: Vec<(u8, &'static str)>,
    /// Requests answered with STALL
    pub stall_requests: Vec<u8>,
    pub stall_all: bool,
    /// Polls answered `Pending` before each transfer completes
    pub pending_polls: u32,
    /// Frame interval the camera answers probes with, instead of echoing
    pub probe_interval_override: Option<u32>,

    pub requests: Vec<SetupPacket>,
    pub address: u8,
    pub configuration: u8,
    pub interface_alternates: Vec<(u8, u8)>,
    pub probe: Vec<u8>,
    pub committed: Option<Vec<u8>>,
    pub control_pipes: Vec<(u8, u16)>,
    pub streaming_pipe: Option<(u8, u8, u16)>,
    pub resets: usize,
    pub waits: usize,

    pub packets: VecDeque<Result<Vec<u8>, UsbError>>,
    pub iso_schedules: usize,
    pub iso_cancels: usize,
    pub overlapping_schedules: usize,
    armed: Option<(*mut u8, usize)>,

    outstanding: Option<(SetupPacket, Vec<u8>)>,
    pending_left: u32,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new())
    }

    pub fn with_config(builder: ConfigBuilder) -> Self {
        Self {
            speed: Speed::High,
            device: create_test_device_descriptor(),
            config: builder.build(),
            strings: vec![(1, "Acme"), (2, "UVC Camera")],
            stall_requests: Vec::new(),
            stall_all: false,
            pending_polls: 0,
            probe_interval_override: None,
            requests: Vec::new(),
            address: 0,
            configuration: 0,
            interface_alternates: Vec::new(),
            probe: Vec::new(),
            committed: None,
            control_pipes: Vec::new(),
            streaming_pipe: None,
            resets: 0,
            waits: 0,
            packets: VecDeque::new(),
            iso_schedules: 0,
            iso_cancels: 0,
            overlapping_schedules: 0,
            armed: None,
            outstanding: None,
            pending_left: 0,
        }
    }

    /// Queue a packet for the next isochronous receive
    pub fn queue_packet(&mut self, packet: Vec<u8>) {
        self.packets.push_back(Ok(packet));
    }

    /// Queue a failed isochronous receive
    pub fn queue_error(&mut self, error: UsbError) {
        self.packets.push_back(Err(error));
    }

    /// Queue a frame split into packets, EOF on the last one
    pub fn queue_frame(&mut self, fid: bool, data: &[u8], chunk: usize, with_eof: bool) {
        let fid = if fid { FID } else { 0 };
        let chunks: Vec<&[u8]> = data.chunks(chunk).collect();
        for (n, piece) in chunks.iter().enumerate() {
            let eof = if with_eof && n + 1 == chunks.len() { EOF } else { 0 };
            self.queue_packet(payload_packet(fid | eof, piece));
        }
    }

    /// Complete the scheduled receive with the next queued packet
    pub fn deliver(&mut self) -> Option<IsoCompletion> {
        let (buffer, len) = self.armed.take()?;
        let Some(packet) = self.packets.pop_front() else {
            self.armed = Some((buffer, len));
            return None;
        };
        Some(match packet {
            Ok(data) => {
                let n = data.len().min(len);
                // Safety: the driver guarantees `buffer` is valid for `len`
                // bytes until this completion is reported.
                unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), buffer, n) };
                IsoCompletion::ok(n)
            }
            Err(e) => IsoCompletion::error(e),
        })
    }

    /// Whether a receive is scheduled
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Requests with the given request code
    pub fn count(&self, code: u8) -> usize {
        self.requests.iter().filter(|setup| setup.request == code).count()
    }

    fn answer(&mut self, setup: &SetupPacket, out_data: &[u8], in_data: &mut [u8]) -> ControlStatus {
        if self.stall_all || self.stall_requests.contains(&setup.request) {
            return ControlStatus::Stalled;
        }
        let reply: Vec<u8> = match (setup.request_type, setup.request) {
            (0x80, request::GET_DESCRIPTOR) => {
                let index = (setup.value & 0xFF) as u8;
                match (setup.value >> 8) as u8 {
                    descriptor_type::DEVICE => self.device.to_vec(),
                    descriptor_type::CONFIGURATION => self.config.clone(),
                    descriptor_type::STRING => match self.strings.iter().find(|(i, _)| *i == index) {
                        Some((_, text)) => string_descriptor(text),
                        None => return ControlStatus::Stalled,
                    },
                    _ => return ControlStatus::Stalled,
                }
            }
            (0x00, request::SET_ADDRESS) => {
                self.address = setup.value as u8;
                Vec::new()
            }
            (0x00, request::SET_CONFIGURATION) => {
                self.configuration = setup.value as u8;
                Vec::new()
            }
            (0x01, request::SET_INTERFACE) => {
                self.interface_alternates.push((setup.index as u8, setup.value as u8));
                Vec::new()
            }
            (0x21, request::UVC_SET_CUR) => {
                match (setup.value >> 8) as u8 {
                    vs_control::PROBE => self.probe = out_data.to_vec(),
                    vs_control::COMMIT => self.committed = Some(out_data.to_vec()),
                    _ => return ControlStatus::Stalled,
                }
                Vec::new()
            }
            (0xA1, request::UVC_GET_CUR) if (setup.value >> 8) as u8 == vs_control::PROBE => {
                let mut answer = self.probe.clone();
                if answer.len() >= 26 {
                    if let Some(interval) = self.probe_interval_override {
                        answer[4..8].copy_from_slice(&interval.to_le_bytes());
                    }
                    answer[18..22].copy_from_slice(&153_600u32.to_le_bytes());
                    answer[22..26].copy_from_slice(&3072u32.to_le_bytes());
                }
                answer
            }
            _ => return ControlStatus::Stalled,
        };
        let n = reply.len().min(setup.length as usize).min(in_data.len());
        in_data[..n].copy_from_slice(&reply[..n]);
        ControlStatus::Done(n)
    }
}

impl UsbTransport for MockCamera {
    fn reset_port(&mut self) -> Result<(), UsbError> {
        self.resets += 1;
        self.address = 0;
        self.configuration = 0;
        self.outstanding = None;
        Ok(())
    }

    fn port_speed(&self) -> Speed {
        self.speed
    }

    fn open_control_pipe(&mut self, address: u8, max_packet: u16) -> Result<(), UsbError> {
        self.control_pipes.push((address, max_packet));
        Ok(())
    }

    fn open_streaming_pipe(&mut self, address: u8, endpoint: u8, max_packet: u16) -> Result<(), UsbError> {
        self.streaming_pipe = Some((address, endpoint, max_packet));
        Ok(())
    }

    fn submit_control(&mut self, setup: &SetupPacket, out_data: &[u8]) -> Result<(), UsbError> {
        if self.outstanding.is_some() {
            return Err(UsbError::NoResources);
        }
        self.requests.push(*setup);
        self.outstanding = Some((*setup, out_data.to_vec()));
        self.pending_left = self.pending_polls;
        Ok(())
    }

    fn poll_control(&mut self, in_data: &mut [u8]) -> ControlStatus {
        if self.pending_left > 0 {
            self.pending_left -= 1;
            return ControlStatus::Pending;
        }
        let Some((setup, out_data)) = self.outstanding.take() else {
            return ControlStatus::Failed(UsbError::InvalidParameter);
        };
        self.answer(&setup, &out_data, in_data)
    }

    unsafe fn receive_isochronous(&mut self, buffer: *mut u8, len: usize) -> Result<(), UsbError> {
        if self.armed.is_some() {
            self.overlapping_schedules += 1;
        }
        self.armed = Some((buffer, len));
        self.iso_schedules += 1;
        Ok(())
    }

    fn cancel_isochronous(&mut self) {
        if self.armed.take().is_some() {
            self.iso_cancels += 1;
        }
    }

    fn wait_for_event(&mut self) {
        self.waits += 1;
    }
}
