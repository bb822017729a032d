//! Configuration descriptor parser
//!
//! Locates the Video Interface Association, then gathers the interfaces
//! inside it into a fixed-capacity table. Every walk is bounded by the
//! configuration's own `wTotalLength`. Malformed pieces are dropped where
//! they stand: a bad endpoint discards its alternate setting, a bad frame
//! descriptor discards that frame, an overflowing table entry is skipped.

use core::ops::RangeInclusive;

use heapless::Vec;

use super::video::{parse_vc_header, vs_subtype, FormatDescriptor, FrameDescriptor, UvcVersion};
use super::{kind, DescriptorIter, EndpointDescriptor, InterfaceAssociation, InterfaceDescriptor};
use crate::config::{MAX_ALT_SETTINGS, MAX_ENDPOINTS, MAX_FORMATS, MAX_INTERFACES};
use crate::error::{Result, UvcError};
use crate::transport::Speed;

/// One alternate setting and its endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSetting {
    /// `bAlternateSetting`
    pub alternate: u8,
    /// `bNumEndpoints` as declared
    pub declared_endpoints: u8,
    /// Endpoint descriptors that followed
    pub endpoints: Vec<EndpointDescriptor, MAX_ENDPOINTS>,
}

/// One interface number with its alternate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    /// `bInterfaceNumber`
    pub number: u8,
    /// `bInterfaceClass`
    pub class: u8,
    /// `bInterfaceSubClass`
    pub sub_class: u8,
    /// `bInterfaceProtocol`
    pub protocol: u8,
    /// Alternate settings that passed validation
    pub alternates: Vec<AltSetting, MAX_ALT_SETTINGS>,
    /// Formats (VideoStreaming only)
    pub formats: Vec<FormatDescriptor, MAX_FORMATS>,
    /// `bcdUVC` (VideoControl only)
    pub uvc_bcd: Option<u16>,
}

impl InterfaceRecord {
    fn new(desc: &InterfaceDescriptor) -> Self {
        Self {
            number: desc.interface_number,
            class: desc.interface_class,
            sub_class: desc.interface_sub_class,
            protocol: desc.interface_protocol,
            alternates: Vec::new(),
            formats: Vec::new(),
            uvc_bcd: None,
        }
    }

    /// VideoControl interface
    pub fn is_video_control(&self) -> bool {
        self.class == super::class::VIDEO && self.sub_class == super::class::SUBCLASS_VIDEO_CONTROL
    }

    /// VideoStreaming interface
    pub fn is_video_streaming(&self) -> bool {
        self.class == super::class::VIDEO && self.sub_class == super::class::SUBCLASS_VIDEO_STREAMING
    }

    /// Look up an alternate setting
    pub fn alternate(&self, alternate: u8) -> Option<&AltSetting> {
        self.alternates.iter().find(|alt| alt.alternate == alternate)
    }
}

/// Interfaces gathered from one configuration
pub type InterfaceTable = Vec<InterfaceRecord, MAX_INTERFACES>;

/// Parsed video function of a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFunction {
    /// First interface of the association
    pub first_interface: u8,
    /// Interfaces in the association
    pub interface_count: u8,
    /// Protocol version from the VideoControl header
    pub uvc_version: UvcVersion,
    /// VideoControl interface number
    pub control_interface: Option<u8>,
    /// Gathered interfaces
    pub interfaces: InterfaceTable,
}

impl VideoFunction {
    /// VideoStreaming interfaces in table order
    pub fn streaming_interfaces(&self) -> impl Iterator<Item = &InterfaceRecord> {
        self.interfaces.iter().filter(|iface| iface.is_video_streaming())
    }
}

/// Find the Video Interface Association
///
/// Returns `(first_interface, interface_count)` of the first association
/// with class Video and subclass Interface Collection.
pub fn find_video_association(bytes: &[u8]) -> Option<(u8, u8)> {
    DescriptorIter::configuration(bytes)
        .filter(|desc| desc.kind == kind::INTERFACE_ASSOCIATION)
        .filter_map(|desc| InterfaceAssociation::parse(desc.bytes))
        .find(|iad| iad.is_video())
        .map(|iad| (iad.first_interface, iad.interface_count))
}

/// Alternate setting being collected, committed when the next interface
/// descriptor (or the end of the walk) is reached
struct PendingAlt {
    record: usize,
    alt: AltSetting,
    discarded: bool,
}

fn commit(table: &mut InterfaceTable, pending: Option<PendingAlt>) {
    let Some(pending) = pending else {
        return;
    };
    let record = &mut table[pending.record];
    if pending.discarded {
        warn!(
            "interface {} alt {} discarded: endpoint failed validation",
            record.number,
            pending.alt.alternate
        );
        return;
    }
    if record.alternates.push(pending.alt).is_err() {
        warn!(
            "interface {}: more than {} alternate settings, rest skipped",
            record.number,
            MAX_ALT_SETTINGS
        );
    }
}

/// Gather the interfaces whose numbers fall inside `range`
///
/// Endpoints are validated against `speed`.
pub fn gather_interfaces(bytes: &[u8], range: RangeInclusive<u8>, speed: Speed) -> InterfaceTable {
    gather_matching(bytes, range, speed, |_| true)
}

/// Gather the video interfaces whose numbers fall inside `range`
///
/// Interfaces of other classes never take a table slot, so a composite
/// device with audio or HID functions ahead of its camera still fits.
pub fn gather_video_interfaces(bytes: &[u8], range: RangeInclusive<u8>, speed: Speed) -> InterfaceTable {
    gather_matching(bytes, range, speed, InterfaceDescriptor::is_video)
}

fn gather_matching<F>(bytes: &[u8], range: RangeInclusive<u8>, speed: Speed, keep: F) -> InterfaceTable
where
    F: Fn(&InterfaceDescriptor) -> bool,
{
    let mut table = InterfaceTable::new();
    let mut pending: Option<PendingAlt> = None;
    // index of the interface receiving class-specific descriptors
    let mut current: Option<usize> = None;
    // whether frame descriptors may attach to the last format
    let mut frames_open = false;

    for desc in DescriptorIter::configuration(bytes) {
        match desc.kind {
            kind::INTERFACE => {
                commit(&mut table, pending.take());
                current = None;
                frames_open = false;

                let Some(iface) = InterfaceDescriptor::parse(desc.bytes) else {
                    continue;
                };
                if !range.contains(&iface.interface_number) || !keep(&iface) {
                    continue;
                }

                let index = match table.iter().position(|r| r.number == iface.interface_number) {
                    Some(index) => index,
                    None => {
                        if table.push(InterfaceRecord::new(&iface)).is_err() {
                            warn!(
                                "interface {} skipped: table holds {} interfaces",
                                iface.interface_number,
                                MAX_INTERFACES
                            );
                            continue;
                        }
                        table.len() - 1
                    }
                };
                current = Some(index);
                pending = Some(PendingAlt {
                    record: index,
                    alt: AltSetting {
                        alternate: iface.alternate_setting,
                        declared_endpoints: iface.num_endpoints,
                        endpoints: Vec::new(),
                    },
                    discarded: false,
                });
            }
            kind::ENDPOINT => {
                let Some(pending) = pending.as_mut() else {
                    continue;
                };
                let Some(ep) = EndpointDescriptor::parse(desc.bytes) else {
                    pending.discarded = true;
                    continue;
                };
                if let Err(fault) = ep.validate(speed) {
                    warn!(
                        "endpoint {:#04x} rejected: {:?} (wMaxPacketSize={:#06x} bInterval={})",
                        ep.address,
                        fault,
                        ep.max_packet_size,
                        ep.interval
                    );
                    pending.discarded = true;
                    continue;
                }
                if pending.alt.endpoints.push(ep).is_err() {
                    warn!("endpoint {:#04x} skipped: alternate setting full", ep.address);
                }
            }
            kind::CS_INTERFACE => {
                let Some(index) = current else {
                    continue;
                };
                let record = &mut table[index];
                if record.is_video_control() {
                    if record.uvc_bcd.is_none() {
                        record.uvc_bcd = parse_vc_header(desc.bytes);
                    }
                    continue;
                }
                if !record.is_video_streaming() {
                    continue;
                }
                match desc.subtype() {
                    Some(vs_subtype::FORMAT_UNCOMPRESSED) | Some(vs_subtype::FORMAT_MJPEG) => {
                        frames_open = false;
                        let Some(format) = FormatDescriptor::parse(desc.bytes) else {
                            warn!("interface {}: malformed format descriptor", record.number);
                            continue;
                        };
                        let format_index = format.index;
                        if record.formats.push(format).is_err() {
                            warn!(
                                "interface {}: format {} skipped, table holds {}",
                                record.number,
                                format_index,
                                MAX_FORMATS
                            );
                            continue;
                        }
                        frames_open = true;
                    }
                    Some(subtype @ (vs_subtype::FRAME_UNCOMPRESSED | vs_subtype::FRAME_MJPEG)) => {
                        if !frames_open {
                            continue;
                        }
                        let Some(format) = record.formats.last_mut() else {
                            continue;
                        };
                        if format.frame_subtype() != subtype {
                            continue;
                        }
                        match FrameDescriptor::parse(desc.bytes) {
                            Ok(frame) => {
                                let frame_index = frame.index;
                                if format.frames.push(frame).is_err() {
                                    warn!(
                                        "format {}: frame {} skipped, table full",
                                        format.index,
                                        frame_index
                                    );
                                }
                            }
                            Err(e) => {
                                warn!(
                                    "format {}: frame descriptor {} rejected: {:?}",
                                    format.index,
                                    desc.bytes.get(3).copied().unwrap_or(0),
                                    e
                                );
                            }
                        }
                    }
                    Some(vs_subtype::INPUT_HEADER) => {}
                    _ => {
                        // other formats (frame based, DV, still image) are not captured
                        frames_open = false;
                    }
                }
            }
            _ => {}
        }
    }
    commit(&mut table, pending.take());
    table
}

/// Parse the video function of a configuration descriptor
///
/// Devices without an Interface Association are searched by interface class
/// over the whole interface range.
pub fn parse_configuration(bytes: &[u8], speed: Speed) -> Result<VideoFunction> {
    let association = find_video_association(bytes);
    let range = match association {
        Some((first, count)) => first..=first.saturating_add(count.saturating_sub(1)),
        None => {
            info!("no video interface association, scanning by class");
            0..=u8::MAX
        }
    };

    let interfaces = gather_video_interfaces(bytes, range, speed);

    let control = interfaces.iter().find(|iface| iface.is_video_control());
    let control_interface = control.map(|iface| iface.number);
    let bcd = control.and_then(|iface| iface.uvc_bcd).ok_or_else(|| {
        warn!("no VideoControl header found");
        UvcError::NoSupportedFormat
    })?;
    let uvc_version = UvcVersion::from_bcd(bcd).ok_or_else(|| {
        warn!("unsupported UVC version {:#06x}", bcd);
        UvcError::NoSupportedFormat
    })?;

    if !interfaces.iter().any(|iface| iface.is_video_streaming()) {
        return Err(UvcError::NoSupportedFormat);
    }

    let (first_interface, interface_count) = association.unwrap_or_else(|| {
        let first = interfaces.first().map(|iface| iface.number).unwrap_or(0);
        (first, interfaces.len() as u8)
    });

    info!(
        "video function: interfaces {}..{} UVC {:#06x}",
        first_interface,
        first_interface as u16 + interface_count as u16,
        bcd
    );

    Ok(VideoFunction {
        first_interface,
        interface_count,
        uvc_version,
        control_interface,
        interfaces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_FRAMES;
    use crate::descriptor::class;
    use std::vec::Vec as StdVec;

    fn config(body: &[u8]) -> StdVec<u8> {
        let total = (9 + body.len()) as u16;
        let mut bytes = vec![0x09, kind::CONFIGURATION];
        bytes.extend_from_slice(&total.to_le_bytes());
        bytes.extend_from_slice(&[4, 1, 0, 0x80, 250]);
        bytes.extend_from_slice(body);
        bytes
    }

    fn iad(first: u8, count: u8) -> [u8; 8] {
        [8, kind::INTERFACE_ASSOCIATION, first, count, class::VIDEO, class::SUBCLASS_INTERFACE_COLLECTION, 0, 0]
    }

    fn interface(number: u8, alt: u8, endpoints: u8, sub_class: u8) -> [u8; 9] {
        [9, kind::INTERFACE, number, alt, endpoints, class::VIDEO, sub_class, 0, 0]
    }

    fn vc_header(bcd: u16) -> [u8; 13] {
        let [lo, hi] = bcd.to_le_bytes();
        [13, kind::CS_INTERFACE, 0x01, lo, hi, 0x28, 0, 0x80, 0x8D, 0x5B, 0x00, 1, 1]
    }

    fn iso_in(address: u8, max_packet: u16) -> [u8; 7] {
        let [lo, hi] = max_packet.to_le_bytes();
        [7, kind::ENDPOINT, address, 0x05, lo, hi, 1]
    }

    fn mjpeg_format(index: u8, frames: u8) -> [u8; 11] {
        [11, kind::CS_INTERFACE, vs_subtype::FORMAT_MJPEG, index, frames, 1, 1, 0, 0, 0, 0]
    }

    fn mjpeg_frame(index: u8) -> StdVec<u8> {
        let mut bytes = vec![30, kind::CS_INTERFACE, vs_subtype::FRAME_MJPEG, index, 0];
        bytes.extend_from_slice(&640u16.to_le_bytes());
        bytes.extend_from_slice(&480u16.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&614_400u32.to_le_bytes());
        bytes.extend_from_slice(&333_333u32.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&333_333u32.to_le_bytes());
        bytes
    }

    #[test]
    fn test_gather_counts_interfaces_and_endpoints() {
        for streaming in 1..=3u8 {
            let mut body = StdVec::new();
            body.extend_from_slice(&iad(0, streaming + 1));
            body.extend_from_slice(&interface(0, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
            body.extend_from_slice(&vc_header(0x0110));
            for n in 1..=streaming {
                body.extend_from_slice(&interface(n, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
                body.extend_from_slice(&interface(n, 1, 1, class::SUBCLASS_VIDEO_STREAMING));
                body.extend_from_slice(&iso_in(0x80 | n, 512));
                body.extend_from_slice(&interface(n, 2, 1, class::SUBCLASS_VIDEO_STREAMING));
                body.extend_from_slice(&iso_in(0x80 | n, 1024));
            }
            let bytes = config(&body);

            let table = gather_interfaces(&bytes, 0..=streaming, Speed::High);
            assert_eq!(table.len(), streaming as usize + 1);
            assert_eq!(table[0].uvc_bcd, Some(0x0110));
            for record in table.iter().skip(1) {
                assert_eq!(record.alternates.len(), 3);
                for alt in record.alternates.iter() {
                    assert_eq!(alt.endpoints.len(), alt.declared_endpoints as usize);
                }
            }
        }
    }

    #[test]
    fn test_bad_endpoint_discards_alternate() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&interface(1, 1, 1, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&iso_in(0x81, 0)); // zero packet size
        body.extend_from_slice(&interface(1, 2, 1, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&iso_in(0x81, 1024));
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 0..=1, Speed::High);
        assert_eq!(table.len(), 1);
        let record = &table[0];
        assert!(record.alternate(1).is_none());
        assert!(record.alternate(0).is_some());
        assert_eq!(record.alternate(2).unwrap().endpoints[0].max_packet_size, 1024);
    }

    #[test]
    fn test_interface_table_overflow_is_skipped() {
        let mut body = StdVec::new();
        for n in 0..(MAX_INTERFACES as u8 + 2) {
            body.extend_from_slice(&interface(n, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        }
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        assert_eq!(table.len(), MAX_INTERFACES);
        assert_eq!(table.last().unwrap().number, MAX_INTERFACES as u8 - 1);
    }

    #[test]
    fn test_walk_bounded_by_total_length() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(0, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
        let mut bytes = config(&body);
        // trailing interface beyond wTotalLength must not be seen
        bytes.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));

        let table = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].number, 0);
    }

    #[test]
    fn test_range_excludes_foreign_interfaces() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(0, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&interface(2, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 1..=1, Speed::High);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].number, 1);
    }

    #[test]
    fn test_find_video_association() {
        let mut body = StdVec::new();
        body.extend_from_slice(&[8, kind::INTERFACE_ASSOCIATION, 0, 2, 0x01, 0x00, 0, 0]); // audio
        body.extend_from_slice(&iad(2, 2));
        let bytes = config(&body);
        assert_eq!(find_video_association(&bytes), Some((2, 2)));
        assert_eq!(find_video_association(&config(&[])), None);
    }

    #[test]
    fn test_parse_configuration_without_association() {
        let mut body = StdVec::new();
        body.extend_from_slice(&[9, kind::INTERFACE, 0, 0, 0, 0x01, 0x01, 0, 0]); // audio control
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
        body.extend_from_slice(&vc_header(0x0100));
        body.extend_from_slice(&interface(2, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        let bytes = config(&body);

        let function = parse_configuration(&bytes, Speed::High).unwrap();
        assert_eq!(function.uvc_version, UvcVersion::V1_0);
        assert_eq!(function.control_interface, Some(1));
        assert_eq!(function.first_interface, 1);
        assert_eq!(function.interface_count, 2);
        assert_eq!(function.streaming_interfaces().count(), 1);
    }

    #[test]
    fn test_audio_interfaces_ahead_of_camera() {
        let mut body = StdVec::new();
        for n in 0..4u8 {
            body.extend_from_slice(&[9, kind::INTERFACE, n, 0, 0, 0x01, 0x02, 0, 0]); // audio streaming
        }
        body.extend_from_slice(&interface(4, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
        body.extend_from_slice(&vc_header(0x0100));
        body.extend_from_slice(&interface(5, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&interface(5, 1, 1, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&iso_in(0x81, 1024));
        let bytes = config(&body);

        // the audio functions alone would fill an unfiltered table
        let all = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        assert_eq!(all.len(), MAX_INTERFACES);
        assert!(all.iter().all(|iface| !iface.is_video_control() && !iface.is_video_streaming()));

        let function = parse_configuration(&bytes, Speed::High).unwrap();
        assert_eq!(function.control_interface, Some(4));
        assert_eq!(function.first_interface, 4);
        assert_eq!(function.interface_count, 2);
        let streaming: StdVec<_> = function.streaming_interfaces().map(|iface| iface.number).collect();
        assert_eq!(streaming, [5u8]);
    }

    #[test]
    fn test_alternate_overflow_keeps_first() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        for alt in 1..=MAX_ALT_SETTINGS as u8 {
            body.extend_from_slice(&interface(1, alt, 1, class::SUBCLASS_VIDEO_STREAMING));
            body.extend_from_slice(&iso_in(0x81, 128 * alt as u16));
        }
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        let record = &table[0];
        assert_eq!(record.alternates.len(), MAX_ALT_SETTINGS);
        assert!(record.alternate(MAX_ALT_SETTINGS as u8 - 1).is_some());
        assert!(record.alternate(MAX_ALT_SETTINGS as u8).is_none());
    }

    #[test]
    fn test_format_overflow_keeps_first() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        for index in 1..=MAX_FORMATS as u8 + 1 {
            body.extend_from_slice(&mjpeg_format(index, 1));
            body.extend_from_slice(&mjpeg_frame(1));
        }
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        let formats = &table[0].formats;
        assert_eq!(formats.len(), MAX_FORMATS);
        assert_eq!(formats.last().unwrap().index, MAX_FORMATS as u8);
        // frames of the skipped format must not land on the last kept one
        assert!(formats.iter().all(|format| format.frames.len() == 1));
    }

    #[test]
    fn test_frame_overflow_keeps_first() {
        let mut body = StdVec::new();
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        body.extend_from_slice(&mjpeg_format(1, MAX_FRAMES as u8 + 1));
        for index in 1..=MAX_FRAMES as u8 + 1 {
            body.extend_from_slice(&mjpeg_frame(index));
        }
        let bytes = config(&body);

        let table = gather_interfaces(&bytes, 0..=u8::MAX, Speed::High);
        let frames = &table[0].formats[0].frames;
        assert_eq!(frames.len(), MAX_FRAMES);
        assert_eq!(frames.last().unwrap().index, MAX_FRAMES as u8);
    }

    #[test]
    fn test_unsupported_uvc_version() {
        let mut body = StdVec::new();
        body.extend_from_slice(&iad(0, 2));
        body.extend_from_slice(&interface(0, 0, 0, class::SUBCLASS_VIDEO_CONTROL));
        body.extend_from_slice(&vc_header(0x0150));
        body.extend_from_slice(&interface(1, 0, 0, class::SUBCLASS_VIDEO_STREAMING));
        let bytes = config(&body);

        assert_eq!(parse_configuration(&bytes, Speed::High), Err(UvcError::NoSupportedFormat));
    }
}
