//! Streaming format selection
//!
//! Walks the parsed video function for a frame matching the requested
//! geometry, interval and payload, and pairs it with the isochronous
//! endpoint that offers the most bandwidth.

use crate::descriptor::{
    EndpointDescriptor, FormatDescriptor, FrameDescriptor, InterfaceRecord, PayloadKind, TransferType,
    VideoFunction,
};

/// Format, frame and endpoint chosen for streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FormatSelection {
    /// VideoStreaming interface number
    pub interface: u8,
    /// `bFormatIndex`
    pub format_index: u8,
    /// `bFrameIndex`
    pub frame_index: u8,
    /// Frame interval in 100 ns units
    pub frame_interval: u32,
    /// Alternate setting carrying the endpoint
    pub alternate: u8,
    /// Isochronous IN endpoint address
    pub endpoint_address: u8,
    /// Raw `wMaxPacketSize` of the endpoint
    pub max_packet_size: u16,
    /// Bytes one isochronous receive may deliver
    pub packet_bytes: usize,
    /// Payload format
    pub payload: PayloadKind,
    /// Frame width
    pub width: u16,
    /// Frame height
    pub height: u16,
    /// `dwMaxVideoFrameBufferSize` of the frame
    pub max_frame_size: u32,
}

/// Isochronous IN endpoint with the largest packet that fits `max_packet_limit`
///
/// Ties keep the lowest alternate setting.
pub fn best_endpoint(iface: &InterfaceRecord, max_packet_limit: usize) -> Option<(u8, EndpointDescriptor)> {
    let mut best: Option<(u8, EndpointDescriptor)> = None;
    for alt in iface.alternates.iter() {
        for ep in alt.endpoints.iter() {
            if ep.transfer_type() != TransferType::Isochronous || !ep.is_in() {
                continue;
            }
            let bytes = ep.packet_bytes();
            if bytes > max_packet_limit {
                debug!(
                    "alt {} endpoint {:#04x}: {} bytes exceeds scratch of {}",
                    alt.alternate,
                    ep.address,
                    bytes,
                    max_packet_limit
                );
                continue;
            }
            let better = match best {
                Some((_, current)) => bytes > current.packet_bytes(),
                None => true,
            };
            if better {
                best = Some((alt.alternate, *ep));
            }
        }
    }
    best
}

fn matching_frame<'a>(
    format: &'a FormatDescriptor,
    width: u16,
    height: u16,
    interval: u32,
) -> Option<(&'a FrameDescriptor, u32)> {
    format
        .frames
        .iter()
        .filter(|frame| frame.width == width && frame.height == height)
        .find_map(|frame| {
            if interval == 0 {
                Some((frame, frame.default_interval))
            } else if frame.intervals.matches(interval) {
                Some((frame, interval))
            } else {
                None
            }
        })
}

/// Pick a streaming configuration
///
/// `target_interval == 0` selects the frame's default interval. Returns
/// `None` when no interface, format and frame satisfy every constraint.
pub fn select_format(
    function: &VideoFunction,
    target_width: u16,
    target_height: u16,
    target_interval: u32,
    payload: PayloadKind,
    max_packet_limit: usize,
) -> Option<FormatSelection> {
    for iface in function.streaming_interfaces() {
        for format in iface.formats.iter().filter(|f| f.payload_kind() == Some(payload)) {
            let Some((frame, frame_interval)) =
                matching_frame(format, target_width, target_height, target_interval)
            else {
                continue;
            };
            let Some((alternate, ep)) = best_endpoint(iface, max_packet_limit) else {
                warn!("interface {}: no usable isochronous endpoint", iface.number);
                break;
            };

            info!(
                "selected interface {} format {} frame {} ({}x{}) interval {} alt {} ep {:#04x} ({} bytes)",
                iface.number,
                format.index,
                frame.index,
                frame.width,
                frame.height,
                frame_interval,
                alternate,
                ep.address,
                ep.packet_bytes()
            );
            return Some(FormatSelection {
                interface: iface.number,
                format_index: format.index,
                frame_index: frame.index,
                frame_interval,
                alternate,
                endpoint_address: ep.address,
                max_packet_size: ep.max_packet_size,
                packet_bytes: ep.packet_bytes(),
                payload,
                width: frame.width,
                height: frame.height,
                max_frame_size: frame.max_frame_size,
            });
        }
    }
    info!(
        "no {:?} format for {}x{} interval {}",
        payload,
        target_width,
        target_height,
        target_interval
    );
    None
}
