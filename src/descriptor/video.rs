//! UVC class-specific descriptors
//!
//! VideoControl header plus the VideoStreaming format and frame descriptors
//! for the two payloads the driver captures: uncompressed (YUY2) and MJPEG.

use heapless::Vec;

use super::{le16, le32};
use crate::config::{MAX_FRAMES, MAX_FRAME_INTERVALS};

/// VideoControl class-specific subtypes
pub mod vc_subtype {
    /// VC_HEADER
    pub const HEADER: u8 = 0x01;
}

/// VideoStreaming class-specific subtypes
pub mod vs_subtype {
    /// VS_INPUT_HEADER
    pub const INPUT_HEADER: u8 = 0x01;
    /// VS_FORMAT_UNCOMPRESSED
    pub const FORMAT_UNCOMPRESSED: u8 = 0x04;
    /// VS_FRAME_UNCOMPRESSED
    pub const FRAME_UNCOMPRESSED: u8 = 0x05;
    /// VS_FORMAT_MJPEG
    pub const FORMAT_MJPEG: u8 = 0x06;
    /// VS_FRAME_MJPEG
    pub const FRAME_MJPEG: u8 = 0x07;
}

/// GUID of the YUY2 uncompressed format (`32595559-0000-0010-8000-00AA00389B71`)
pub const YUY2_GUID: [u8; 16] = [
    0x59, 0x55, 0x59, 0x32, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// Payload format captured by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadKind {
    /// Uncompressed YUY2 (4:2:2)
    Yuy2,
    /// Motion JPEG
    Mjpeg,
}

/// UVC protocol version reported by the VideoControl header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UvcVersion {
    /// UVC 1.0 (26-byte probe/commit)
    V1_0,
    /// UVC 1.1 (34-byte probe/commit)
    V1_1,
}

impl UvcVersion {
    /// Map `bcdUVC`; versions other than 1.0 and 1.1 are not supported
    pub fn from_bcd(bcd: u16) -> Option<Self> {
        match bcd {
            0x0100 => Some(Self::V1_0),
            0x0110 => Some(Self::V1_1),
            _ => None,
        }
    }

    /// `bcdUVC` value
    pub fn bcd(&self) -> u16 {
        match self {
            Self::V1_0 => 0x0100,
            Self::V1_1 => 0x0110,
        }
    }
}

/// `bcdUVC` of a VideoControl class-specific header
pub fn parse_vc_header(data: &[u8]) -> Option<u16> {
    if data.len() < 5 || data.get(2) != Some(&vc_subtype::HEADER) {
        return None;
    }
    le16(data, 3)
}

/// Frame intervals a frame descriptor supports (100 ns units)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameIntervals {
    /// `bFrameIntervalType == 0`
    Continuous {
        /// `dwMinFrameInterval`
        min: u32,
        /// `dwMaxFrameInterval`
        max: u32,
        /// `dwFrameIntervalStep`
        step: u32,
    },
    /// `bFrameIntervalType == n`
    Discrete(Vec<u32, MAX_FRAME_INTERVALS>),
}

impl FrameIntervals {
    /// Whether `interval` is acceptable
    ///
    /// Continuous ranges accept any interval; discrete lists need an exact
    /// match.
    pub fn matches(&self, interval: u32) -> bool {
        match self {
            Self::Continuous { .. } => true,
            Self::Discrete(list) => list.contains(&interval),
        }
    }
}

/// Reason a frame descriptor was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameParseError {
    /// Shorter than the fixed part
    Truncated,
    /// Discrete interval type but no interval fits in the descriptor
    NoDiscreteIntervals,
    /// Continuous interval type without min/max/step
    MissingContinuousRange,
}

/// VideoStreaming frame descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// `bFrameIndex`
    pub index: u8,
    /// `wWidth`
    pub width: u16,
    /// `wHeight`
    pub height: u16,
    /// `dwMaxVideoFrameBufferSize`
    pub max_frame_size: u32,
    /// `dwDefaultFrameInterval`
    pub default_interval: u32,
    /// Supported intervals
    pub intervals: FrameIntervals,
}

const FRAME_FIXED_LEN: usize = 26;

impl FrameDescriptor {
    /// Parse an uncompressed or MJPEG frame descriptor
    ///
    /// Discrete intervals beyond the table capacity are dropped.
    pub fn parse(data: &[u8]) -> Result<Self, FrameParseError> {
        if data.len() < FRAME_FIXED_LEN {
            return Err(FrameParseError::Truncated);
        }
        let interval_type = data[25];
        let intervals = if interval_type == 0 {
            FrameIntervals::Continuous {
                min: le32(data, 26).ok_or(FrameParseError::MissingContinuousRange)?,
                max: le32(data, 30).ok_or(FrameParseError::MissingContinuousRange)?,
                step: le32(data, 34).ok_or(FrameParseError::MissingContinuousRange)?,
            }
        } else {
            let mut list = Vec::new();
            for n in 0..interval_type as usize {
                let Some(interval) = le32(data, FRAME_FIXED_LEN + n * 4) else {
                    break;
                };
                if list.push(interval).is_err() {
                    warn!(
                        "frame {}: {} intervals declared, only the first {} kept",
                        data[3],
                        interval_type,
                        MAX_FRAME_INTERVALS
                    );
                    break;
                }
            }
            if list.is_empty() {
                return Err(FrameParseError::NoDiscreteIntervals);
            }
            FrameIntervals::Discrete(list)
        };

        Ok(Self {
            index: data[3],
            width: le16(data, 5).ok_or(FrameParseError::Truncated)?,
            height: le16(data, 7).ok_or(FrameParseError::Truncated)?,
            max_frame_size: le32(data, 17).ok_or(FrameParseError::Truncated)?,
            default_interval: le32(data, 21).ok_or(FrameParseError::Truncated)?,
            intervals,
        })
    }
}

/// Format family of a format descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Uncompressed, identified by GUID
    Uncompressed {
        /// `guidFormat`
        guid: [u8; 16],
        /// `bBitsPerPixel`
        bits_per_pixel: u8,
    },
    /// Motion JPEG
    Mjpeg,
}

/// VideoStreaming format descriptor with its frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// `bFormatIndex`
    pub index: u8,
    /// Format family
    pub kind: FormatKind,
    /// Frame descriptors that follow the format
    pub frames: Vec<FrameDescriptor, MAX_FRAMES>,
}

impl FormatDescriptor {
    /// Parse an uncompressed or MJPEG format descriptor
    pub fn parse(data: &[u8]) -> Option<Self> {
        let kind = match data.get(2).copied()? {
            vs_subtype::FORMAT_UNCOMPRESSED => {
                let guid: [u8; 16] = data.get(5..21)?.try_into().ok()?;
                FormatKind::Uncompressed {
                    guid,
                    bits_per_pixel: *data.get(21)?,
                }
            }
            vs_subtype::FORMAT_MJPEG if data.len() >= 11 => FormatKind::Mjpeg,
            _ => return None,
        };
        Some(Self {
            index: data[3],
            kind,
            frames: Vec::new(),
        })
    }

    /// Frame descriptor subtype belonging to this format
    pub fn frame_subtype(&self) -> u8 {
        match self.kind {
            FormatKind::Uncompressed { .. } => vs_subtype::FRAME_UNCOMPRESSED,
            FormatKind::Mjpeg => vs_subtype::FRAME_MJPEG,
        }
    }

    /// Payload kind, if the driver captures this format
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self.kind {
            FormatKind::Uncompressed { guid, .. } if guid == YUY2_GUID => Some(PayloadKind::Yuy2),
            FormatKind::Uncompressed { .. } => None,
            FormatKind::Mjpeg => Some(PayloadKind::Mjpeg),
        }
    }
}
