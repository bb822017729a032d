//! Video probe and commit control block
//!
//! The same structure is exchanged for both VS_PROBE_CONTROL and
//! VS_COMMIT_CONTROL. UVC 1.0 devices use the 26-byte layout, UVC 1.1 adds
//! clock and framing fields for 34 bytes. The layout in use is fixed when
//! negotiation starts and recorded in [`ProbeCommit::framing`].

use bitflags::bitflags;

use crate::descriptor::{le16, le32, UvcVersion};

bitflags! {
    /// `bmHint`: fields the device should keep fixed while negotiating
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hint: u16 {
        /// dwFrameInterval
        const FRAME_INTERVAL = 1 << 0;
        /// wKeyFrameRate
        const KEY_FRAME_RATE = 1 << 1;
        /// wPFrameRate
        const P_FRAME_RATE = 1 << 2;
        /// wCompQuality
        const COMP_QUALITY = 1 << 3;
        /// wCompWindowSize
        const COMP_WINDOW_SIZE = 1 << 4;
    }
}

bitflags! {
    /// `bmFramingInfo` (UVC 1.1)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FramingInfo: u8 {
        /// Frame ID field is required in payload headers
        const FRAME_ID_REQUIRED = 1 << 0;
        /// EOF field may be present in payload headers
        const END_OF_FRAME_PRESENT = 1 << 1;
    }
}

/// UVC 1.1 fields appended to the 1.0 layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeExtension {
    /// `dwClockFrequency`
    pub clock_frequency: u32,
    /// `bmFramingInfo`
    pub framing_info: FramingInfo,
    /// `bPreferedVersion`
    pub preferred_version: u8,
    /// `bMinVersion`
    pub min_version: u8,
    /// `bMaxVersion`
    pub max_version: u8,
}

/// Probe/commit control block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCommit {
    /// `bmHint`
    pub hint: Hint,
    /// `bFormatIndex`
    pub format_index: u8,
    /// `bFrameIndex`
    pub frame_index: u8,
    /// 100 ns units
    pub frame_interval: u32,
    /// `wKeyFrameRate`
    pub key_frame_rate: u16,
    /// `wPFrameRate`
    pub p_frame_rate: u16,
    /// `wCompQuality`
    pub comp_quality: u16,
    /// `wCompWindowSize`
    pub comp_window_size: u16,
    /// `wDelay` (ms)
    pub delay: u16,
    /// `dwMaxVideoFrameSize`
    pub max_video_frame_size: u32,
    /// `dwMaxPayloadTransferSize`
    pub max_payload_transfer_size: u32,
    /// Present for the 1.1 layout only
    pub framing: Option<ProbeExtension>,
}

impl ProbeCommit {
    /// Wire length of the UVC 1.0 layout
    pub const LEN_V1_0: usize = 26;
    /// Wire length of the UVC 1.1 layout
    pub const LEN_V1_1: usize = 34;

    /// Request for a format/frame/interval, with the layout of `version`
    pub fn request(version: UvcVersion, format_index: u8, frame_index: u8, frame_interval: u32) -> Self {
        Self {
            hint: Hint::FRAME_INTERVAL,
            format_index,
            frame_index,
            frame_interval,
            key_frame_rate: 0,
            p_frame_rate: 0,
            comp_quality: 0,
            comp_window_size: 0,
            delay: 0,
            max_video_frame_size: 0,
            max_payload_transfer_size: 0,
            framing: match version {
                UvcVersion::V1_0 => None,
                UvcVersion::V1_1 => Some(ProbeExtension {
                    clock_frequency: 0,
                    framing_info: FramingInfo::empty(),
                    preferred_version: 0,
                    min_version: 0,
                    max_version: 0,
                }),
            },
        }
    }

    /// Layout version
    pub fn version(&self) -> UvcVersion {
        if self.framing.is_some() {
            UvcVersion::V1_1
        } else {
            UvcVersion::V1_0
        }
    }

    /// Wire length for this layout
    pub fn wire_len(&self) -> usize {
        Self::wire_len_for(self.version())
    }

    /// Wire length for a protocol version
    pub const fn wire_len_for(version: UvcVersion) -> usize {
        match version {
            UvcVersion::V1_0 => Self::LEN_V1_0,
            UvcVersion::V1_1 => Self::LEN_V1_1,
        }
    }

    /// Whether the negotiable fields agree with `other`
    pub fn agrees_with(&self, other: &Self) -> bool {
        self.format_index == other.format_index
            && self.frame_index == other.frame_index
            && self.frame_interval == other.frame_interval
    }

    /// Encode into `out`, returning the number of bytes written
    ///
    /// Returns `None` if `out` is shorter than the layout.
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        let len = self.wire_len();
        let out = out.get_mut(..len)?;
        out[0..2].copy_from_slice(&self.hint.bits().to_le_bytes());
        out[2] = self.format_index;
        out[3] = self.frame_index;
        out[4..8].copy_from_slice(&self.frame_interval.to_le_bytes());
        out[8..10].copy_from_slice(&self.key_frame_rate.to_le_bytes());
        out[10..12].copy_from_slice(&self.p_frame_rate.to_le_bytes());
        out[12..14].copy_from_slice(&self.comp_quality.to_le_bytes());
        out[14..16].copy_from_slice(&self.comp_window_size.to_le_bytes());
        out[16..18].copy_from_slice(&self.delay.to_le_bytes());
        out[18..22].copy_from_slice(&self.max_video_frame_size.to_le_bytes());
        out[22..26].copy_from_slice(&self.max_payload_transfer_size.to_le_bytes());
        if let Some(ext) = &self.framing {
            out[26..30].copy_from_slice(&ext.clock_frequency.to_le_bytes());
            out[30] = ext.framing_info.bits();
            out[31] = ext.preferred_version;
            out[32] = ext.min_version;
            out[33] = ext.max_version;
        }
        Some(len)
    }

    /// Decode the layout of `version` from `data`
    pub fn decode(version: UvcVersion, data: &[u8]) -> Option<Self> {
        if data.len() < Self::wire_len_for(version) {
            return None;
        }
        let framing = match version {
            UvcVersion::V1_0 => None,
            UvcVersion::V1_1 => Some(ProbeExtension {
                clock_frequency: le32(data, 26)?,
                framing_info: FramingInfo::from_bits_retain(data[30]),
                preferred_version: data[31],
                min_version: data[32],
                max_version: data[33],
            }),
        };
        Some(Self {
            hint: Hint::from_bits_retain(le16(data, 0)?),
            format_index: data[2],
            frame_index: data[3],
            frame_interval: le32(data, 4)?,
            key_frame_rate: le16(data, 8)?,
            p_frame_rate: le16(data, 10)?,
            comp_quality: le16(data, 12)?,
            comp_window_size: le16(data, 14)?,
            delay: le16(data, 16)?,
            max_video_frame_size: le32(data, 18)?,
            max_payload_transfer_size: le32(data, 22)?,
            framing,
        })
    }
}
