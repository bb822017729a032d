//! Isochronous payload header

use bitflags::bitflags;

bitflags! {
    /// `bmHeaderInfo`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderInfo: u8 {
        /// Frame ID, toggles at each new frame
        const FID = 1 << 0;
        /// End of frame
        const EOF = 1 << 1;
        /// Presentation time stamp present
        const PTS = 1 << 2;
        /// Source clock reference present
        const SCR = 1 << 3;
        /// Still image
        const STI = 1 << 5;
        /// Error in this payload
        const ERR = 1 << 6;
        /// End of header
        const EOH = 1 << 7;
    }
}

/// Why a packet's header was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderError {
    /// Zero-length packet
    Empty,
    /// `bHeaderLength` below 2
    TooShort,
    /// `bHeaderLength` past the end of the packet
    Overrun,
}

/// Parsed payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// `bHeaderLength`, including this byte
    pub length: usize,
    /// `bmHeaderInfo`
    pub info: HeaderInfo,
}

impl PayloadHeader {
    /// Parse the header at the start of `packet`
    pub fn parse(packet: &[u8]) -> Result<Self, HeaderError> {
        let Some(&length) = packet.first() else {
            return Err(HeaderError::Empty);
        };
        let length = length as usize;
        if length < 2 {
            return Err(HeaderError::TooShort);
        }
        if length > packet.len() {
            return Err(HeaderError::Overrun);
        }
        Ok(Self {
            length,
            info: HeaderInfo::from_bits_retain(packet[1]),
        })
    }

    /// Frame ID bit
    pub fn fid(&self) -> bool {
        self.info.contains(HeaderInfo::FID)
    }

    /// End of frame
    pub fn end_of_frame(&self) -> bool {
        self.info.contains(HeaderInfo::EOF)
    }

    /// Device flagged an error in this payload
    pub fn error(&self) -> bool {
        self.info.contains(HeaderInfo::ERR)
    }

    /// Payload bytes following the header
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        &packet[self.length.min(packet.len())..]
    }
}
