//! Error types
//!
//! Two layers: [`UsbError`] is what the host transport reports for a single
//! transfer, [`UvcError`] is the terminal value a capture session fails with.

use core::fmt;

/// Session operation result type
pub type Result<T> = core::result::Result<T, UvcError>;

/// Transfer-level errors reported by the USB host transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// Device not found or disconnected
    DeviceDisconnected,
    /// USB stall condition (request not supported)
    Stall,
    /// Data toggle mismatch
    DataToggleMismatch,
    /// CRC error in data
    CrcError,
    /// Timeout waiting for response
    Timeout,
    /// Babble detected (device sent too much data)
    Babble,
    /// Transaction error (CRC, timeout, bad PID)
    TransactionError,
    /// Missed microframe
    MissedMicroframe,
    /// Buffer overflow
    BufferOverflow,
    /// Descriptor returned by the device could not be parsed
    InvalidDescriptor,
    /// No available resources (pipes, channels)
    NoResources,
    /// Invalid parameter
    InvalidParameter,
    /// Unsupported operation
    Unsupported,
}

impl UsbError {
    /// Whether enumeration may recover from this error by restarting
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidParameter | Self::Unsupported)
    }
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceDisconnected => write!(f, "Device disconnected"),
            Self::Stall => write!(f, "USB stall"),
            Self::DataToggleMismatch => write!(f, "Data toggle mismatch"),
            Self::CrcError => write!(f, "CRC error"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Babble => write!(f, "Babble detected"),
            Self::TransactionError => write!(f, "Transaction error"),
            Self::MissedMicroframe => write!(f, "Missed microframe"),
            Self::BufferOverflow => write!(f, "Buffer overflow"),
            Self::InvalidDescriptor => write!(f, "Invalid descriptor"),
            Self::NoResources => write!(f, "No resources available"),
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::Unsupported => write!(f, "Unsupported operation"),
        }
    }
}

/// Terminal capture session errors
///
/// `setup_device` fails with exactly one of these. Per-frame corruption and
/// queue backpressure are never reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UvcError {
    /// Enumeration kept failing after the retry budget was spent
    EnumerationFailed,
    /// Probe GET_CUR answered with a different format, frame or interval
    DeviceNotCompliant,
    /// No usable streaming format/alternate setting matches the request
    NoSupportedFormat,
    /// A control transfer failed outside enumeration
    Transport(UsbError),
    /// Invalid parameter passed by the caller
    InvalidParameter,
    /// Operation not valid in the current session phase
    InvalidState,
}

impl From<UsbError> for UvcError {
    fn from(error: UsbError) -> Self {
        Self::Transport(error)
    }
}

impl fmt::Display for UvcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnumerationFailed => write!(f, "Enumeration failed"),
            Self::DeviceNotCompliant => write!(f, "Device rejected the advertised format"),
            Self::NoSupportedFormat => write!(f, "No supported streaming format"),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::InvalidState => write!(f, "Invalid state"),
        }
    }
}
