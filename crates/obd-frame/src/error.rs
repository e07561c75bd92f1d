//! Codec Error Types

use thiserror::Error;

use crate::protocol::BusProtocol;

/// Errors raised while encoding or decoding diagnostic frames
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    /// Frame work attempted before a concrete protocol was negotiated
    #[error("No concrete protocol negotiated; Auto has no frame format")]
    AutoProtocol,

    /// Response line is not valid hex text
    #[error("Line is not valid hex: {line:?}")]
    InvalidHex { line: String },

    /// Response line shorter than the protocol header
    #[error("Frame too short for {protocol} header: {line:?}")]
    TooShort { protocol: BusProtocol, line: String },

    /// Request payload too large for a single frame on this protocol
    #[error("Request payload of {len} bytes exceeds the {max}-byte single-frame limit of {protocol}")]
    PayloadTooLarge {
        protocol: BusProtocol,
        len: usize,
        max: usize,
    },

    /// Multi-frame transfer on a protocol without multi-frame support
    #[error("Multi-frame transfer not supported on {0}")]
    MultiFrameUnsupported(BusProtocol),

    /// Unrecognized protocol control information byte
    #[error("Invalid PCI byte {pci:02X}")]
    InvalidPci { pci: u8 },

    /// A consecutive frame sequence number was skipped
    #[error("Consecutive frame sequence gap: no frame with counter {expected:X}")]
    SequenceGap { expected: u8 },

    /// Consecutive frame arrived with no preceding first frame
    #[error("Consecutive frame from {ecu:#05X} with no first frame")]
    OrphanConsecutive { ecu: u32 },

    /// Reassembled payload length disagrees with the first frame
    #[error("Reassembled {got} bytes but the first frame declared {declared}")]
    LengthMismatch { declared: usize, got: usize },
}
