//! Frame Checksum Algorithms

use crc::{Crc, CRC_8_SAE_J1850};
use serde::{Deserialize, Serialize};

const J1850: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);

/// Checksum algorithm protecting a bus frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumKind {
    /// Validated in adapter hardware; absent from the text the adapter
    /// reports (ISO 15765-4 CAN)
    Adapter,
    /// Additive checksum modulo 256 (ISO 9141-2, ISO 14230-4)
    Sum8,
    /// SAE J1850 CRC-8 (PWM and VPW)
    Crc8J1850,
}

impl ChecksumKind {
    /// Compute the checksum byte over the given frame bytes, or `None`
    /// when the adapter hardware owns checksumming
    pub fn compute(&self, bytes: &[u8]) -> Option<u8> {
        match self {
            ChecksumKind::Adapter => None,
            ChecksumKind::Sum8 => {
                Some(bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
            }
            ChecksumKind::Crc8J1850 => Some(J1850.checksum(bytes)),
        }
    }

    /// Validate an observed checksum byte against the frame bytes.
    /// Adapter-owned checksums always validate at this layer.
    pub fn validate(&self, bytes: &[u8], observed: u8) -> bool {
        match self.compute(bytes) {
            None => true,
            Some(expected) => expected == observed,
        }
    }
}
