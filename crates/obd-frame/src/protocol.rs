//! OBD-II Bus Protocol Definitions
//!
//! Protocol-specific behavior lives in one capability table keyed by
//! [`BusProtocol`]; encode/decode logic does a table lookup, so adding
//! a protocol variant means adding one table entry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::ChecksumKind;

/// Supported OBD-II bus protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusProtocol {
    /// Automatic protocol detection (auto-search)
    Auto,
    /// ISO 9141-2 (5 baud init, 10.4 kbaud)
    Iso9141_2,
    /// ISO 14230-4 KWP (5 baud init, 10.4 kbaud)
    Iso14230_4Slow,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4Fast,
    /// SAE J1850 PWM (41.6 kbaud)
    SaeJ1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    SaeJ1850Vpw,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11Bit,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29Bit,
}

/// Per-protocol framing capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolCaps {
    /// Header bytes at the front of each frame (11-bit CAN IDs are
    /// padded out to 4 bytes by the adapter or the line parser)
    pub header_len: usize,
    /// Checksum algorithm protecting each frame
    pub checksum: ChecksumKind,
    /// Most data bytes a single frame can carry
    pub max_frame_payload: usize,
    /// Whether the protocol defines multi-frame transfers
    pub multi_frame: bool,
}

const LEGACY_SUM: ProtocolCaps = ProtocolCaps {
    header_len: 3,
    checksum: ChecksumKind::Sum8,
    max_frame_payload: 7,
    multi_frame: false,
};

const LEGACY_CRC: ProtocolCaps = ProtocolCaps {
    header_len: 3,
    checksum: ChecksumKind::Crc8J1850,
    max_frame_payload: 7,
    multi_frame: false,
};

const CAN: ProtocolCaps = ProtocolCaps {
    header_len: 4,
    checksum: ChecksumKind::Adapter,
    max_frame_payload: 7,
    multi_frame: true,
};

/// Auto-search candidate order: CAN variants first, then the legacy
/// serial protocols. Each candidate is probed at most once per session
/// establishment. ISO 14230-4 with 5 baud init is deliberately absent:
/// its slow bus init is the same handshake the ISO 9141-2 probe
/// performs, so it is only reachable by explicit selection.
pub const AUTO_SEARCH_ORDER: [BusProtocol; 6] = [
    BusProtocol::Iso15765_4Can11Bit,
    BusProtocol::Iso15765_4Can29Bit,
    BusProtocol::SaeJ1850Pwm,
    BusProtocol::SaeJ1850Vpw,
    BusProtocol::Iso9141_2,
    BusProtocol::Iso14230_4Fast,
];

impl BusProtocol {
    /// Capability table lookup; `None` for [`BusProtocol::Auto`], which
    /// has no frame format of its own
    pub fn caps(&self) -> Option<ProtocolCaps> {
        match self {
            BusProtocol::Auto => None,
            BusProtocol::Iso9141_2 | BusProtocol::Iso14230_4Slow | BusProtocol::Iso14230_4Fast => {
                Some(LEGACY_SUM)
            }
            BusProtocol::SaeJ1850Pwm | BusProtocol::SaeJ1850Vpw => Some(LEGACY_CRC),
            BusProtocol::Iso15765_4Can11Bit | BusProtocol::Iso15765_4Can29Bit => Some(CAN),
        }
    }

    /// The single-character protocol code used by ELM-class adapters
    pub fn adapter_code(&self) -> char {
        match self {
            BusProtocol::Auto => '0',
            BusProtocol::SaeJ1850Pwm => '1',
            BusProtocol::SaeJ1850Vpw => '2',
            BusProtocol::Iso9141_2 => '3',
            BusProtocol::Iso14230_4Slow => '4',
            BusProtocol::Iso14230_4Fast => '5',
            BusProtocol::Iso15765_4Can11Bit => '6',
            BusProtocol::Iso15765_4Can29Bit => '7',
        }
    }

    /// Map an adapter protocol code (e.g. from a describe-protocol
    /// reply) back to a variant
    pub fn from_adapter_code(code: char) -> Option<Self> {
        match code {
            '0' => Some(BusProtocol::Auto),
            '1' => Some(BusProtocol::SaeJ1850Pwm),
            '2' => Some(BusProtocol::SaeJ1850Vpw),
            '3' => Some(BusProtocol::Iso9141_2),
            '4' => Some(BusProtocol::Iso14230_4Slow),
            '5' => Some(BusProtocol::Iso14230_4Fast),
            '6' => Some(BusProtocol::Iso15765_4Can11Bit),
            '7' => Some(BusProtocol::Iso15765_4Can29Bit),
            _ => None,
        }
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            BusProtocol::Iso15765_4Can11Bit | BusProtocol::Iso15765_4Can29Bit
        )
    }

    /// Check if this is a legacy (pre-CAN) serial protocol
    pub fn is_legacy(&self) -> bool {
        !self.is_can() && *self != BusProtocol::Auto
    }
}

impl Default for BusProtocol {
    fn default() -> Self {
        BusProtocol::Auto
    }
}

impl fmt::Display for BusProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusProtocol::Auto => "automatic",
            BusProtocol::Iso9141_2 => "ISO 9141-2",
            BusProtocol::Iso14230_4Slow => "ISO 14230-4 KWP (5 baud init)",
            BusProtocol::Iso14230_4Fast => "ISO 14230-4 KWP (fast init)",
            BusProtocol::SaeJ1850Pwm => "SAE J1850 PWM",
            BusProtocol::SaeJ1850Vpw => "SAE J1850 VPW",
            BusProtocol::Iso15765_4Can11Bit => "ISO 15765-4 CAN (11 bit ID)",
            BusProtocol::Iso15765_4Can29Bit => "ISO 15765-4 CAN (29 bit ID)",
        };
        f.write_str(name)
    }
}
