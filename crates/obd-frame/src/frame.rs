//! Raw Frame Parsing
//!
//! Each non-status line an adapter reports is one bus frame, hex
//! encoded, with the frame header in front (headers-on mode). This
//! module turns a line of text into header, source address, data bytes
//! and a validated checksum.

use crate::error::FrameError;
use crate::protocol::BusProtocol;

/// One bus frame as parsed from a single adapter response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Header bytes (3 on legacy buses, 4 on CAN)
    pub header: Vec<u8>,
    /// Source address extracted from the header
    pub source: u32,
    /// Data bytes between header and checksum
    pub data: Vec<u8>,
    /// Trailing checksum byte on legacy buses; CAN frames carry none
    /// at the text level
    pub checksum: Option<u8>,
    /// Whether the checksum validated (always true where the adapter
    /// hardware owns checksumming)
    pub checksum_ok: bool,
    /// The line this frame was parsed from
    pub raw_line: String,
}

impl RawFrame {
    /// Parse one adapter response line as a frame of the given protocol
    pub fn parse_line(line: &str, protocol: BusProtocol) -> Result<Self, FrameError> {
        let caps = protocol.caps().ok_or(FrameError::AutoProtocol)?;

        let mut compact: String = line.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        // 11-bit CAN headers come through as 3 nibbles; pad them out to
        // the 4-byte header 29-bit CAN already gets from the adapter.
        if compact.len() % 2 == 1 {
            if protocol == BusProtocol::Iso15765_4Can11Bit {
                compact.insert_str(0, "00000");
            } else {
                return Err(FrameError::InvalidHex {
                    line: line.to_string(),
                });
            }
        }
        let bytes = hex::decode(&compact).map_err(|_| FrameError::InvalidHex {
            line: line.to_string(),
        })?;

        let checksum_len = usize::from(caps.checksum.compute(&[]).is_some());
        if bytes.len() <= caps.header_len + checksum_len {
            return Err(FrameError::TooShort {
                protocol,
                line: line.to_string(),
            });
        }

        let header = bytes[..caps.header_len].to_vec();
        let source = extract_source(&header, protocol);
        let (data, checksum, checksum_ok) = if checksum_len == 1 {
            let observed = bytes[bytes.len() - 1];
            let covered = &bytes[..bytes.len() - 1];
            let data = bytes[caps.header_len..bytes.len() - 1].to_vec();
            (data, Some(observed), caps.checksum.validate(covered, observed))
        } else {
            (bytes[caps.header_len..].to_vec(), None, true)
        };

        Ok(Self {
            header,
            source,
            data,
            checksum,
            checksum_ok,
            raw_line: line.to_string(),
        })
    }
}

fn extract_source(header: &[u8], protocol: BusProtocol) -> u32 {
    match protocol {
        BusProtocol::Iso15765_4Can11Bit => {
            (u32::from(header[2] & 0x0F) << 8) | u32::from(header[3])
        }
        BusProtocol::Iso15765_4Can29Bit => u32::from_be_bytes([
            header[0], header[1], header[2], header[3],
        ]),
        // Legacy headers end with the transmitter address
        _ => u32::from(header[2]),
    }
}
