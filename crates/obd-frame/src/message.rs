//! Diagnostic Request and Response Types

use serde::{Deserialize, Serialize};

/// Bit set in the SID of every positive OBD response (e.g. a request
/// with SID `0x01` is answered with `0x41`)
pub const RESPONSE_SID_BIT: u8 = 0x40;

/// A structured diagnostic request to send on the vehicle bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRequest {
    /// Service identifier
    pub sid: u8,
    /// Parameter identifier, for services that take one
    pub pid: Option<u8>,
    /// Extra data bytes after the PID
    pub data: Vec<u8>,
    /// Explicit target header bytes; requires header mode to be enabled
    pub header: Option<Vec<u8>>,
}

impl DiagnosticRequest {
    /// Request a bare service (SID only)
    pub fn sid(sid: u8) -> Self {
        Self {
            sid,
            ..Default::default()
        }
    }

    /// Request a service/parameter pair
    pub fn pid(sid: u8, pid: u8) -> Self {
        Self {
            sid,
            pid: Some(pid),
            ..Default::default()
        }
    }

    /// Append extra data bytes
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Address a specific ECU instead of the broadcast header
    pub fn with_header(mut self, header: Vec<u8>) -> Self {
        self.header = Some(header);
        self
    }

    /// The message bytes as they go on the bus: SID, then PID, then data
    pub fn message_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.data.len());
        bytes.push(self.sid);
        if let Some(pid) = self.pid {
            bytes.push(pid);
        }
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// One decoded diagnostic response from a single ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticResponse {
    /// Source address of the responding ECU: the third header byte on
    /// legacy buses, the full 11/29-bit identifier on CAN
    pub source: u32,
    /// Echoed service identifier with the response bit masked off
    pub sid: u8,
    /// Complete message data bytes, echoed SID first (a CAN single
    /// frame with PCI `06` carries six such bytes)
    pub data: Vec<u8>,
    /// False when the frame failed checksum validation or could not be
    /// parsed; the payload is retained for diagnosis either way
    pub valid: bool,
    /// The raw adapter line(s) this response was decoded from
    pub raw: String,
}

impl DiagnosticResponse {
    /// The echoed parameter identifier, when present
    pub fn pid(&self) -> Option<u8> {
        self.data.get(1).copied()
    }

    /// Data bytes after the echoed SID
    pub fn payload(&self) -> &[u8] {
        if self.data.is_empty() {
            &[]
        } else {
            &self.data[1..]
        }
    }
}
