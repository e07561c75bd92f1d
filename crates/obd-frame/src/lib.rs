//! Diagnostic Message Codec
//!
//! Translates between structured diagnostic requests/responses and the
//! hex text a scan-tool adapter puts on its command channel. Covers the
//! bus protocol capability table, per-protocol checksum validation,
//! raw frame parsing, and ISO 15765-4 multi-frame reassembly.

mod checksum;
mod codec;
mod error;
mod frame;
mod isotp;
mod message;
mod protocol;

pub use checksum::ChecksumKind;
pub use codec::{decode, encode};
pub use error::FrameError;
pub use frame::RawFrame;
pub use isotp::Pci;
pub use message::{DiagnosticRequest, DiagnosticResponse, RESPONSE_SID_BIT};
pub use protocol::{BusProtocol, ProtocolCaps, AUTO_SEARCH_ORDER};
