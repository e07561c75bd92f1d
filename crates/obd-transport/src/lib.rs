//! Transport Channel Abstraction
//!
//! Provides the byte-stream seam between the protocol stack and the
//! physical link to a scan-tool adapter. A live serial port, a recorded
//! session replay, and a recording wrapper all implement the same
//! [`Transport`] trait, so the stack above is testable without hardware.

mod error;
mod replay;
mod serial;
mod transport;

pub use error::TransportError;
pub use replay::{RecordingTransport, ReplayTransport, TraceDirection, TraceRecord};
pub use serial::SerialTransport;
pub use transport::Transport;
