//! Session Error Types
//!
//! Session failures carry their diagnosis context with them: the broad
//! failure class, the protocol that was active, whatever raw adapter
//! text was involved, and a session-relative timestamp. A caller
//! logging one of these has everything needed to reconstruct the
//! exchange.

use thiserror::Error;

use obd_adapter::AdapterError;
use obd_frame::{BusProtocol, FrameError};

/// Broad class of a session failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The channel to the adapter failed; the session is closed
    Channel,
    /// The vehicle or adapter did not answer in time
    Timeout,
    /// A reply was malformed, rejected, or undecodable; retriable
    Protocol,
    /// Automatic protocol search exhausted every candidate
    ProtocolNotFound,
    /// The operation is not valid in the current session state
    InvalidState,
    /// The operation is recognized but deliberately not performed
    Unsupported,
}

/// A session failure with its diagnosis context
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SessionError {
    /// Broad failure class
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Protocol active (or being probed) when the failure occurred
    pub protocol: Option<BusProtocol>,
    /// Raw adapter text involved, when any was captured
    pub raw: Option<String>,
    /// Milliseconds since the session was opened
    pub timestamp_ms: u64,
}

impl SessionError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            protocol: None,
            raw: None,
            timestamp_ms: 0,
        }
    }

    pub(crate) fn with_protocol(mut self, protocol: BusProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub(crate) fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub(crate) fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub(crate) fn from_adapter(e: AdapterError) -> Self {
        match e {
            AdapterError::Transport(inner) => {
                Self::new(ErrorKind::Channel, inner.to_string())
            }
            AdapterError::NoResponse {
                elapsed_ms,
                ref partial,
            } => Self::new(
                ErrorKind::Timeout,
                format!("no response within {elapsed_ms} ms"),
            )
            .with_raw(partial.clone()),
            other => Self::new(ErrorKind::Protocol, other.to_string()),
        }
    }

    pub(crate) fn from_frame(e: FrameError) -> Self {
        Self::new(ErrorKind::Protocol, e.to_string())
    }
}
