//! Adapter Driver Error Types

use thiserror::Error;

use obd_transport::TransportError;

/// Errors raised by the adapter command driver
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The underlying channel failed
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// No prompt arrived within the command deadline
    #[error("No response within {elapsed_ms} ms (partial: {partial:?})")]
    NoResponse { elapsed_ms: u64, partial: String },

    /// The adapter did not recognize the command
    #[error("Adapter rejected command {command:?}")]
    Rejected { command: String },

    /// The adapter interrupted the command to handle new bus traffic
    #[error("Adapter busy, command {command:?} stopped")]
    Busy { command: String },

    /// The adapter reported a bus-level fault
    #[error("Bus fault: {status}")]
    BusFault { status: String },

    /// The adapter reported an internal hardware error
    #[error("Adapter hardware error {code}")]
    Hardware { code: String },

    /// The adapter receive buffer overflowed before the host drained it
    #[error("Adapter receive buffer overflowed")]
    BufferFull,

    /// The command echo did not match what was sent
    #[error("Echo mismatch: sent {sent:?}, adapter echoed {echoed:?}")]
    EchoMismatch { sent: String, echoed: String },

    /// No ELM-class adapter answered at any candidate baud rate
    #[error("No adapter detected (tried {tried:?} baud)")]
    NotDetected { tried: Vec<u32> },

    /// An adapter reply could not be interpreted
    #[error("Malformed adapter reply to {command:?}: {reply:?}")]
    Malformed { command: String, reply: String },
}
