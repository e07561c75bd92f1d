//! Transport Error Types

use thiserror::Error;

/// Errors that can occur on the byte-stream channel
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Failed to open the physical port
    #[error("Failed to open port {port}: {reason}")]
    Open { port: String, reason: String },

    /// Operation attempted on a closed channel
    #[error("Channel is closed")]
    Closed,

    /// Read or write failure on an open channel
    #[error("Channel I/O error: {0}")]
    Io(String),

    /// Replay transport saw traffic that diverges from the recording
    #[error("Replay divergence at record {index}: {reason}")]
    ReplayMismatch { index: usize, reason: String },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
