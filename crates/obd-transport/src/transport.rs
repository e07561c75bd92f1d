//! The Channel Seam
//!
//! One trait covers everything the protocol stack needs from a physical
//! link: write bytes out, read bytes back under a deadline, and manage
//! the port lifecycle. The adapter driver owns prompt detection and
//! overall timeouts; a transport only bounds individual reads.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;

/// Byte-stream channel to a scan-tool adapter.
///
/// Implementations must be half-duplex friendly: a `read_chunk` that
/// finds no data within `timeout` returns an empty buffer rather than
/// an error, because the caller decides what silence means.
#[async_trait]
pub trait Transport: Send {
    /// Whether the channel is currently open
    fn is_open(&self) -> bool;

    /// Write the given bytes to the channel
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_len` bytes, waiting at most `timeout`.
    ///
    /// Returns as soon as any data is available; returns an empty buffer
    /// if the window elapses with no data.
    async fn read_chunk(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Change the channel baud rate
    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError>;

    /// Discard any bytes already received but not yet read
    async fn clear_rx_buffer(&mut self) -> Result<(), TransportError>;

    /// Close the channel; subsequent operations fail with `Closed`
    async fn close(&mut self) -> Result<(), TransportError>;
}
