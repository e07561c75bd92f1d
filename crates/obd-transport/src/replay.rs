//! Session Recording and Replay
//!
//! A recorded session is an ordered list of [`TraceRecord`]s: each byte
//! burst sent to or received from the adapter, with a timestamp.
//! [`RecordingTransport`] wraps any live transport and captures such a
//! trace; [`ReplayTransport`] plays one back as a deterministic
//! substitute channel for regression tests. Persisting a trace to disk
//! is the caller's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::Transport;

/// Direction of a recorded byte burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceDirection {
    /// Host to adapter
    Sent,
    /// Adapter to host
    Received,
}

/// One byte burst in a recorded session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Which way the bytes flowed
    pub direction: TraceDirection,
    /// The bytes, as text (adapter traffic is ASCII)
    pub text: String,
    /// Milliseconds since the start of the session
    pub timestamp_ms: u64,
}

impl TraceRecord {
    /// Record a host-to-adapter burst
    pub fn sent(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            direction: TraceDirection::Sent,
            text: text.into(),
            timestamp_ms,
        }
    }

    /// Record an adapter-to-host burst
    pub fn received(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            direction: TraceDirection::Received,
            text: text.into(),
            timestamp_ms,
        }
    }
}

/// Deterministic transport that replays a recorded session.
///
/// Writes are checked against the next `Sent` record and reads are fed
/// from `Received` records in order. A read issued while the script
/// expects a write (or after the script is exhausted) returns an empty
/// chunk, which the layer above experiences as a quiet line.
pub struct ReplayTransport {
    script: VecDeque<TraceRecord>,
    pending_rx: VecDeque<u8>,
    consumed: usize,
    open: bool,
    /// When false, writes are logged but not compared against the script
    strict: bool,
}

impl ReplayTransport {
    /// Build a replay channel from an ordered trace
    pub fn new(records: Vec<TraceRecord>) -> Self {
        Self {
            script: records.into(),
            pending_rx: VecDeque::new(),
            consumed: 0,
            open: true,
            strict: true,
        }
    }

    /// Build a replay channel that ignores differences in sent commands
    pub fn lenient(records: Vec<TraceRecord>) -> Self {
        let mut t = Self::new(records);
        t.strict = false;
        t
    }

    /// Number of script records consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Whether the entire script has been consumed
    pub fn exhausted(&self) -> bool {
        self.script.is_empty() && self.pending_rx.is_empty()
    }

    fn refill_rx(&mut self) {
        while self
            .script
            .front()
            .is_some_and(|r| r.direction == TraceDirection::Received)
        {
            if let Some(record) = self.script.pop_front() {
                self.pending_rx.extend(record.text.as_bytes());
                self.consumed += 1;
            }
        }
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let written = String::from_utf8_lossy(bytes).into_owned();
        debug!("replay write: {:?}", written);
        match self.script.pop_front() {
            Some(record) if record.direction == TraceDirection::Sent => {
                self.consumed += 1;
                if self.strict && record.text != written {
                    return Err(TransportError::ReplayMismatch {
                        index: self.consumed,
                        reason: format!("wrote {:?}, recording has {:?}", written, record.text),
                    });
                }
                Ok(())
            }
            Some(record) => Err(TransportError::ReplayMismatch {
                index: self.consumed + 1,
                reason: format!("wrote {:?} where recording received {:?}", written, record.text),
            }),
            None => {
                // Writing past the end of the script is tolerated so that a
                // test can end mid-conversation (e.g. after a timeout).
                warn!("replay write past end of script: {:?}", written);
                Ok(())
            }
        }
    }

    async fn read_chunk(
        &mut self,
        max_len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        if self.pending_rx.is_empty() {
            self.refill_rx();
        }
        let n = self.pending_rx.len().min(max_len);
        Ok(self.pending_rx.drain(..n).collect())
    }

    async fn set_baud_rate(&mut self, _baud: u32) -> Result<(), TransportError> {
        Ok(())
    }

    async fn clear_rx_buffer(&mut self) -> Result<(), TransportError> {
        self.pending_rx.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}

/// Wrapper that records all traffic passing through an inner transport
pub struct RecordingTransport {
    inner: Box<dyn Transport>,
    start: Instant,
    trace: Vec<TraceRecord>,
}

impl RecordingTransport {
    /// Wrap a transport and start recording
    pub fn new(inner: Box<dyn Transport>) -> Self {
        Self {
            inner,
            start: Instant::now(),
            trace: Vec::new(),
        }
    }

    /// The trace captured so far
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// Consume the wrapper, returning the captured trace
    pub fn into_trace(self) -> Vec<TraceRecord> {
        self.trace
    }

    fn log(&mut self, direction: TraceDirection, bytes: &[u8]) {
        self.trace.push(TraceRecord {
            direction,
            text: String::from_utf8_lossy(bytes).into_owned(),
            timestamp_ms: self.start.elapsed().as_millis() as u64,
        });
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.log(TraceDirection::Sent, bytes);
        self.inner.write(bytes).await
    }

    async fn read_chunk(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let chunk = self.inner.read_chunk(max_len, timeout).await?;
        if !chunk.is_empty() {
            self.log(TraceDirection::Received, &chunk);
        }
        Ok(chunk)
    }

    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        self.inner.set_baud_rate(baud).await
    }

    async fn clear_rx_buffer(&mut self) -> Result<(), TransportError> {
        self.inner.clear_rx_buffer().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}
