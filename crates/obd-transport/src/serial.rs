//! Serial Port Transport
//!
//! Live channel to an adapter attached via serial (or a USB/Bluetooth
//! serial bridge). 8N1 framing, which is what ELM-class adapters use.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::Transport;

/// Transport over a serial port
pub struct SerialTransport {
    port_name: String,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Open the named serial port at the given baud rate
    pub fn open(port_name: &str, baud: u32) -> Result<Self, TransportError> {
        info!("Opening serial port {} at {} baud", port_name, baud);
        let stream = tokio_serial::new(port_name, baud)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            port_name: port_name.to_string(),
            stream: Some(stream),
        })
    }

    /// The port identifier this transport was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn stream_mut(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_chunk(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; max_len];
        match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Ok(Vec::new()),
        }
    }

    async fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        debug!("Setting {} to {} baud", self.port_name, baud);
        self.stream_mut()?
            .set_baud_rate(baud)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn clear_rx_buffer(&mut self) -> Result<(), TransportError> {
        self.stream_mut()?
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            info!("Closing serial port {}", self.port_name);
            stream.shutdown().await.ok();
        }
        Ok(())
    }
}
