//! Adapter Command Driver
//!
//! One command in flight at a time: write the command, poll the
//! transport in small windows until the prompt arrives or the deadline
//! passes, then tokenize and classify. A timed-out exchange leaves the
//! channel dirty; the next exchange drains stale bytes first so a late
//! reply can never be attributed to the wrong command.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use obd_frame::BusProtocol;
use obd_transport::Transport;

use crate::error::AdapterError;
use crate::profile::AdapterProfile;
use crate::response::{AdapterResponse, ReplyStatus};
use crate::tokenizer::LineTokenizer;

/// Baud rates to probe when detecting an adapter, most common first
pub const BAUD_CANDIDATES: [u32; 6] = [38_400, 9_600, 230_400, 115_200, 57_600, 19_200];

/// Line ending appended to outgoing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineTerminator {
    #[default]
    Cr,
    CrLf,
}

impl LineTerminator {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineTerminator::Cr => b"\r",
            LineTerminator::CrLf => b"\r\n",
        }
    }
}

/// Driver tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Deadline for one complete exchange
    pub timeout: Duration,
    /// Granularity of transport polling while waiting for the prompt
    pub poll_interval: Duration,
    /// Most bytes requested per transport read
    pub read_chunk: usize,
    /// Retries after the adapter interrupts a command with `STOPPED`
    pub retries: u8,
    /// Line ending for outgoing commands
    pub terminator: LineTerminator,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            read_chunk: 256,
            retries: 2,
            terminator: LineTerminator::Cr,
        }
    }
}

/// Serial command driver for one scan-tool adapter
pub struct CommandDriver {
    transport: Box<dyn Transport>,
    profile: Box<dyn AdapterProfile>,
    config: DriverConfig,
    tokenizer: LineTokenizer,
    /// Adapter-side echo state; power-on default is on
    echo: bool,
    /// Set after a timeout so the next exchange drains stale bytes
    dirty: bool,
}

impl CommandDriver {
    /// Drive the given adapter dialect over the given channel
    pub fn new(
        transport: Box<dyn Transport>,
        profile: Box<dyn AdapterProfile>,
        config: DriverConfig,
    ) -> Self {
        let tokenizer = LineTokenizer::new(profile.prompt());
        Self {
            transport,
            profile,
            config,
            tokenizer,
            echo: true,
            dirty: false,
        }
    }

    /// Whether the adapter hardware owns frame checksumming
    pub fn appends_checksum(&self) -> bool {
        self.profile.appends_checksum()
    }

    /// Change the per-exchange deadline
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Probe the candidate baud rates until the adapter answers with a
    /// prompt; leaves the channel at the detected rate
    pub async fn detect_baud_rate(&mut self) -> Result<u32, AdapterError> {
        let mut tried = Vec::new();
        for baud in BAUD_CANDIDATES {
            tried.push(baud);
            self.transport.set_baud_rate(baud).await?;
            self.transport.clear_rx_buffer().await?;
            self.transport.write(self.profile.wakeup()).await?;

            let started = Instant::now();
            let mut probe = LineTokenizer::new(self.profile.prompt());
            while started.elapsed() < self.config.timeout {
                let window = self.config.poll_interval;
                let chunk = self
                    .transport
                    .read_chunk(self.config.read_chunk, window)
                    .await?;
                if probe.push(&chunk) {
                    info!("adapter detected at {} baud", baud);
                    return Ok(baud);
                }
            }
            debug!("no prompt at {} baud", baud);
        }
        Err(AdapterError::NotDetected { tried })
    }

    /// Run one command, retrying when the adapter reports it was
    /// interrupted, and promote fault statuses to errors
    pub async fn command(&mut self, text: &str) -> Result<AdapterResponse, AdapterError> {
        let mut attempt = 0;
        loop {
            let response = self.exchange(text).await?;
            match response.status() {
                ReplyStatus::Stopped if attempt < self.config.retries => {
                    attempt += 1;
                    warn!("adapter stopped {:?}, retry {}", text, attempt);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                _ => return response.checked(),
            }
        }
    }

    /// Full reset to power-on defaults; returns the identification
    /// banner. Echo is back on afterwards until disabled again.
    pub async fn full_reset(&mut self) -> Result<String, AdapterError> {
        let response = self.command(&self.profile.full_reset()).await?;
        self.echo = true;
        banner(response)
    }

    /// Warm reset; like a full reset but the baud rate survives
    pub async fn warm_reset(&mut self) -> Result<String, AdapterError> {
        let response = self.command(&self.profile.warm_reset()).await?;
        self.echo = true;
        banner(response)
    }

    /// Read the adapter identification string
    pub async fn identify(&mut self) -> Result<String, AdapterError> {
        let response = self.command(&self.profile.identify()).await?;
        banner(response)
    }

    /// Reset the adapter and put it in the line discipline the stack
    /// expects: echo off, linefeeds off, headers on
    pub async fn initialize(&mut self) -> Result<String, AdapterError> {
        let ident = self.full_reset().await?;
        self.set_echo(false).await?;
        self.set_linefeeds(false).await?;
        self.set_headers(true).await?;
        info!("adapter initialized: {}", ident);
        Ok(ident)
    }

    /// Turn adapter command echo on or off
    pub async fn set_echo(&mut self, on: bool) -> Result<(), AdapterError> {
        let cmd = self.profile.set_echo(on);
        self.command(&cmd).await?;
        self.echo = on;
        Ok(())
    }

    /// Turn linefeeds after carriage returns on or off
    pub async fn set_linefeeds(&mut self, on: bool) -> Result<(), AdapterError> {
        let cmd = self.profile.set_linefeeds(on);
        self.command(&cmd).await?;
        Ok(())
    }

    /// Turn frame headers in responses on or off
    pub async fn set_headers(&mut self, on: bool) -> Result<(), AdapterError> {
        let cmd = self.profile.set_headers(on);
        self.command(&cmd).await?;
        Ok(())
    }

    /// Select the protocol to use for the next vehicle request
    pub async fn try_protocol(&mut self, protocol: BusProtocol) -> Result<(), AdapterError> {
        let cmd = self.profile.try_protocol(protocol);
        self.command(&cmd).await?;
        Ok(())
    }

    /// Ask which protocol the adapter is currently using. An `A` prefix
    /// (protocol found by auto-search) is accepted and stripped.
    pub async fn describe_protocol(&mut self) -> Result<BusProtocol, AdapterError> {
        let cmd = self.profile.describe_protocol();
        let response = self.command(&cmd).await?;
        let line = match response.data_lines().first() {
            Some(line) => line.clone(),
            None => String::new(),
        };
        let code = line.strip_prefix('A').unwrap_or(&line);
        let protocol = code
            .chars()
            .next()
            .filter(|_| code.len() == 1)
            .and_then(BusProtocol::from_adapter_code);
        protocol.ok_or(AdapterError::Malformed {
            command: cmd,
            reply: line,
        })
    }

    /// Override the header bytes on outgoing requests
    pub async fn set_header(&mut self, header: &[u8]) -> Result<(), AdapterError> {
        let cmd = self.profile.set_header(header);
        self.command(&cmd).await?;
        Ok(())
    }

    /// Close the active protocol session, quieting the bus
    pub async fn protocol_close(&mut self) -> Result<(), AdapterError> {
        let cmd = self.profile.protocol_close();
        self.command(&cmd).await?;
        Ok(())
    }

    /// Send a vehicle request (hex message text) and return the raw
    /// exchange; `NO DATA` comes back as a normal response with no
    /// data lines
    pub async fn request(&mut self, text: &str) -> Result<AdapterResponse, AdapterError> {
        self.command(text).await
    }

    /// Close the underlying channel
    pub async fn close(&mut self) -> Result<(), AdapterError> {
        self.transport.close().await?;
        Ok(())
    }

    async fn exchange(&mut self, text: &str) -> Result<AdapterResponse, AdapterError> {
        if self.dirty {
            debug!("draining stale bytes from previous timed-out exchange");
            self.transport.clear_rx_buffer().await?;
            self.tokenizer.take_lines();
            self.dirty = false;
        }

        let started = Instant::now();
        let mut wire = text.as_bytes().to_vec();
        wire.extend_from_slice(self.config.terminator.as_bytes());
        self.transport.write(&wire).await?;
        debug!("sent {:?}", text);

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                self.dirty = true;
                let partial = self.tokenizer.partial();
                self.tokenizer.take_lines();
                return Err(AdapterError::NoResponse {
                    elapsed_ms: elapsed.as_millis() as u64,
                    partial,
                });
            }
            let window = self.config.poll_interval.min(self.config.timeout - elapsed);
            let chunk = self
                .transport
                .read_chunk(self.config.read_chunk, window)
                .await?;
            if self.tokenizer.push(&chunk) {
                break;
            }
        }

        let mut lines = self.tokenizer.take_lines();
        if self.echo {
            if lines.first().map(String::as_str) == Some(text) {
                lines.remove(0);
            } else {
                return Err(AdapterError::EchoMismatch {
                    sent: text.to_string(),
                    echoed: lines.first().cloned().unwrap_or_default(),
                });
            }
        }
        let response = AdapterResponse {
            command: text.to_string(),
            lines,
            elapsed: started.elapsed(),
        };
        debug!("exchange done in {:?}: {:?}", response.elapsed, response.lines);
        Ok(response)
    }
}

fn banner(response: AdapterResponse) -> Result<String, AdapterError> {
    match response.data_lines().first() {
        Some(line) => Ok(line.clone()),
        None => Err(AdapterError::Malformed {
            command: response.command,
            reply: response.lines.join("\r"),
        }),
    }
}
