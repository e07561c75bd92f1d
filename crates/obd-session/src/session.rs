//! Protocol Session Controller
//!
//! Owns the lifecycle of one diagnostic conversation: adapter bring-up,
//! protocol selection (explicit or automatic search), connection
//! establishment, and request submission. The session holds the driver
//! exclusively, so there is exactly one request in flight at any time.
//! A submit that times out reports whatever decoded before the cutoff
//! and leaves the session connected; the driver drains any late bytes
//! before the next exchange. A channel failure closes the session.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use obd_adapter::{AdapterError, CommandDriver, ReplyStatus};
use obd_frame::{decode, encode, BusProtocol, DiagnosticRequest, AUTO_SEARCH_ORDER};

use crate::dispatch::{correlate, Submission};
use crate::error::{ErrorKind, SessionError};

/// Service identifier that erases stored trouble codes and freeze
/// frames; destructive, so it is refused unless explicitly enabled
const SID_CLEAR_DTC: u8 = 0x04;

/// Lifecycle of a diagnostic session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// No adapter conversation
    Closed,
    /// Adapter initialized, no protocol chosen
    Opened,
    /// A protocol is selected on the adapter but unproven
    ProtocolSelected,
    /// A probe succeeded; vehicle requests may be submitted
    Connected,
}

/// Session policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Protocol to use; [`BusProtocol::Auto`] searches the candidates
    pub protocol: BusProtocol,
    /// Permit service `0x04` (clear trouble codes) requests
    pub allow_clear_dtc: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol: BusProtocol::Auto,
            allow_clear_dtc: false,
        }
    }
}

/// One diagnostic conversation with one vehicle through one adapter
pub struct Session {
    driver: CommandDriver,
    config: SessionConfig,
    state: SessionState,
    /// Concrete protocol once connected; `Auto` before that
    protocol: BusProtocol,
    /// Whether responses carry frame headers; decoding needs them
    header_mode: bool,
    ident: Option<String>,
    started: Instant,
}

impl Session {
    /// Wrap an adapter driver in a closed session
    pub fn new(driver: CommandDriver, config: SessionConfig) -> Self {
        let protocol = config.protocol;
        Self {
            driver,
            config,
            state: SessionState::Closed,
            protocol,
            header_mode: true,
            ident: None,
            started: Instant::now(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The protocol in use; concrete only once connected
    pub fn protocol(&self) -> BusProtocol {
        self.protocol
    }

    /// Adapter identification banner, once opened
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn context(&self, mut e: SessionError) -> SessionError {
        if e.protocol.is_none() && self.protocol != BusProtocol::Auto {
            e = e.with_protocol(self.protocol);
        }
        e.at(self.now_ms())
    }

    /// Map a driver failure; a dead channel invalidates the session
    fn fail(&mut self, e: AdapterError) -> SessionError {
        let err = SessionError::from_adapter(e);
        if err.kind == ErrorKind::Channel {
            warn!("channel failure, closing session: {}", err);
            self.state = SessionState::Closed;
        }
        self.context(err)
    }

    fn state_err(&self, needed: &str) -> SessionError {
        self.context(SessionError::new(
            ErrorKind::InvalidState,
            format!(
                "operation requires a {needed} session, state is {:?}",
                self.state
            ),
        ))
    }

    /// Initialize the adapter and open the session: full reset, echo
    /// off, linefeeds off, headers on
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Closed {
            return Err(self.state_err("closed"));
        }
        self.started = Instant::now();
        let ident = self.driver.initialize().await.map_err(|e| self.fail(e))?;
        info!("session opened, adapter: {}", ident);
        self.ident = Some(ident);
        self.header_mode = true;
        self.state = SessionState::Opened;
        Ok(())
    }

    /// Choose the protocol for subsequent connects. Re-selecting the
    /// protocol already in effect is a no-op; selecting a different one
    /// drops any live connection.
    pub async fn set_protocol(&mut self, protocol: BusProtocol) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(self.state_err("open"));
        }
        if protocol == self.protocol && self.state >= SessionState::ProtocolSelected {
            debug!("protocol {} already selected", protocol);
            return Ok(());
        }
        if self.state == SessionState::Connected {
            self.driver
                .protocol_close()
                .await
                .map_err(|e| self.fail(e))?;
        }
        self.config.protocol = protocol;
        self.protocol = protocol;
        if protocol == BusProtocol::Auto {
            self.state = SessionState::Opened;
        } else {
            self.driver
                .try_protocol(protocol)
                .await
                .map_err(|e| self.fail(e))?;
            self.state = SessionState::ProtocolSelected;
        }
        Ok(())
    }

    /// Establish communication with the vehicle, searching protocols if
    /// the configured protocol is automatic. Returns the concrete
    /// protocol in effect. Connecting while connected is a no-op.
    pub async fn connect(&mut self) -> Result<BusProtocol, SessionError> {
        match self.state {
            SessionState::Closed => return Err(self.state_err("open")),
            SessionState::Connected => return Ok(self.protocol),
            SessionState::Opened | SessionState::ProtocolSelected => {}
        }
        if self.config.protocol == BusProtocol::Auto {
            self.auto_search().await
        } else {
            let protocol = self.config.protocol;
            if self.state != SessionState::ProtocolSelected {
                self.driver
                    .try_protocol(protocol)
                    .await
                    .map_err(|e| self.fail(e))?;
                self.state = SessionState::ProtocolSelected;
            }
            if self.probe(protocol).await? {
                self.protocol = protocol;
                self.state = SessionState::Connected;
                info!("connected on {}", protocol);
                Ok(protocol)
            } else {
                Err(self.context(
                    SessionError::new(
                        ErrorKind::ProtocolNotFound,
                        format!("vehicle did not answer on {protocol}"),
                    )
                    .with_protocol(protocol),
                ))
            }
        }
    }

    /// Try each search candidate once, in fixed order, until the
    /// vehicle answers a supported-PIDs probe. Exhaustion leaves the
    /// session opened for another attempt.
    async fn auto_search(&mut self) -> Result<BusProtocol, SessionError> {
        for candidate in AUTO_SEARCH_ORDER {
            debug!("probing {}", candidate);
            if let Err(e) = self.driver.try_protocol(candidate).await {
                if matches!(e, AdapterError::Transport(_)) {
                    return Err(self.fail(e));
                }
                warn!("adapter refused {}: {}", candidate, e);
                continue;
            }
            if self.probe(candidate).await? {
                // The adapter may have settled on a different variant
                // than the one probed (e.g. its own auto fallback), so
                // ask it which protocol is actually live.
                let settled = match self.driver.describe_protocol().await {
                    Ok(BusProtocol::Auto) | Err(_) => candidate,
                    Ok(p) => p,
                };
                self.protocol = settled;
                self.state = SessionState::Connected;
                info!("connected on {}", settled);
                return Ok(settled);
            }
        }
        self.state = SessionState::Opened;
        Err(self.context(SessionError::new(
            ErrorKind::ProtocolNotFound,
            "no candidate protocol produced a vehicle response",
        )))
    }

    /// Send the supported-PIDs request and check that at least one ECU
    /// gives a valid, correlated answer under the candidate protocol.
    /// Channel failures abort; anything else just fails the probe.
    async fn probe(&mut self, candidate: BusProtocol) -> Result<bool, SessionError> {
        let request = DiagnosticRequest::pid(0x01, 0x00);
        let text = encode(&request, candidate, self.driver.appends_checksum())
            .map_err(|e| self.context(SessionError::from_frame(e)))?;
        let response = match self.driver.request(&text).await {
            Ok(response) => response,
            Err(e @ AdapterError::Transport(_)) => return Err(self.fail(e)),
            Err(e) => {
                debug!("probe on {} failed: {}", candidate, e);
                return Ok(false);
            }
        };
        if response.status() != ReplyStatus::Data {
            return Ok(false);
        }
        let decoded = match decode(&response.data_lines(), candidate) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("probe decode on {} failed: {}", candidate, e);
                return Ok(false);
            }
        };
        Ok(decoded.iter().any(|r| r.valid && r.sid == request.sid))
    }

    /// Submit one diagnostic request and dispatch the responses.
    ///
    /// `protocol_override` changes which frame format this one exchange
    /// is encoded and decoded with; it does not re-negotiate the
    /// adapter's live protocol. It is meant for variants sharing the
    /// bus framing of the connected protocol (such as reading an
    /// ISO 14230-4 reply on an ISO 9141-2 connection). Switching to an
    /// incompatible framing goes through [`Session::set_protocol`].
    ///
    /// A timed-out exchange is not an error here: the submission comes
    /// back with `timed_out` set and whatever decoded before the
    /// cutoff, and the session stays connected.
    pub async fn submit(
        &mut self,
        request: &DiagnosticRequest,
        protocol_override: Option<BusProtocol>,
    ) -> Result<Submission, SessionError> {
        if self.state != SessionState::Connected {
            return Err(self.state_err("connected"));
        }
        if request.sid == SID_CLEAR_DTC && !self.config.allow_clear_dtc {
            return Err(self.context(SessionError::new(
                ErrorKind::Unsupported,
                "clearing trouble codes is disabled; enable allow_clear_dtc to permit it",
            )));
        }
        if let Some(header) = &request.header {
            if !self.header_mode {
                return Err(self.context(SessionError::new(
                    ErrorKind::Unsupported,
                    "explicit target headers require header mode",
                )));
            }
            self.driver
                .set_header(header)
                .await
                .map_err(|e| self.fail(e))?;
        }
        let protocol = protocol_override.unwrap_or(self.protocol);
        let text = encode(request, protocol, self.driver.appends_checksum())
            .map_err(|e| self.context(SessionError::from_frame(e)))?;

        let (lines, data_lines, no_data, timed_out, elapsed) =
            match self.driver.request(&text).await {
                Ok(response) => {
                    let no_data = response.status() == ReplyStatus::NoData;
                    let data = response.data_lines();
                    (response.lines, data, no_data, false, response.elapsed)
                }
                Err(AdapterError::NoResponse { elapsed_ms, partial }) => {
                    debug!("submit timed out after {} ms", elapsed_ms);
                    let lines: Vec<String> = partial
                        .split('\r')
                        .map(|l| l.trim_matches(['\n', ' ']).to_string())
                        .filter(|l| !l.is_empty())
                        .collect();
                    let data = lines
                        .iter()
                        .filter(|l| !l.starts_with("SEARCHING") && l.as_str() != "OK")
                        .cloned()
                        .collect();
                    (lines, data, false, true, Duration::from_millis(elapsed_ms))
                }
                Err(e) => return Err(self.fail(e)),
            };
        let decoded = if timed_out {
            // Partial output may end mid-message; keep what decodes
            decode(&data_lines, protocol).unwrap_or_default()
        } else {
            decode(&data_lines, protocol).map_err(|e| {
                self.context(SessionError::from_frame(e).with_raw(data_lines.join("\r")))
            })?
        };
        let (responses, unmatched) = correlate(request, decoded);
        Ok(Submission {
            request: request.clone(),
            responses,
            unmatched,
            no_data,
            timed_out,
            raw: lines,
            elapsed,
        })
    }

    /// Turn response headers on or off, optionally overriding the
    /// target header bytes for subsequent requests. Decoding expects
    /// headers on; with them off, explicit per-request headers are
    /// refused.
    pub async fn set_header_mode(
        &mut self,
        enabled: bool,
        header: Option<&[u8]>,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(self.state_err("open"));
        }
        if !enabled && header.is_some() {
            return Err(self.context(SessionError::new(
                ErrorKind::Unsupported,
                "target header bytes require header mode",
            )));
        }
        self.driver
            .set_headers(enabled)
            .await
            .map_err(|e| self.fail(e))?;
        if let Some(bytes) = header {
            self.driver.set_header(bytes).await.map_err(|e| self.fail(e))?;
        }
        self.header_mode = enabled;
        Ok(())
    }

    /// Change the per-request deadline
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.driver.set_timeout(timeout);
    }

    /// Turn adapter command echo on or off
    pub async fn set_echo(&mut self, on: bool) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(self.state_err("open"));
        }
        self.driver.set_echo(on).await.map_err(|e| self.fail(e))
    }

    /// Warm-reset the adapter and restore the expected line discipline;
    /// drops any live connection but keeps the session open
    pub async fn warm_reset(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(self.state_err("open"));
        }
        self.driver.warm_reset().await.map_err(|e| self.fail(e))?;
        self.driver.set_echo(false).await.map_err(|e| self.fail(e))?;
        self.driver
            .set_linefeeds(false)
            .await
            .map_err(|e| self.fail(e))?;
        self.driver.set_headers(true).await.map_err(|e| self.fail(e))?;
        self.header_mode = true;
        self.protocol = self.config.protocol;
        self.state = SessionState::Opened;
        Ok(())
    }

    /// End the diagnostic conversation: quiet the bus and leave the
    /// session closed. The channel itself stays open, so `open` can
    /// start a fresh conversation on the same adapter.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state < SessionState::ProtocolSelected {
            return Err(self.state_err("connected"));
        }
        self.driver
            .protocol_close()
            .await
            .map_err(|e| self.fail(e))?;
        self.protocol = self.config.protocol;
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Close the session and the underlying channel
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if self.state >= SessionState::ProtocolSelected {
            // Best effort; the channel is going away regardless
            if let Err(e) = self.driver.protocol_close().await {
                warn!("protocol close on shutdown failed: {}", e);
            }
        }
        self.driver.close().await.map_err(|e| self.fail(e))?;
        self.state = SessionState::Closed;
        Ok(())
    }
}
