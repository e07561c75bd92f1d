//! Response Dispatcher
//!
//! One request goes out, any number of ECUs answer. The dispatcher
//! correlates decoded responses to the request by the echoed service
//! identifier (and parameter identifier, when the request carried one).
//! Responses that fail correlation or checksum validation are kept in a
//! separate bin rather than dropped, so nothing the bus said is lost.

use std::time::Duration;

use obd_frame::{DiagnosticRequest, DiagnosticResponse};
use tracing::warn;

/// The outcome of one submitted request
#[derive(Debug, Clone)]
pub struct Submission {
    /// The request that was sent
    pub request: DiagnosticRequest,
    /// Valid responses whose SID (and PID) echo the request, one per
    /// responding ECU frame, in arrival order
    pub responses: Vec<DiagnosticResponse>,
    /// Responses that were invalid or did not correlate, kept for
    /// diagnosis
    pub unmatched: Vec<DiagnosticResponse>,
    /// True when the adapter reported the vehicle did not answer
    pub no_data: bool,
    /// True when the deadline passed before the exchange completed;
    /// `responses` holds whatever decoded before the cutoff
    pub timed_out: bool,
    /// Every raw line of the exchange, status lines included
    pub raw: Vec<String>,
    /// Time the exchange took at the adapter
    pub elapsed: Duration,
}

impl Submission {
    /// Whether any ECU gave a usable answer
    pub fn answered(&self) -> bool {
        !self.responses.is_empty()
    }

    /// The first correlated response, for the common single-ECU case
    pub fn first(&self) -> Option<&DiagnosticResponse> {
        self.responses.first()
    }
}

/// Split decoded responses into correlated and uncorrelated bins
pub fn correlate(
    request: &DiagnosticRequest,
    decoded: Vec<DiagnosticResponse>,
) -> (Vec<DiagnosticResponse>, Vec<DiagnosticResponse>) {
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for response in decoded {
        let sid_echoed = response.valid && response.sid == request.sid;
        let pid_echoed = match request.pid {
            Some(pid) => response.pid() == Some(pid),
            None => true,
        };
        if sid_echoed && pid_echoed {
            matched.push(response);
        } else {
            warn!(
                "uncorrelated response from {:#05X}: {:?}",
                response.source, response.raw
            );
            unmatched.push(response);
        }
    }
    (matched, unmatched)
}
