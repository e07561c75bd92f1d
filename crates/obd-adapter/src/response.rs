//! Adapter Reply Classification
//!
//! Every adapter exchange yields an [`AdapterResponse`]: the response
//! lines, the command they answer, and how long the exchange took.
//! Status lines the adapter mixes into its output are classified here,
//! so that callers above deal in one [`ReplyStatus`] per exchange.

use std::time::Duration;

use crate::error::AdapterError;

/// What an adapter exchange amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    /// At least one line of vehicle or adapter data
    Data,
    /// Command acknowledged with no data lines (e.g. a bare `OK`)
    Acknowledged,
    /// The vehicle did not answer the request
    NoData,
    /// The adapter aborted the command to service new bus traffic
    Stopped,
    /// The adapter did not recognize the command
    Unrecognized,
    /// The adapter could not establish a bus connection
    NoConnection,
    /// A bus-level fault, with the reported status text
    BusFault(String),
    /// The adapter receive buffer overflowed
    BufferFull,
    /// An internal adapter error code such as `ERR94`
    Hardware(String),
}

/// One complete exchange with the adapter
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    /// The command this response answers
    pub command: String,
    /// Response lines with echo and blank lines removed
    pub lines: Vec<String>,
    /// Time from write to prompt
    pub elapsed: Duration,
}

fn is_hardware_code(line: &str) -> bool {
    line.len() == 5
        && line.starts_with("ERR")
        && line[3..].bytes().all(|b| b.is_ascii_digit())
}

/// Classify one response line; `None` means it is a data line
fn classify_line(line: &str) -> Option<ReplyStatus> {
    match line {
        "NO DATA" => Some(ReplyStatus::NoData),
        "STOPPED" => Some(ReplyStatus::Stopped),
        "?" => Some(ReplyStatus::Unrecognized),
        "UNABLE TO CONNECT" => Some(ReplyStatus::NoConnection),
        "BUFFER FULL" => Some(ReplyStatus::BufferFull),
        "BUS ERROR" | "CAN ERROR" | "BUS BUSY" | "DATA ERROR" | "FB ERROR" => {
            Some(ReplyStatus::BusFault(line.to_string()))
        }
        l if is_hardware_code(l) => Some(ReplyStatus::Hardware(l.to_string())),
        _ => None,
    }
}

impl AdapterResponse {
    /// The overall status of this exchange. The first fault-class line
    /// wins; progress lines such as `SEARCHING...` never decide it.
    pub fn status(&self) -> ReplyStatus {
        let mut data = false;
        for line in &self.lines {
            if line.starts_with("SEARCHING") {
                continue;
            }
            match classify_line(line) {
                Some(status) => return status,
                None if line == "OK" => {}
                None => data = true,
            }
        }
        if data {
            ReplyStatus::Data
        } else {
            ReplyStatus::Acknowledged
        }
    }

    /// The lines carrying actual data: status and progress lines removed
    pub fn data_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| {
                !line.starts_with("SEARCHING")
                    && line.as_str() != "OK"
                    && classify_line(line).is_none()
            })
            .cloned()
            .collect()
    }

    /// Promote fault statuses to errors; `Ok` keeps data, no-data and
    /// acknowledged exchanges
    pub fn checked(self) -> Result<Self, AdapterError> {
        match self.status() {
            ReplyStatus::Data | ReplyStatus::Acknowledged | ReplyStatus::NoData => Ok(self),
            ReplyStatus::Stopped => Err(AdapterError::Busy {
                command: self.command,
            }),
            ReplyStatus::Unrecognized => Err(AdapterError::Rejected {
                command: self.command,
            }),
            ReplyStatus::NoConnection => Err(AdapterError::BusFault {
                status: "UNABLE TO CONNECT".to_string(),
            }),
            ReplyStatus::BusFault(status) => Err(AdapterError::BusFault { status }),
            ReplyStatus::BufferFull => Err(AdapterError::BufferFull),
            ReplyStatus::Hardware(code) => Err(AdapterError::Hardware { code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(lines: &[&str]) -> AdapterResponse {
        AdapterResponse {
            command: "0100".to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            elapsed: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_data_lines_win_over_progress() {
        let r = response(&["SEARCHING...", "41 00 BE 3E B8 11"]);
        assert_eq!(r.status(), ReplyStatus::Data);
        assert_eq!(r.data_lines(), vec!["41 00 BE 3E B8 11"]);
    }

    #[test]
    fn test_no_data_after_search() {
        let r = response(&["SEARCHING...", "NO DATA"]);
        assert_eq!(r.status(), ReplyStatus::NoData);
        assert!(r.data_lines().is_empty());
    }

    #[test]
    fn test_bare_ok_is_acknowledged() {
        let r = response(&["OK"]);
        assert_eq!(r.status(), ReplyStatus::Acknowledged);
    }

    #[test]
    fn test_fault_classification() {
        assert_eq!(response(&["STOPPED"]).status(), ReplyStatus::Stopped);
        assert_eq!(response(&["?"]).status(), ReplyStatus::Unrecognized);
        assert_eq!(
            response(&["CAN ERROR"]).status(),
            ReplyStatus::BusFault("CAN ERROR".to_string())
        );
        assert_eq!(
            response(&["BUFFER FULL"]).status(),
            ReplyStatus::BufferFull
        );
        assert_eq!(
            response(&["ERR94"]).status(),
            ReplyStatus::Hardware("ERR94".to_string())
        );
        assert_eq!(
            response(&["UNABLE TO CONNECT"]).status(),
            ReplyStatus::NoConnection
        );
    }

    #[test]
    fn test_err_prefix_without_digits_is_data() {
        // "ERRATIC" must not classify as a hardware code
        assert_eq!(response(&["ERRATIC"]).status(), ReplyStatus::Data);
    }

    #[test]
    fn test_checked_promotes_faults() {
        assert!(response(&["41 00 BE 3E B8 11"]).checked().is_ok());
        assert!(response(&["NO DATA"]).checked().is_ok());
        let err = response(&["STOPPED"]).checked().unwrap_err();
        assert!(matches!(err, AdapterError::Busy { .. }));
        let err = response(&["ERR94"]).checked().unwrap_err();
        assert!(matches!(err, AdapterError::Hardware { .. }));
    }
}
