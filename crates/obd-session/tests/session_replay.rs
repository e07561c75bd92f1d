//! End-to-end session tests against recorded adapter conversations.
//!
//! Each test scripts a full exchange with a replay transport in strict
//! mode, so a test passing also proves the exact command sequence the
//! stack produced.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use obd_adapter::{CommandDriver, DriverConfig, Elm327};
use obd_frame::{BusProtocol, DiagnosticRequest};
use obd_session::{ErrorKind, Session, SessionConfig, SessionState};
use obd_transport::{ReplayTransport, TraceRecord, Transport, TransportError};

fn session_with(records: Vec<TraceRecord>, config: SessionConfig) -> Session {
    let driver = CommandDriver::new(
        Box::new(ReplayTransport::new(records)),
        Box::new(Elm327),
        DriverConfig {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            ..DriverConfig::default()
        },
    );
    Session::new(driver, config)
}

/// Adapter bring-up: reset, echo off, linefeeds off, headers on
fn preamble() -> Vec<TraceRecord> {
    vec![
        TraceRecord::sent("ATZ\r", 0),
        TraceRecord::received("ATZ\r\rELM327 v1.5\r\r>", 1),
        TraceRecord::sent("ATE0\r", 2),
        TraceRecord::received("ATE0\rOK\r\r>", 3),
        TraceRecord::sent("ATL0\r", 4),
        TraceRecord::received("OK\r\r>", 5),
        TraceRecord::sent("ATH1\r", 6),
        TraceRecord::received("OK\r\r>", 7),
    ]
}

/// Auto-search finding 11-bit CAN on the first candidate
fn can_connect() -> Vec<TraceRecord> {
    vec![
        TraceRecord::sent("ATTP 6\r", 10),
        TraceRecord::received("OK\r\r>", 11),
        TraceRecord::sent("01 00\r", 12),
        TraceRecord::received("SEARCHING...\r7E8 06 41 00 BE 3E B8 11\r\r>", 13),
        TraceRecord::sent("ATDPN\r", 14),
        TraceRecord::received("A6\r\r>", 15),
    ]
}

#[tokio::test]
async fn test_auto_search_connects_on_can() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("01 0C\r", 20));
    script.push(TraceRecord::received("7E8 04 41 0C 1A F8\r\r>", 21));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    assert_eq!(s.ident(), Some("ELM327 v1.5"));

    let protocol = s.connect().await.unwrap();
    assert_eq!(protocol, BusProtocol::Iso15765_4Can11Bit);
    assert_eq!(s.state(), SessionState::Connected);

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x0C), None)
        .await
        .unwrap();
    assert_eq!(submission.responses.len(), 1);
    assert!(!submission.timed_out);
    let r = submission.first().unwrap();
    assert_eq!(r.source, 0x7E8);
    assert_eq!(r.sid, 0x01);
    assert_eq!(r.pid(), Some(0x0C));
    assert_eq!(r.payload(), &[0x0C, 0x1A, 0xF8]);
}

#[tokio::test]
async fn test_auto_search_falls_through_to_iso9141() {
    let mut script = preamble();
    for (i, code) in ['6', '7', '1', '2'].into_iter().enumerate() {
        let t = 10 + 4 * i as u64;
        script.push(TraceRecord::sent(format!("ATTP {code}\r"), t));
        script.push(TraceRecord::received("OK\r\r>", t + 1));
        script.push(TraceRecord::sent("01 00\r", t + 2));
        script.push(TraceRecord::received("NO DATA\r\r>", t + 3));
    }
    script.extend(vec![
        TraceRecord::sent("ATTP 3\r", 30),
        TraceRecord::received("OK\r\r>", 31),
        TraceRecord::sent("01 00\r", 32),
        TraceRecord::received("48 6B 10 41 00 BE 3E B8 11 C9\r\r>", 33),
        TraceRecord::sent("ATDPN\r", 34),
        TraceRecord::received("A3\r\r>", 35),
    ]);

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    let protocol = s.connect().await.unwrap();
    assert_eq!(protocol, BusProtocol::Iso9141_2);
}

#[tokio::test]
async fn test_auto_search_exhaustion_reports_protocol_not_found() {
    let mut script = preamble();
    for (i, code) in ['6', '7', '1', '2', '3', '5'].into_iter().enumerate() {
        let t = 10 + 4 * i as u64;
        script.push(TraceRecord::sent(format!("ATTP {code}\r"), t));
        script.push(TraceRecord::received("OK\r\r>", t + 1));
        script.push(TraceRecord::sent("01 00\r", t + 2));
        script.push(TraceRecord::received("NO DATA\r\r>", t + 3));
    }

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    let err = s.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ProtocolNotFound);
    // each candidate was probed exactly once, and the session can try
    // again later
    assert_eq!(s.state(), SessionState::Opened);
}

#[tokio::test]
async fn test_timeout_submission_leaves_session_connected() {
    let mut script = preamble();
    script.extend(can_connect());
    // the vehicle never answers 01 0C; the next submit still works
    script.push(TraceRecord::sent("01 0C\r", 20));
    script.push(TraceRecord::sent("01 05\r", 30));
    script.push(TraceRecord::received("7E8 03 41 05 5A\r\r>", 31));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x0C), None)
        .await
        .unwrap();
    assert!(submission.timed_out);
    assert!(!submission.answered());
    assert_eq!(s.state(), SessionState::Connected);

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x05), None)
        .await
        .unwrap();
    assert!(submission.answered());
    assert!(!submission.timed_out);
}

#[tokio::test]
async fn test_timeout_submission_keeps_frames_decoded_so_far() {
    let mut script = preamble();
    script.extend(can_connect());
    // one ECU answers, then the exchange stalls before the prompt
    script.push(TraceRecord::sent("01 0C\r", 20));
    script.push(TraceRecord::received("7E8 04 41 0C 1A F8\r", 21));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x0C), None)
        .await
        .unwrap();
    assert!(submission.timed_out);
    assert_eq!(submission.responses.len(), 1);
    assert_eq!(submission.first().unwrap().source, 0x7E8);
}

#[tokio::test]
async fn test_set_protocol_is_idempotent() {
    let mut script = preamble();
    // exactly one ATTP despite two set_protocol calls, and no ATDPN
    // because the protocol was explicit
    script.extend(vec![
        TraceRecord::sent("ATTP 6\r", 10),
        TraceRecord::received("OK\r\r>", 11),
        TraceRecord::sent("01 00\r", 12),
        TraceRecord::received("7E8 06 41 00 BE 3E B8 11\r\r>", 13),
    ]);

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.set_protocol(BusProtocol::Iso15765_4Can11Bit)
        .await
        .unwrap();
    s.set_protocol(BusProtocol::Iso15765_4Can11Bit)
        .await
        .unwrap();
    let protocol = s.connect().await.unwrap();
    assert_eq!(protocol, BusProtocol::Iso15765_4Can11Bit);
}

#[tokio::test]
async fn test_set_protocol_after_auto_search_is_a_no_op() {
    let mut script = preamble();
    script.extend(can_connect());
    // no adapter traffic between connect and the submit below
    script.push(TraceRecord::sent("01 0C\r", 20));
    script.push(TraceRecord::received("7E8 04 41 0C 1A F8\r\r>", 21));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    let settled = s.connect().await.unwrap();
    assert_eq!(settled, BusProtocol::Iso15765_4Can11Bit);

    // re-selecting the protocol the search settled on must neither
    // close the connection nor renegotiate
    s.set_protocol(BusProtocol::Iso15765_4Can11Bit)
        .await
        .unwrap();
    assert_eq!(s.state(), SessionState::Connected);

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x0C), None)
        .await
        .unwrap();
    assert!(submission.answered());
}

/// Scripted transport whose reply to each write becomes readable only
/// after a per-exchange delay, like a slow adapter. Bytes past their
/// arrival time sit in an rx buffer until read or flushed, the way a
/// serial input buffer behaves.
struct LateReplyTransport {
    script: VecDeque<(&'static str, &'static str, Duration)>,
    arrivals: VecDeque<(Instant, Vec<u8>)>,
    rx: VecDeque<u8>,
    open: bool,
}

impl LateReplyTransport {
    fn new(script: Vec<(&'static str, &'static str, Duration)>) -> Self {
        Self {
            script: script.into(),
            arrivals: VecDeque::new(),
            rx: VecDeque::new(),
            open: true,
        }
    }

    fn promote_due(&mut self) {
        let now = Instant::now();
        while self.arrivals.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, bytes)) = self.arrivals.pop_front() {
                self.rx.extend(bytes);
            }
        }
    }
}

#[async_trait]
impl Transport for LateReplyTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let (expected, reply, delay) = self.script.pop_front().unwrap();
        assert_eq!(String::from_utf8_lossy(bytes), expected);
        self.arrivals
            .push_back((Instant::now() + delay, reply.as_bytes().to_vec()));
        Ok(())
    }

    async fn read_chunk(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.promote_due();
        if self.rx.is_empty() {
            tokio::time::sleep(timeout).await;
            self.promote_due();
        }
        let n = self.rx.len().min(max_len);
        Ok(self.rx.drain(..n).collect())
    }

    async fn set_baud_rate(&mut self, _baud: u32) -> Result<(), TransportError> {
        Ok(())
    }

    async fn clear_rx_buffer(&mut self) -> Result<(), TransportError> {
        self.promote_due();
        self.rx.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}

#[tokio::test]
async fn test_stale_reply_after_timeout_is_drained_before_next_submit() {
    let script = vec![
        ("ATZ\r", "ATZ\r\rELM327 v1.5\r\r>", Duration::ZERO),
        ("ATE0\r", "ATE0\rOK\r\r>", Duration::ZERO),
        ("ATL0\r", "OK\r\r>", Duration::ZERO),
        ("ATH1\r", "OK\r\r>", Duration::ZERO),
        ("ATTP 6\r", "OK\r\r>", Duration::ZERO),
        (
            "01 00\r",
            "SEARCHING...\r7E8 06 41 00 BE 3E B8 11\r\r>",
            Duration::ZERO,
        ),
        ("ATDPN\r", "A6\r\r>", Duration::ZERO),
        // the 01 0C answer lands well past the 100 ms deadline
        ("01 0C\r", "7E8 04 41 0C 1A F8\r\r>", Duration::from_millis(250)),
        ("01 05\r", "7E8 03 41 05 5A\r\r>", Duration::ZERO),
    ];
    let driver = CommandDriver::new(
        Box::new(LateReplyTransport::new(script)),
        Box::new(Elm327),
        DriverConfig {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            ..DriverConfig::default()
        },
    );
    let mut s = Session::new(driver, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x0C), None)
        .await
        .unwrap();
    assert!(submission.timed_out);
    assert!(!submission.answered());

    // the stale answer reaches the rx buffer while the session is idle
    tokio::time::sleep(Duration::from_millis(250)).await;

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x05), None)
        .await
        .unwrap();
    assert_eq!(submission.responses.len(), 1);
    assert_eq!(submission.first().unwrap().pid(), Some(0x05));
    assert!(submission.unmatched.is_empty());
    assert!(submission.raw.iter().all(|l| !l.contains("41 0C")));
}

#[tokio::test]
async fn test_protocol_override_reframes_one_exchange() {
    let mut script = preamble();
    script.extend(vec![
        TraceRecord::sent("ATTP 3\r", 10),
        TraceRecord::received("OK\r\r>", 11),
        TraceRecord::sent("01 00\r", 12),
        TraceRecord::received("48 6B 10 41 00 BE 3E B8 11 C9\r\r>", 13),
        // the override exchange goes out with no renegotiation
        TraceRecord::sent("01 0C\r", 20),
        TraceRecord::received("87 F1 10 41 0C 1A F8 E7\r\r>", 21),
    ]);

    let config = SessionConfig {
        protocol: BusProtocol::Iso9141_2,
        ..SessionConfig::default()
    };
    let mut s = session_with(script, config);
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(
            &DiagnosticRequest::pid(0x01, 0x0C),
            Some(BusProtocol::Iso14230_4Fast),
        )
        .await
        .unwrap();
    assert!(submission.answered());
    assert_eq!(submission.first().unwrap().source, 0x10);
    // the session's negotiated protocol is untouched
    assert_eq!(s.protocol(), BusProtocol::Iso9141_2);
}

#[tokio::test]
async fn test_clear_dtc_requires_opt_in() {
    let mut script = preamble();
    script.extend(can_connect());

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    // refused before any byte goes out; the strict script has no
    // record for it
    let err = s
        .submit(&DiagnosticRequest::sid(0x04), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert_eq!(s.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_clear_dtc_allowed_when_enabled() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("04\r", 20));
    script.push(TraceRecord::received("7E8 01 44\r\r>", 21));

    let config = SessionConfig {
        allow_clear_dtc: true,
        ..SessionConfig::default()
    };
    let mut s = session_with(script, config);
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::sid(0x04), None)
        .await
        .unwrap();
    assert!(submission.answered());
    assert_eq!(submission.first().unwrap().sid, 0x04);
}

#[tokio::test]
async fn test_checksum_failure_is_flagged_not_dropped() {
    let mut script = preamble();
    script.extend(vec![
        TraceRecord::sent("ATTP 3\r", 10),
        TraceRecord::received("OK\r\r>", 11),
        TraceRecord::sent("01 00\r", 12),
        TraceRecord::received("48 6B 10 41 00 BE 3E B8 11 C9\r\r>", 13),
        TraceRecord::sent("01 00\r", 20),
        TraceRecord::received(
            "48 6B 10 41 00 BE 3E B8 11 C9\r48 6B 18 41 00 80 00 00 00 00\r\r>",
            21,
        ),
    ]);

    let config = SessionConfig {
        protocol: BusProtocol::Iso9141_2,
        ..SessionConfig::default()
    };
    let mut s = session_with(script, config);
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::pid(0x01, 0x00), None)
        .await
        .unwrap();
    assert_eq!(submission.responses.len(), 1);
    assert_eq!(submission.responses[0].source, 0x10);
    assert_eq!(submission.unmatched.len(), 1);
    assert!(!submission.unmatched[0].valid);
    assert_eq!(submission.unmatched[0].source, 0x18);
}

#[tokio::test]
async fn test_multi_frame_vin_response() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("09 02\r", 20));
    script.push(TraceRecord::received(
        "7E8 10 14 49 02 01 31 47 31\r7E8 21 4A 43 35 34 34 34 52\r7E8 22 37 32 35 32 33 36 37\r\r>",
        21,
    ));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let submission = s
        .submit(&DiagnosticRequest::pid(0x09, 0x02), None)
        .await
        .unwrap();
    assert_eq!(submission.responses.len(), 1);
    let r = submission.first().unwrap();
    assert_eq!(r.sid, 0x09);
    assert_eq!(r.data.len(), 0x14);
    assert_eq!(&r.data[..3], &[0x49, 0x02, 0x01]);
}

#[tokio::test]
async fn test_submit_with_explicit_header() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("ATSH 07DF\r", 20));
    script.push(TraceRecord::received("OK\r\r>", 21));
    script.push(TraceRecord::sent("01 05\r", 22));
    script.push(TraceRecord::received("7E8 03 41 05 5A\r\r>", 23));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();

    let request = DiagnosticRequest::pid(0x01, 0x05).with_header(vec![0x07, 0xDF]);
    let submission = s.submit(&request, None).await.unwrap();
    assert!(submission.answered());
}

#[tokio::test]
async fn test_explicit_header_refused_without_header_mode() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("ATH0\r", 20));
    script.push(TraceRecord::received("OK\r\r>", 21));

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();
    s.set_header_mode(false, None).await.unwrap();

    let request = DiagnosticRequest::pid(0x01, 0x05).with_header(vec![0x07, 0xDF]);
    let err = s.submit(&request, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[tokio::test]
async fn test_disconnect_closes_session_and_reopen_works() {
    let mut script = preamble();
    script.extend(can_connect());
    script.push(TraceRecord::sent("ATPC\r", 20));
    script.push(TraceRecord::received("OK\r\r>", 21));
    // second bring-up: echo is still off when ATZ goes out, and back on
    // (power-on default) for the ATE0 that follows
    script.extend(vec![
        TraceRecord::sent("ATZ\r", 30),
        TraceRecord::received("ELM327 v1.5\r\r>", 31),
        TraceRecord::sent("ATE0\r", 32),
        TraceRecord::received("ATE0\rOK\r\r>", 33),
        TraceRecord::sent("ATL0\r", 34),
        TraceRecord::received("OK\r\r>", 35),
        TraceRecord::sent("ATH1\r", 36),
        TraceRecord::received("OK\r\r>", 37),
    ]);
    script.extend(can_connect());

    let mut s = session_with(script, SessionConfig::default());
    s.open().await.unwrap();
    s.connect().await.unwrap();
    s.disconnect().await.unwrap();
    assert_eq!(s.state(), SessionState::Closed);

    s.open().await.unwrap();
    let protocol = s.connect().await.unwrap();
    assert_eq!(protocol, BusProtocol::Iso15765_4Can11Bit);
}
