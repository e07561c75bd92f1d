//! Request Encoding and Response Decoding
//!
//! `encode` turns a [`DiagnosticRequest`] into the hex command text the
//! adapter transmits as a raw bus frame. `decode` walks the response
//! lines of one exchange and produces per-ECU [`DiagnosticResponse`]s,
//! reassembling CAN multi-frame messages and flagging checksum
//! failures without discarding them.

use tracing::{debug, warn};

use crate::error::FrameError;
use crate::frame::RawFrame;
use crate::isotp::{self, Pci};
use crate::message::{DiagnosticRequest, DiagnosticResponse, RESPONSE_SID_BIT};
use crate::protocol::BusProtocol;

/// Encode a request as adapter command text for the active protocol.
///
/// Header bytes are omitted; the adapter computes them (an explicit
/// target goes through the set-header adapter operation instead). A
/// trailing checksum byte is appended only when the adapter does not
/// checksum in hardware (`adapter_appends_checksum == false`).
pub fn encode(
    request: &DiagnosticRequest,
    protocol: BusProtocol,
    adapter_appends_checksum: bool,
) -> Result<String, FrameError> {
    let caps = protocol.caps().ok_or(FrameError::AutoProtocol)?;
    let mut message = request.message_bytes();

    if message.len() > caps.max_frame_payload {
        return Err(if caps.multi_frame {
            // Receive-side reassembly exists, but multi-frame transmit
            // does not; reject rather than truncate.
            FrameError::PayloadTooLarge {
                protocol,
                len: message.len(),
                max: caps.max_frame_payload,
            }
        } else {
            FrameError::MultiFrameUnsupported(protocol)
        });
    }

    if !adapter_appends_checksum {
        if let Some(checksum) = caps.checksum.compute(&message) {
            message.push(checksum);
        }
    }

    let text = message
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    debug!("encoded {:?} as {:?} on {}", request, text, protocol);
    Ok(text)
}

/// Decode the data lines of one adapter exchange into per-ECU
/// responses, in frame arrival order (CAN consecutive frames are
/// reordered by sequence number within their message).
///
/// Lines that fail to parse or fail checksum validation are represented
/// as invalid responses rather than dropped. A failed multi-frame
/// reassembly is an error for the whole decode.
pub fn decode(
    lines: &[String],
    protocol: BusProtocol,
) -> Result<Vec<DiagnosticResponse>, FrameError> {
    if protocol.caps().ok_or(FrameError::AutoProtocol)?.multi_frame {
        decode_can(lines, protocol)
    } else {
        decode_legacy(lines, protocol)
    }
}

fn invalid_line(line: &str) -> DiagnosticResponse {
    DiagnosticResponse {
        source: 0,
        sid: 0,
        data: Vec::new(),
        valid: false,
        raw: line.to_string(),
    }
}

fn decode_legacy(
    lines: &[String],
    protocol: BusProtocol,
) -> Result<Vec<DiagnosticResponse>, FrameError> {
    let mut responses = Vec::new();
    for line in lines {
        match RawFrame::parse_line(line, protocol) {
            Ok(frame) => {
                if !frame.checksum_ok {
                    warn!("checksum failure on {}: {:?}", protocol, line);
                }
                responses.push(DiagnosticResponse {
                    source: frame.source,
                    sid: frame.data[0] & !RESPONSE_SID_BIT,
                    data: frame.data,
                    valid: frame.checksum_ok,
                    raw: frame.raw_line,
                });
            }
            Err(e) => {
                warn!("unparseable line on {}: {:?} ({})", protocol, line, e);
                responses.push(invalid_line(line));
            }
        }
    }
    Ok(responses)
}

/// A multi-frame message being collected for one source address
struct PendingMessage {
    first: RawFrame,
    consecutive: Vec<RawFrame>,
    /// Output position reserved when the first frame arrived
    slot: usize,
    raw: Vec<String>,
}

fn decode_can(
    lines: &[String],
    protocol: BusProtocol,
) -> Result<Vec<DiagnosticResponse>, FrameError> {
    let mut out: Vec<Option<DiagnosticResponse>> = Vec::new();
    let mut pending: Vec<(u32, PendingMessage)> = Vec::new();

    for line in lines {
        let frame = match RawFrame::parse_line(line, protocol) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("unparseable line on {}: {:?} ({})", protocol, line, e);
                out.push(Some(invalid_line(line)));
                continue;
            }
        };
        match Pci::parse(&frame.data) {
            Ok(Pci::Single { len }) => {
                if frame.data.len() < 1 + len {
                    warn!("single frame shorter than its PCI length: {:?}", line);
                    out.push(Some(DiagnosticResponse {
                        source: frame.source,
                        sid: 0,
                        data: frame.data[1..].to_vec(),
                        valid: false,
                        raw: frame.raw_line,
                    }));
                    continue;
                }
                let data = frame.data[1..1 + len].to_vec();
                out.push(Some(DiagnosticResponse {
                    source: frame.source,
                    sid: data[0] & !RESPONSE_SID_BIT,
                    data,
                    valid: true,
                    raw: frame.raw_line,
                }));
            }
            Ok(Pci::First { .. }) => {
                out.push(None);
                pending.push((
                    frame.source,
                    PendingMessage {
                        slot: out.len() - 1,
                        raw: vec![frame.raw_line.clone()],
                        first: frame,
                        consecutive: Vec::new(),
                    },
                ));
            }
            Ok(Pci::Consecutive { .. }) => {
                let source = frame.source;
                let entry = pending
                    .iter_mut()
                    .find(|(s, _)| *s == source)
                    .ok_or(FrameError::OrphanConsecutive { ecu: source })?;
                entry.1.raw.push(frame.raw_line.clone());
                entry.1.consecutive.push(frame);
            }
            Ok(Pci::FlowControl) => {
                debug!("ignoring flow control frame: {:?}", line);
            }
            Err(e) => {
                warn!("bad PCI on line {:?} ({})", line, e);
                out.push(Some(DiagnosticResponse {
                    source: frame.source,
                    sid: 0,
                    data: frame.data,
                    valid: false,
                    raw: frame.raw_line,
                }));
            }
        }
    }

    for (source, message) in pending {
        let refs: Vec<&RawFrame> = message.consecutive.iter().collect();
        let data = isotp::reassemble(&message.first, &refs)?;
        out[message.slot] = Some(DiagnosticResponse {
            source,
            sid: data[0] & !RESPONSE_SID_BIT,
            data,
            valid: true,
            raw: message.raw.join("\r"),
        });
    }

    Ok(out.into_iter().flatten().collect())
}
