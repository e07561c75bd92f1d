//! ISO 15765-4 Multi-Frame Reassembly
//!
//! CAN frames carry a leading protocol control information (PCI) byte:
//! single frame, first frame (with the total message length), or
//! consecutive frame (with a 4-bit cyclic sequence counter).
//! Consecutive frames are stitched together strictly in sequence-number
//! order, never line-arrival order.

use crate::error::FrameError;
use crate::frame::RawFrame;

/// Bytes of message data a first frame carries after its 2-byte PCI
const FIRST_FRAME_DATA: usize = 6;
/// Bytes of message data a consecutive frame carries after its PCI byte
const CONSECUTIVE_DATA: usize = 7;

/// Decoded protocol control information of one CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pci {
    /// Complete message in one frame, 1..=7 data bytes
    Single { len: usize },
    /// First frame of a multi-frame message with its total length
    First { len: usize },
    /// Consecutive frame with its 4-bit sequence counter
    Consecutive { seq: u8 },
    /// Flow control frame (emitted by the tester, ignored on receive)
    FlowControl,
}

impl Pci {
    /// Parse the PCI byte(s) at the front of a CAN frame's data
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let pci = *data.first().ok_or(FrameError::InvalidPci { pci: 0 })?;
        match pci & 0xF0 {
            0x00 => {
                let len = usize::from(pci & 0x0F);
                if len == 0 || len > 7 {
                    return Err(FrameError::InvalidPci { pci });
                }
                Ok(Pci::Single { len })
            }
            0x10 => {
                let hi = usize::from(pci & 0x0F);
                let lo = usize::from(*data.get(1).ok_or(FrameError::InvalidPci { pci })?);
                Ok(Pci::First {
                    len: (hi << 8) | lo,
                })
            }
            0x20 => Ok(Pci::Consecutive { seq: pci & 0x0F }),
            0x30 => Ok(Pci::FlowControl),
            _ => Err(FrameError::InvalidPci { pci }),
        }
    }
}

/// Reassemble one multi-frame message from its first frame and
/// consecutive frames (in any arrival order).
///
/// Consecutive frames are consumed by ascending sequence number, with
/// the 4-bit counter wrapping past 15. A missing counter value is a
/// [`FrameError::SequenceGap`]; running out of frames before the
/// declared length is reached is a [`FrameError::LengthMismatch`].
pub fn reassemble(first: &RawFrame, consecutive: &[&RawFrame]) -> Result<Vec<u8>, FrameError> {
    let declared = match Pci::parse(&first.data)? {
        Pci::First { len } => len,
        other => {
            // Caller contract: `first` must be a first frame
            debug_assert!(false, "reassemble called with {:?}", other);
            return Err(FrameError::InvalidPci {
                pci: first.data[0],
            });
        }
    };

    if declared <= FIRST_FRAME_DATA {
        // A message this short belongs in a single frame
        return Err(FrameError::InvalidPci {
            pci: first.data[0],
        });
    }

    let mut message = Vec::with_capacity(declared);
    message.extend_from_slice(&first.data[2..first.data.len().min(2 + FIRST_FRAME_DATA)]);

    let mut used = vec![false; consecutive.len()];
    let mut counter: u8 = 1;
    while message.len() < declared {
        let slot = consecutive.iter().enumerate().position(|(i, frame)| {
            !used[i] && matches!(Pci::parse(&frame.data), Ok(Pci::Consecutive { seq }) if seq == counter)
        });
        let index = match slot {
            Some(index) => index,
            None if used.iter().all(|u| *u) => {
                return Err(FrameError::LengthMismatch {
                    declared,
                    got: message.len(),
                })
            }
            None => return Err(FrameError::SequenceGap { expected: counter }),
        };
        used[index] = true;
        let frame = consecutive[index];
        let take = (declared - message.len()).min(CONSECUTIVE_DATA);
        let available = &frame.data[1..];
        if available.len() < take {
            return Err(FrameError::LengthMismatch {
                declared,
                got: message.len() + available.len(),
            });
        }
        message.extend_from_slice(&available[..take]);
        counter = (counter + 1) & 0x0F;
    }

    Ok(message)
}
