//! Length-prefix frame codec and the engine's receive buffer.
//!
//! Wire format:
//! ```text
//! ┌────────────┬───────────┬──────────────────────┐
//! │ Length (2B)│ Type (1B) │ Body (Length - 1 B)  │
//! │ LE u16     │           │                      │
//! └────────────┴───────────┴──────────────────────┘
//! ```
//!
//! Bodies by type (all integers little-endian):
//! ```text
//! CMD_REQ    host → dev  num_cmds u8, { cmd_id u16, seq u16, num_params u8, params_len u16, params }*
//! CMD_STATUS dev → host  seq u16, cmd_id u16, status u16
//! RSP        dev → host  seq u16, rsp_id u16, num_elems u8, elements
//! AEC        dev → host  aec_id u16, num_elems u8, elements
//! ```
//!
//! The decoder accumulates bytes in a single engine-owned buffer and
//! yields at most one complete frame at a time.  A `Transport::read` may
//! deliver part of a header, part of a body, or several frames at once;
//! leftover bytes stay buffered for the next call.

use alloc::vec;
use alloc::vec::Vec;

use log::warn;

use super::elem::{ElemList, unpack_elements};
use super::transport::Transport;
use crate::error::FrameError;

/// Length prefix size.
pub const LEN_SIZE: usize = 2;

/// Length prefix plus type byte.
pub const FRAME_HDR_LEN: usize = LEN_SIZE + 1;

pub const MSG_CMD_REQ: u8 = 0x01;
pub const MSG_CMD_STATUS: u8 = 0x02;
pub const MSG_RSP: u8 = 0x03;
pub const MSG_AEC: u8 = 0x04;

/// Per-command header inside a CMD_REQ body.
pub const CMD_HDR_LEN: usize = 7;

// ── Decoded frames ────────────────────────────────────────────

/// A device-to-host frame, borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    CmdStatus {
        seq: u16,
        cmd_id: u16,
        status: u16,
    },
    Rsp {
        seq: u16,
        rsp_id: u16,
        num_elems: u8,
        elems: &'a [u8],
    },
    Aec {
        aec_id: u16,
        num_elems: u8,
        elems: &'a [u8],
    },
}

impl<'a> Frame<'a> {
    /// Decode a frame body of the given message type.
    pub fn parse(msg_type: u8, body: &'a [u8]) -> Result<Self, FrameError> {
        match msg_type {
            MSG_CMD_STATUS => {
                if body.len() != 6 {
                    return Err(FrameError::Truncated);
                }
                Ok(Self::CmdStatus {
                    seq: le16(body, 0),
                    cmd_id: le16(body, 2),
                    status: le16(body, 4),
                })
            }
            MSG_RSP => {
                if body.len() < 5 {
                    return Err(FrameError::Truncated);
                }
                Ok(Self::Rsp {
                    seq: le16(body, 0),
                    rsp_id: le16(body, 2),
                    num_elems: body[4],
                    elems: &body[5..],
                })
            }
            MSG_AEC => {
                if body.len() < 3 {
                    return Err(FrameError::Truncated);
                }
                Ok(Self::Aec {
                    aec_id: le16(body, 0),
                    num_elems: body[2],
                    elems: &body[3..],
                })
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }

    /// Split the element block of a response or event.
    pub fn elements(&self) -> Result<ElemList<'a>, FrameError> {
        match *self {
            Self::Rsp { num_elems, elems, .. } | Self::Aec { num_elems, elems, .. } => {
                unpack_elements(usize::from(num_elems), elems).ok_or(FrameError::BadElements)
            }
            Self::CmdStatus { .. } => Ok(ElemList::new()),
        }
    }
}

fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

// ── Receive buffer ────────────────────────────────────────────

/// Outcome of one decode attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// Not enough bytes buffered for a complete frame.
    Incomplete,
    /// A complete frame: raw type byte and body.  Must be released with
    /// [`FrameDecoder::consume`] once dispatched.
    Frame { msg_type: u8, body: &'a [u8] },
    /// Garbage was discarded; the caller may try again.
    Discarded(FrameError),
}

/// Streaming frame decoder over a fixed, engine-owned buffer.
pub struct FrameDecoder {
    buf: Vec<u8>,
    filled: usize,
    /// Size of the frame at the head, once known complete.
    head_len: usize,
}

impl FrameDecoder {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0; size.max(FRAME_HDR_LEN + 1)],
            filled: 0,
            head_len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn buffered(&self) -> usize {
        self.filled
    }

    /// Pull whatever the transport has into the free tail of the buffer.
    pub fn fill<T: Transport>(&mut self, transport: &mut T) -> Result<usize, T::Error> {
        if self.filled == self.buf.len() {
            return Ok(0);
        }
        let n = transport.read(&mut self.buf[self.filled..])?;
        self.filled += n.min(self.buf.len() - self.filled);
        Ok(n)
    }

    /// Append bytes directly (used by tests and loopback transports).
    /// Returns how many fitted.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.buf.len() - self.filled);
        self.buf[self.filled..self.filled + n].copy_from_slice(&data[..n]);
        self.filled += n;
        n
    }

    /// Try to locate one complete frame at the head of the buffer.
    pub fn decode(&mut self) -> Decoded<'_> {
        if self.filled < LEN_SIZE {
            return Decoded::Incomplete;
        }

        let len = usize::from(le16(&self.buf, 0));
        if len == 0 || LEN_SIZE + len > self.buf.len() {
            // Length is unusable; nothing after it can be trusted either.
            warn!("NC: dropping {} buffered bytes, bad length {}", self.filled, len);
            self.reset();
            return Decoded::Discarded(FrameError::BadLength(len));
        }

        if self.filled < LEN_SIZE + len {
            return Decoded::Incomplete;
        }

        self.head_len = LEN_SIZE + len;
        Decoded::Frame {
            msg_type: self.buf[LEN_SIZE],
            body: &self.buf[FRAME_HDR_LEN..self.head_len],
        }
    }

    /// Release the frame returned by the last [`Self::decode`].
    pub fn consume(&mut self) {
        if self.head_len == 0 {
            return;
        }
        self.buf.copy_within(self.head_len..self.filled, 0);
        self.filled -= self.head_len;
        self.head_len = 0;
    }

    /// Drop all buffered bytes (e.g. after a link reset).
    pub fn reset(&mut self) {
        self.filled = 0;
        self.head_len = 0;
    }
}

/// Encode one frame into `out_buf`.
///
/// Writes `[LE-u16 length][type][body]`.  Returns the total number of
/// bytes written.
pub fn encode_frame(msg_type: u8, body: &[u8], out_buf: &mut [u8]) -> Option<usize> {
    let total = FRAME_HDR_LEN + body.len();
    if total > out_buf.len() || body.len() + 1 > usize::from(u16::MAX) {
        return None;
    }

    out_buf[..LEN_SIZE].copy_from_slice(&((body.len() + 1) as u16).to_le_bytes());
    out_buf[LEN_SIZE] = msg_type;
    out_buf[FRAME_HDR_LEN..total].copy_from_slice(body);

    Some(total)
}
