//! Command request builder.
//!
//! A [`CmdReq`] is one burst: up to `max_cmds` encoded commands sharing a
//! caller-supplied buffer region, a completion callback and an opaque
//! context.  Layout of the region once commands are appended:
//!
//! ```text
//! ┌───────────────────────┬──────────────────────────┬─────┬─────────┬───┐
//! │ burst envelope (4B)   │ cmd 0: hdr (7B) + params │ ... │  free   │ T │
//! │ len, type, num_cmds   │                          │     │         │   │
//! └───────────────────────┴──────────────────────────┴─────┴─────────┴───┘
//!                                                   bookkeeping charge ─┘
//! ```
//!
//! The tail of the region is charged for per-request and per-command
//! bookkeeping (slots and header elements) plus one terminator byte, so
//! a region that is accepted by [`CmdReq::init`] never grows.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use super::codec::{CMD_HDR_LEN, FRAME_HDR_LEN, LEN_SIZE, MSG_CMD_REQ};
use super::dev::{CmdRspCallback, SrcCmd};
use super::elem::Param;

/// Status value the co-processor uses for success.
pub const STATUS_OK: u16 = 0;

// ── Header element flags ──────────────────────────────────────

pub const HDR_FLAG_STATUS_RCVD: u8 = 0x20;
pub const HDR_FLAG_FIRST_IN_BURST: u8 = 0x40;
pub const HDR_FLAG_LAST_IN_BURST: u8 = 0x80;

// ── Region accounting ─────────────────────────────────────────

/// Fixed per-request bookkeeping charge.
pub const CMD_REQ_OVERHEAD: usize = 32;
/// Per-command slot charge (declared size / returned status).
pub const CMD_SLOT_SIZE: usize = 4;
/// Per-header-element charge.
pub const HDR_ELEM_SIZE: usize = 8;
/// Header elements reserved per command (header, body, trailer).
pub const HDR_ELEMS_PER_CMD: usize = 3;
/// Typical encoded command size, used by [`CmdReq::alloc`].
pub const CMD_REQ_BASE_CMD_SIZE: usize = 48;

/// Burst envelope: frame header plus command count.
const BURST_HDR_LEN: usize = FRAME_HDR_LEN + 1;

/// Bookkeeping charged against a region holding `max_cmds` commands.
pub const fn bookkeeping(max_cmds: usize) -> usize {
    CMD_REQ_OVERHEAD + max_cmds * (CMD_SLOT_SIZE + HDR_ELEMS_PER_CMD * HDR_ELEM_SIZE)
}

/// Locally assigned request identity.  Unique for the life of the process
/// (wraps after 2^32 requests) and known before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReqHandle(u32);

impl ReqHandle {
    fn next() -> Self {
        static NEXT_ID: AtomicU32 = AtomicU32::new(1);
        loop {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// One outgoing fragment of the burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrElem {
    pub offset: usize,
    pub len: usize,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy)]
struct CmdSlot {
    cmd_id: u16,
    seq: u16,
    hdr_offset: usize,
    /// Index of this command's header fragment in `frags`.
    frag: usize,
    num_params: u8,
    params_offset: usize,
    params_len: usize,
    status: Option<u16>,
}

/// A burst of commands awaiting or undergoing transmission.
///
/// `S` is the state type threaded through the device's callbacks.
pub struct CmdReq<S> {
    handle: ReqHandle,
    buf: Vec<u8>,
    /// End of the region usable for encoded bytes.
    limit: usize,
    used: usize,
    max_cmds: usize,
    cmds: Vec<CmdSlot>,
    frags: Vec<HdrElem>,
    num_errors: u8,
    callback: Option<CmdRspCallback<S>>,
    context: usize,
    next: Option<Box<CmdReq<S>>>,
    pub(crate) tx_pending: bool,
}

impl<S> CmdReq<S> {
    /// Take ownership of `buffer` (its length is the region size) and
    /// prepare it for up to `max_cmds` commands.
    ///
    /// Returns `None` if the region cannot hold the bookkeeping for
    /// `max_cmds` commands, the burst envelope and the terminator byte.
    pub fn init(
        buffer: Vec<u8>,
        max_cmds: usize,
        callback: Option<CmdRspCallback<S>>,
        context: usize,
    ) -> Option<Self> {
        if max_cmds == 0 || max_cmds > usize::from(u8::MAX) {
            return None;
        }
        let reserved = bookkeeping(max_cmds) + 1;
        if buffer.len() < reserved + BURST_HDR_LEN {
            return None;
        }

        let mut frags = Vec::with_capacity(1 + max_cmds * HDR_ELEMS_PER_CMD);
        frags.push(HdrElem {
            offset: 0,
            len: BURST_HDR_LEN,
            flags: 0,
        });

        Some(Self {
            handle: ReqHandle::next(),
            limit: buffer.len() - reserved,
            buf: buffer,
            used: BURST_HDR_LEN,
            max_cmds,
            cmds: Vec::with_capacity(max_cmds),
            frags,
            num_errors: 0,
            callback,
            context,
            next: None,
            tx_pending: false,
        })
    }

    /// Allocate a region sized for `max_cmds` typical commands plus
    /// `extra_len` bytes of payload.
    pub fn alloc(
        max_cmds: usize,
        extra_len: usize,
        callback: Option<CmdRspCallback<S>>,
        context: usize,
    ) -> Option<Self> {
        let size = bookkeeping(max_cmds) + 1 + BURST_HDR_LEN + max_cmds * CMD_REQ_BASE_CMD_SIZE + extra_len;
        Self::init(vec![0; size], max_cmds, callback, context)
    }

    pub fn handle(&self) -> ReqHandle {
        self.handle
    }

    pub fn context(&self) -> usize {
        self.context
    }

    pub fn num_cmds(&self) -> usize {
        self.cmds.len()
    }

    pub fn max_cmds(&self) -> usize {
        self.max_cmds
    }

    /// Bytes still available for encoded commands.
    pub fn space_left(&self) -> usize {
        self.limit - self.used
    }

    /// Command id of the command at `idx`.
    pub fn cmd_id(&self, idx: usize) -> Option<u16> {
        self.cmds.get(idx).map(|c| c.cmd_id)
    }

    /// Outgoing fragments, in transmission order.
    pub fn fragments(&self) -> &[HdrElem] {
        &self.frags
    }

    /// Encode one command.  Returns `false`, leaving the request unchanged,
    /// if the command does not fit or the request is already full.
    #[must_use]
    pub fn append_command(&mut self, cmd_id: u16, params: &[Param<'_>]) -> bool {
        if self.cmds.len() == self.max_cmds || params.len() > usize::from(u8::MAX) {
            return false;
        }

        let params_len: usize = params.iter().map(Param::encoded_len).sum();
        if CMD_HDR_LEN + params_len > self.space_left() || params_len > usize::from(u16::MAX) {
            return false;
        }

        let hdr_offset = self.used;
        let params_offset = hdr_offset + CMD_HDR_LEN;
        let mut off = params_offset;
        for p in params {
            match p.encode(&mut self.buf[off..self.limit]) {
                Some(n) => off += n,
                None => return false,
            }
        }

        let hdr = &mut self.buf[hdr_offset..params_offset];
        hdr[0..2].copy_from_slice(&cmd_id.to_le_bytes());
        hdr[2..4].copy_from_slice(&0u16.to_le_bytes());
        hdr[4] = params.len() as u8;
        hdr[5..7].copy_from_slice(&(params_len as u16).to_le_bytes());

        let frag = self.frags.len();
        self.frags.push(HdrElem {
            offset: hdr_offset,
            len: CMD_HDR_LEN,
            flags: 0,
        });
        if params_len > 0 {
            self.frags.push(HdrElem {
                offset: params_offset,
                len: params_len,
                flags: 0,
            });
        }

        self.cmds.push(CmdSlot {
            cmd_id,
            seq: 0,
            hdr_offset,
            frag,
            num_params: params.len() as u8,
            params_offset,
            params_len,
            status: None,
        });
        self.used = off;
        true
    }

    /// Link a follow-up request, transmitted once this one completes.
    /// Appends to the end of an existing chain.
    pub fn chain(&mut self, follow_up: CmdReq<S>) {
        match &mut self.next {
            Some(next) => next.chain(follow_up),
            None => self.next = Some(Box::new(follow_up)),
        }
    }

    pub fn has_chained(&self) -> bool {
        self.next.is_some()
    }

    // ── Engine side ───────────────────────────────────────────

    /// Fill in the burst envelope and per-command sequence numbers, and
    /// flag the first and last fragments.
    pub(crate) fn prepare_burst(&mut self, mut next_seq: impl FnMut() -> u16) {
        let frame_len = (self.used - LEN_SIZE) as u16;
        self.buf[..LEN_SIZE].copy_from_slice(&frame_len.to_le_bytes());
        self.buf[LEN_SIZE] = MSG_CMD_REQ;
        self.buf[FRAME_HDR_LEN] = self.cmds.len() as u8;

        for cmd in &mut self.cmds {
            cmd.seq = next_seq();
            self.buf[cmd.hdr_offset + 2..cmd.hdr_offset + 4].copy_from_slice(&cmd.seq.to_le_bytes());
        }

        for f in &mut self.frags {
            f.flags &= HDR_FLAG_STATUS_RCVD;
        }
        if let Some(first) = self.frags.first_mut() {
            first.flags |= HDR_FLAG_FIRST_IN_BURST;
        }
        if let Some(last) = self.frags.last_mut() {
            last.flags |= HDR_FLAG_LAST_IN_BURST;
        }
    }

    pub(crate) fn fragment_bytes(&self, frag: &HdrElem) -> &[u8] {
        &self.buf[frag.offset..frag.offset + frag.len]
    }

    /// Index of the command carrying `seq`.
    pub(crate) fn find_seq(&self, seq: u16) -> Option<usize> {
        self.cmds.iter().position(|c| c.seq == seq)
    }

    pub(crate) fn record_status(&mut self, idx: usize, status: u16) {
        let Some(cmd) = self.cmds.get_mut(idx) else {
            return;
        };
        if cmd.status.is_none() && status != STATUS_OK {
            self.num_errors = self.num_errors.saturating_add(1);
        }
        cmd.status = Some(status);
        if let Some(f) = self.frags.get_mut(cmd.frag) {
            f.flags |= HDR_FLAG_STATUS_RCVD;
        }
    }

    pub(crate) fn all_status_received(&self) -> bool {
        self.cmds.iter().all(|c| c.status.is_some())
    }

    /// Source-command descriptor for command `idx`.
    pub(crate) fn src_cmd(&self, idx: usize) -> Option<SrcCmd<'_>> {
        self.cmds.get(idx).map(|c| SrcCmd {
            idx: idx as u8,
            num_params: c.num_params,
            params: &self.buf[c.params_offset..c.params_offset + c.params_len],
        })
    }

    pub(crate) fn callback(&self) -> Option<(CmdRspCallback<S>, usize)> {
        self.callback.map(|cb| (cb, self.context))
    }

    /// Dismantle a finished request: counts, the region handed back to
    /// the callback, and any chained follow-up.
    pub(crate) fn finish(mut self) -> Finished<S> {
        Finished {
            handle: self.handle,
            callback: self.callback,
            context: self.context,
            num_cmds: self.cmds.len() as u8,
            num_errors: self.num_errors,
            next: self.next.take().map(|b| *b),
            buffer: self.buf,
        }
    }
}

pub(crate) struct Finished<S> {
    pub handle: ReqHandle,
    pub callback: Option<CmdRspCallback<S>>,
    pub context: usize,
    pub num_cmds: u8,
    pub num_errors: u8,
    pub next: Option<CmdReq<S>>,
    pub buffer: Vec<u8>,
}
