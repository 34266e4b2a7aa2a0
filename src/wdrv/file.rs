//! File transfer sessions.
//!
//! A fixed pool of [`FILE_CTX_NUM`] slots.  Each session moves through
//!
//! ```text
//!  Closed ──open──▶ Opening ──FS rsp──▶ Open ──write/read──▶ … ──close──▶ Closed
//!                   (temp id)          (transfer handle)
//! ```
//!
//! While opening, a slot is keyed by the handle of the request that
//! opened it; the co-processor's transfer handle replaces that key when
//! it arrives.  Writes are staged in a [`FILE_LOAD_BUF_SZ`] buffer and
//! flushed one block at a time; reads pull blocks into a caller-sized
//! buffer.

use alloc::boxed::Box;
use alloc::vec::Vec;

use heapless::Vec as HVec;
use log::{info, warn};

use super::WdrvState;
use crate::config::{FILE_CTX_NUM, FILE_LOAD_BUF_SZ};
use crate::error::{Error, Result};
use crate::nc::cmd_req::{CmdReq, ReqHandle, STATUS_OK};
use crate::nc::cmds::{self, CMD_ID_FS, CMD_ID_FSRECV, CMD_ID_FSTSFR, FS_OP_DEL, FS_OP_LIST, FS_OP_LOAD, FS_OP_STORE};
use crate::nc::dev::{CmdReqEvent, CmdRspCallback, CmdStatus, DevTx, RspElems};

/// Longest file name the co-processor accepts.
pub const MAX_FILENAME_LEN: usize = 32;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    User = 1,
    Certs = 2,
    PriKeys = 3,
    DhParam = 4,
    Cfg = 5,
}

impl FileType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::User),
            2 => Some(Self::Certs),
            3 => Some(Self::PriKeys),
            4 => Some(Self::DhParam),
            5 => Some(Self::Cfg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Host to co-processor.
    Write,
    /// Co-processor to host.
    Read,
}

/// Identifies one open session.  Stale handles to a reused slot are
/// rejected with [`Error::InvalidArg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    idx: u8,
    generation: u16,
}

impl FileHandle {
    pub fn slot(&self) -> usize {
        usize::from(self.idx)
    }
}

/// Session progress reported to the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent<'a> {
    Error,
    Open,
    WriteComplete,
    /// The bytes gathered by the last [`FileCtrl::read`].
    ReadComplete(&'a [u8]),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindEvent<'a> {
    Entry { file_type: u8, name: &'a [u8] },
    /// Terminal.  No further entries follow.
    Done { ok: bool },
}

pub type FileStatusCallback = Box<dyn FnMut(FileHandle, FileEvent<'_>)>;
pub type FileFindCallback = Box<dyn FnMut(FindEvent<'_>)>;
/// Receives whether the delete succeeded.
pub type FileDeleteCallback = Box<dyn FnMut(bool)>;

// ---------------------------------------------------------------------------
// Slot state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKey {
    Temp(ReqHandle),
    Transfer(u16),
}

#[derive(Default)]
struct WriteState {
    staging: HVec<u8, FILE_LOAD_BUF_SZ>,
    /// Caller bytes not yet moved into staging.
    pending: Vec<u8>,
    block: u16,
    /// The staged bytes have been sent and await their ACK.
    block_in_flight: bool,
    /// Bytes accepted from the caller so far.
    accepted: usize,
    /// Declared length not yet handed to a block command.
    unflushed: usize,
    /// The block in flight was sent by close, not by a write.
    close_flush: bool,
}

#[derive(Default)]
struct ReadState {
    buf: Option<Vec<u8>>,
    want: usize,
    block: u16,
    remaining: usize,
    file_size: u32,
    probed: bool,
    /// A block-0 terminator has been sent by close.
    closing: bool,
}

enum Transfer {
    Write(WriteState),
    Read(ReadState),
}

struct FileSlot {
    key: SlotKey,
    opened: bool,
    declared: u32,
    xfer: Transfer,
    cb: FileStatusCallback,
}

enum FsOp {
    Find(FileFindCallback),
    Delete(FileDeleteCallback),
}

/// The session pool plus the shared find/delete slot.
pub struct FileCtrl {
    slots: [Option<FileSlot>; FILE_CTX_NUM],
    generations: [u16; FILE_CTX_NUM],
    op: Option<FsOp>,
}

impl Default for FileCtrl {
    fn default() -> Self {
        Self::new()
    }
}

fn new_req(extra_len: usize) -> Option<CmdReq<WdrvState>> {
    CmdReq::alloc(1, extra_len, Some(cmd_rsp as CmdRspCallback<WdrvState>), 0)
}

impl FileCtrl {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            generations: [0; FILE_CTX_NUM],
            op: None,
        }
    }

    /// Number of slots currently allocated.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn handle_of(&self, idx: usize) -> FileHandle {
        FileHandle {
            idx: idx as u8,
            generation: self.generations[idx],
        }
    }

    fn slot_mut(&mut self, handle: FileHandle) -> Result<&mut FileSlot> {
        let idx = handle.slot();
        if idx >= FILE_CTX_NUM || self.generations[idx] != handle.generation {
            return Err(Error::InvalidArg);
        }
        self.slots[idx].as_mut().ok_or(Error::NotOpen)
    }

    fn find_key(&self, key: SlotKey) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.key == key))
    }

    // ── Public operations ─────────────────────────────────────

    /// Start a session.  `None` when the name is unusable, the pool is
    /// full or the open command cannot be sent.
    pub fn open(
        &mut self,
        tx: &mut dyn DevTx<WdrvState>,
        filename: &[u8],
        file_type: FileType,
        mode: FileMode,
        length: u32,
        status_cb: FileStatusCallback,
    ) -> Option<FileHandle> {
        if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
            warn!("FILE: bad file name length {}", filename.len());
            return None;
        }
        if mode == FileMode::Write && length == 0 {
            return None;
        }
        let Some(idx) = self.slots.iter().position(Option::is_none) else {
            warn!("FILE: no free slot");
            return None;
        };

        let mut req = new_req(filename.len())?;
        let appended = match mode {
            FileMode::Write => cmds::cmd_fsload(&mut req, file_type as u8, filename, length),
            FileMode::Read => cmds::cmd_fsstore(&mut req, file_type as u8, filename),
        };
        if !appended {
            return None;
        }
        let temp = req.handle();
        if tx.transmit(req).is_err() {
            warn!("FILE[{}]: open not sent", idx);
            return None;
        }

        let xfer = match mode {
            FileMode::Write => Transfer::Write(WriteState {
                unflushed: length as usize,
                ..WriteState::default()
            }),
            FileMode::Read => Transfer::Read(ReadState::default()),
        };
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.slots[idx] = Some(FileSlot {
            key: SlotKey::Temp(temp),
            opened: false,
            declared: if mode == FileMode::Write { length } else { 0 },
            xfer,
            cb: status_cb,
        });
        info!("FILE[{}]: opening {:?}, {} bytes declared", idx, mode, length);
        Some(self.handle_of(idx))
    }

    /// Queue `data` for transfer.  Completion is reported as
    /// [`FileEvent::WriteComplete`], synchronously if no block had to be
    /// sent.
    pub fn write(&mut self, tx: &mut dyn DevTx<WdrvState>, handle: FileHandle, data: &[u8]) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if !slot.opened {
            return Err(Error::Busy);
        }
        let SlotKey::Transfer(tsfr) = slot.key else {
            return Err(Error::InvalidContext);
        };
        let Transfer::Write(w) = &mut slot.xfer else {
            return Err(Error::InvalidArg);
        };
        if data.is_empty() {
            return Err(Error::InvalidArg);
        }
        if w.block_in_flight || !w.pending.is_empty() {
            return Err(Error::Busy);
        }
        if w.accepted + data.len() > slot.declared as usize {
            return Err(Error::InvalidArg);
        }

        w.accepted += data.len();
        w.pending.extend_from_slice(data);
        load(tx, tsfr, w, false)?;

        if !w.block_in_flight && w.pending.is_empty() {
            (slot.cb)(handle, FileEvent::WriteComplete);
        }
        Ok(())
    }

    /// Fetch up to `length` bytes.  The data arrives with
    /// [`FileEvent::ReadComplete`].
    pub fn read(&mut self, tx: &mut dyn DevTx<WdrvState>, handle: FileHandle, length: usize) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if !slot.opened {
            return Err(Error::Busy);
        }
        let SlotKey::Transfer(tsfr) = slot.key else {
            return Err(Error::InvalidContext);
        };
        let Transfer::Read(r) = &mut slot.xfer else {
            return Err(Error::InvalidArg);
        };
        if length == 0 {
            return Err(Error::InvalidArg);
        }
        if r.buf.is_some() || r.closing {
            return Err(Error::Busy);
        }
        if r.probed && r.remaining == 0 {
            return Err(Error::RequestError);
        }

        let mut req = new_req(0).ok_or(Error::RequestError)?;
        let next_block = r.block.wrapping_add(1);
        let appended = if r.probed {
            cmds::cmd_fsrecv(&mut req, tsfr, next_block, Some(block_len(r.remaining.min(length))))
        } else {
            cmds::cmd_fstsfr(&mut req, tsfr, None, None, None)
        };
        if !appended || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }

        if r.probed {
            r.block = next_block;
        }
        r.buf = Some(Vec::with_capacity(length));
        r.want = length;
        Ok(())
    }

    /// End a session.  Returns [`Error::Busy`] while the final block or a
    /// read terminator is still on its way; call again later.
    pub fn close(&mut self, tx: &mut dyn DevTx<WdrvState>, handle: FileHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if !slot.opened {
            return Err(Error::Busy);
        }
        let SlotKey::Transfer(tsfr) = slot.key else {
            return Err(Error::InvalidContext);
        };

        match &mut slot.xfer {
            Transfer::Write(w) => {
                if w.block_in_flight || !w.pending.is_empty() {
                    return Err(Error::Busy);
                }
                if !w.staging.is_empty() {
                    load(tx, tsfr, w, true)?;
                    w.close_flush = true;
                    return Err(Error::Busy);
                }
            }
            Transfer::Read(r) => {
                if r.remaining > 0 {
                    if !r.closing {
                        let mut req = new_req(0).ok_or(Error::RequestError)?;
                        if !cmds::cmd_fsrecv(&mut req, tsfr, 0, None) || tx.transmit(req).is_err() {
                            return Err(Error::RequestError);
                        }
                        r.closing = true;
                    }
                    return Err(Error::Busy);
                }
            }
        }

        (slot.cb)(handle, FileEvent::Close);
        self.slots[handle.slot()] = None;
        info!("FILE[{}]: closed", handle.slot());
        Ok(())
    }

    /// List the files of one type.
    pub fn find(&mut self, tx: &mut dyn DevTx<WdrvState>, file_type: FileType, cb: FileFindCallback) -> Result<()> {
        if self.op.is_some() {
            return Err(Error::RetryRequest);
        }
        let mut req = new_req(0).ok_or(Error::RequestError)?;
        if !cmds::cmd_fs(&mut req, FS_OP_LIST, Some(file_type as u8), None) || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }
        self.op = Some(FsOp::Find(cb));
        Ok(())
    }

    pub fn delete(
        &mut self,
        tx: &mut dyn DevTx<WdrvState>,
        filename: &[u8],
        file_type: FileType,
        cb: FileDeleteCallback,
    ) -> Result<()> {
        if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
            return Err(Error::InvalidArg);
        }
        if self.op.is_some() {
            return Err(Error::RetryRequest);
        }
        let mut req = new_req(filename.len()).ok_or(Error::RequestError)?;
        if !cmds::cmd_fs(&mut req, FS_OP_DEL, Some(file_type as u8), Some(filename)) || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }
        self.op = Some(FsOp::Delete(cb));
        Ok(())
    }

    /// Declared length of a write session, or the size reported by the
    /// first read probe (0 before it).
    pub fn file_size(&self, handle: FileHandle) -> Result<u32> {
        let idx = handle.slot();
        if idx >= FILE_CTX_NUM || self.generations[idx] != handle.generation {
            return Err(Error::InvalidArg);
        }
        let slot = self.slots[idx].as_ref().ok_or(Error::NotOpen)?;
        Ok(match &slot.xfer {
            Transfer::Write(_) => slot.declared,
            Transfer::Read(r) => r.file_size,
        })
    }

    // ── Engine events ─────────────────────────────────────────

    fn process_status(&mut self, req: ReqHandle, st: &CmdStatus<'_>) {
        let Some(src) = st.src_cmd.elements() else {
            return;
        };
        let ok = st.status == STATUS_OK;

        match st.rsp_cmd_id {
            CMD_ID_FS => match src.first().and_then(|e| e.as_u64()) {
                Some(op) if op == u64::from(FS_OP_LOAD) || op == u64::from(FS_OP_STORE) => {
                    // A slot still keyed by the request never got its
                    // transfer handle.
                    let Some(idx) = self.find_key(SlotKey::Temp(req)) else {
                        return;
                    };
                    warn!("FILE[{}]: open failed, status {}", idx, st.status);
                    let handle = self.handle_of(idx);
                    if let Some(mut slot) = self.slots[idx].take() {
                        (slot.cb)(handle, FileEvent::Error);
                    }
                }
                Some(op) if op == u64::from(FS_OP_LIST) => {
                    if let Some(FsOp::Find(mut cb)) = self.take_op(|op| matches!(op, FsOp::Find(_))) {
                        cb(FindEvent::Done { ok });
                    }
                }
                Some(op) if op == u64::from(FS_OP_DEL) => {
                    if let Some(FsOp::Delete(mut cb)) = self.take_op(|op| matches!(op, FsOp::Delete(_))) {
                        cb(ok);
                    }
                }
                _ => {}
            },

            // An accepted terminator ends the read even without a reply.
            CMD_ID_FSRECV if ok => {
                let tsfr = src.first().and_then(|e| e.as_u64());
                let block = src.get(1).and_then(|e| e.as_u64());
                let (Some(tsfr), Some(0)) = (tsfr, block) else {
                    return;
                };
                let Some(idx) = self.find_key(SlotKey::Transfer(tsfr as u16)) else {
                    return;
                };
                if let Some(slot) = self.slots[idx].as_mut() {
                    if let Transfer::Read(r) = &mut slot.xfer {
                        if r.closing {
                            r.remaining = 0;
                        }
                    }
                }
            }

            CMD_ID_FSTSFR | CMD_ID_FSRECV if !ok => {
                let Some(tsfr) = src.first().and_then(|e| e.as_u64()) else {
                    return;
                };
                let Some(idx) = self.find_key(SlotKey::Transfer(tsfr as u16)) else {
                    return;
                };
                let handle = self.handle_of(idx);
                let Some(slot) = self.slots[idx].as_mut() else {
                    return;
                };
                warn!("FILE[{}]: block failed, status {}", idx, st.status);
                match &mut slot.xfer {
                    Transfer::Write(w) => {
                        w.staging.clear();
                        w.pending.clear();
                        w.block_in_flight = false;
                        w.close_flush = false;
                    }
                    Transfer::Read(r) => {
                        r.buf = None;
                        r.remaining = 0;
                    }
                }
                (slot.cb)(handle, FileEvent::Error);
            }

            _ => {}
        }
    }

    fn take_op(&mut self, is: impl Fn(&FsOp) -> bool) -> Option<FsOp> {
        if self.op.as_ref().is_some_and(is) {
            self.op.take()
        } else {
            None
        }
    }

    fn process_rsp(&mut self, tx: &mut dyn DevTx<WdrvState>, req: ReqHandle, rsp: &RspElems<'_>) {
        let elems = &rsp.elems;
        match rsp.rsp_id {
            CMD_ID_FS => {
                if elems.len() < 2 {
                    return;
                }
                let op = elems[0].as_u64().unwrap_or(0);
                if op == u64::from(FS_OP_LOAD) || op == u64::from(FS_OP_STORE) {
                    let Some(tsfr) = elems[1].as_u64() else {
                        return;
                    };
                    let Some(idx) = self.find_key(SlotKey::Temp(req)) else {
                        warn!("FILE: transfer handle {} for no pending open", tsfr);
                        return;
                    };
                    let handle = self.handle_of(idx);
                    if let Some(slot) = self.slots[idx].as_mut() {
                        slot.key = SlotKey::Transfer(tsfr as u16);
                        slot.opened = true;
                        info!("FILE[{}]: open, transfer handle {}", idx, tsfr);
                        (slot.cb)(handle, FileEvent::Open);
                    }
                } else if op == u64::from(FS_OP_LIST) && elems.len() >= 3 {
                    if let Some(FsOp::Find(cb)) = self.op.as_mut() {
                        let file_type = elems[1].as_u64().unwrap_or(0) as u8;
                        let name = elems[2].as_bytes().unwrap_or(&[]);
                        cb(FindEvent::Entry { file_type, name });
                    }
                }
            }

            CMD_ID_FSTSFR => {
                if elems.len() < 3 {
                    return;
                }
                let (Some(tsfr), Some(block), Some(remaining)) =
                    (elems[0].as_u64(), elems[1].as_u64(), elems[2].as_u64())
                else {
                    return;
                };
                let Some(idx) = self.find_key(SlotKey::Transfer(tsfr as u16)) else {
                    return;
                };
                let handle = self.handle_of(idx);
                let Some(slot) = self.slots[idx].as_mut() else {
                    return;
                };
                let data = elems.get(3).and_then(|e| e.as_bytes());

                match &mut slot.xfer {
                    Transfer::Write(w) => {
                        write_ack(tx, idx, tsfr as u16, w, &mut slot.cb, handle, block as u16, remaining)
                    }
                    Transfer::Read(r) => {
                        read_block(tx, idx, tsfr as u16, r, &mut slot.cb, handle, remaining as usize, data)
                    }
                }
            }

            _ => {}
        }
    }
}

// ── Transfer engines ──────────────────────────────────────────

fn block_len(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Refill staging from pending bytes and send a block when staging is
/// full, holds the rest of the declared length, or `force` is set.
fn load(tx: &mut dyn DevTx<WdrvState>, tsfr: u16, w: &mut WriteState, force: bool) -> Result<()> {
    if w.block_in_flight {
        return Ok(());
    }

    let room = FILE_LOAD_BUF_SZ - w.staging.len();
    let n = room.min(w.pending.len());
    w.staging
        .extend_from_slice(&w.pending[..n])
        .map_err(|_| Error::InvalidContext)?;
    w.pending.drain(..n);

    let full = w.staging.len() == FILE_LOAD_BUF_SZ;
    let tail = w.staging.len() == w.unflushed;
    if w.staging.is_empty() || !(full || tail || force) {
        return Ok(());
    }

    let mut req = new_req(w.staging.len()).ok_or(Error::RequestError)?;
    let block = w.block.wrapping_add(1);
    if !cmds::cmd_fstsfr(&mut req, tsfr, Some(block), Some(&w.staging), None) || tx.transmit(req).is_err() {
        return Err(Error::RequestError);
    }
    w.block = block;
    w.block_in_flight = true;
    w.unflushed = w.unflushed.saturating_sub(w.staging.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_ack(
    tx: &mut dyn DevTx<WdrvState>,
    idx: usize,
    tsfr: u16,
    w: &mut WriteState,
    cb: &mut FileStatusCallback,
    handle: FileHandle,
    block: u16,
    remaining: u64,
) {
    if !w.block_in_flight || block != w.block {
        warn!("FILE[{}]: unexpected ack for block {}", idx, block);
        return;
    }
    w.staging.clear();
    w.block_in_flight = false;
    let forced = core::mem::take(&mut w.close_flush);
    if remaining == 0 {
        info!("FILE[{}]: all {} bytes delivered", idx, w.accepted);
    }

    if load(tx, tsfr, w, false).is_err() {
        w.pending.clear();
        cb(handle, FileEvent::Error);
        return;
    }
    if !forced && !w.block_in_flight && w.pending.is_empty() {
        cb(handle, FileEvent::WriteComplete);
    }
}

#[allow(clippy::too_many_arguments)]
fn read_block(
    tx: &mut dyn DevTx<WdrvState>,
    idx: usize,
    tsfr: u16,
    r: &mut ReadState,
    cb: &mut FileStatusCallback,
    handle: FileHandle,
    remaining: usize,
    data: Option<&[u8]>,
) {
    if !r.probed {
        r.file_size = u32::try_from(remaining).unwrap_or(u32::MAX);
        r.probed = true;
        info!("FILE[{}]: {} bytes to read", idx, remaining);
    }
    r.remaining = remaining;

    let Some(buf) = r.buf.as_mut() else {
        return;
    };
    if let Some(data) = data {
        let room = r.want - buf.len();
        buf.extend_from_slice(&data[..data.len().min(room)]);
    }

    if remaining == 0 || buf.len() >= r.want {
        if let Some(buf) = r.buf.take() {
            cb(handle, FileEvent::ReadComplete(&buf));
        }
        return;
    }

    let len = block_len(remaining.min(r.want - buf.len()));
    let next_block = r.block.wrapping_add(1);
    let sent = new_req(0).is_some_and(|mut req| cmds::cmd_fsrecv(&mut req, tsfr, next_block, Some(len)) && tx.transmit(req).is_ok());
    if sent {
        r.block = next_block;
    } else {
        warn!("FILE[{}]: next block request not sent", idx);
        r.buf = None;
        cb(handle, FileEvent::Error);
    }
}

/// Engine callback for every request this module issues.
pub(crate) fn cmd_rsp(
    state: &mut WdrvState,
    tx: &mut dyn DevTx<WdrvState>,
    req: ReqHandle,
    _ctx: usize,
    ev: CmdReqEvent<'_>,
) {
    match ev {
        CmdReqEvent::CmdStatus(st) => state.file.process_status(req, &st),
        CmdReqEvent::RspReceived(rsp) => state.file.process_rsp(tx, req, &rsp),
        CmdReqEvent::TxComplete | CmdReqEvent::StatusComplete { .. } => {}
    }
}
