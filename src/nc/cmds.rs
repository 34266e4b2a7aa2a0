//! Protocol verb catalogue.
//!
//! One function per verb.  Each appends a single command to a request
//! from already validated arguments.  Optional trailing arguments follow
//! the "ignore" convention: the first `None` ends the parameter list, so
//! it and everything after it is omitted from the wire.

use heapless::Vec as HVec;

use super::cmd_req::CmdReq;
use super::elem::Param;

// ── Command ids ───────────────────────────────────────────────

pub const CMD_ID_GMR: u16 = 0x0001;
pub const CMD_ID_FS: u16 = 0x0010;
pub const CMD_ID_FSTSFR: u16 = 0x0011;
pub const CMD_ID_FSRECV: u16 = 0x0012;
pub const CMD_ID_WIFIC: u16 = 0x0020;
pub const CMD_ID_ASSOC: u16 = 0x0030;
pub const CMD_ID_WSTADISC: u16 = 0x0031;

// ── Unsolicited event ids ─────────────────────────────────────

/// RSSI report: assoc id, peer-is-station, peer MAC, RSSI.
pub const AEC_ID_ASSOC: u16 = 0x8030;
/// Station link up: assoc id, BSSID, channel.
pub const AEC_ID_WSTALU: u16 = 0x8040;
/// Station link down: assoc id.
pub const AEC_ID_WSTALD: u16 = 0x8041;
/// Access point: station connected: assoc id, MAC.
pub const AEC_ID_WAPSC: u16 = 0x8050;
/// Access point: station disconnected: assoc id, MAC.
pub const AEC_ID_WAPSD: u16 = 0x8051;

// ── FS operations ─────────────────────────────────────────────

pub const FS_OP_LOAD: u8 = 1;
pub const FS_OP_STORE: u8 = 2;
pub const FS_OP_LIST: u8 = 3;
pub const FS_OP_DEL: u8 = 4;

// ── WIFIC parameter ids ───────────────────────────────────────

pub const WIFIC_REGDOMAIN_SELECTED: u16 = 10;
pub const WIFIC_REGDOMAIN_AVAILABLE: u16 = 11;
pub const WIFIC_REGDOMAIN_CHANMASK24: u16 = 12;

/// Longest parameter list any verb here produces.
const MAX_VERB_PARAMS: usize = 4;

type Params<'a> = HVec<Param<'a>, MAX_VERB_PARAMS>;

/// Collect parameters up to (not including) the first absent one.
fn trailing<'a>(params: impl IntoIterator<Item = Option<Param<'a>>>) -> Params<'a> {
    let mut out = Params::new();
    for p in params.into_iter().map_while(|p| p) {
        if out.push(p).is_err() {
            break;
        }
    }
    out
}

/// Firmware revision query.
#[must_use]
pub fn cmd_gmr<S>(req: &mut CmdReq<S>) -> bool {
    req.append_command(CMD_ID_GMR, &[])
}

/// Generic file-system operation.
#[must_use]
pub fn cmd_fs<S>(req: &mut CmdReq<S>, op: u8, filetype: Option<u8>, filename: Option<&[u8]>) -> bool {
    let params = trailing([
        Some(Param::Uint(u64::from(op))),
        filetype.map(|t| Param::Uint(u64::from(t))),
        filename.map(Param::Str),
    ]);
    req.append_command(CMD_ID_FS, &params)
}

/// Open a host-to-device transfer of `length` bytes into a new file.
#[must_use]
pub fn cmd_fsload<S>(req: &mut CmdReq<S>, filetype: u8, filename: &[u8], length: u32) -> bool {
    req.append_command(
        CMD_ID_FS,
        &[
            Param::Uint(u64::from(FS_OP_LOAD)),
            Param::Uint(u64::from(filetype)),
            Param::Str(filename),
            Param::Uint(u64::from(length)),
        ],
    )
}

/// Open a device-to-host transfer of an existing file.
#[must_use]
pub fn cmd_fsstore<S>(req: &mut CmdReq<S>, filetype: u8, filename: &[u8]) -> bool {
    cmd_fs(req, FS_OP_STORE, Some(filetype), Some(filename))
}

/// Send one block of a transfer.  With only a handle this probes the
/// transfer state.
#[must_use]
pub fn cmd_fstsfr<S>(
    req: &mut CmdReq<S>,
    tsfr_handle: u16,
    block_num: Option<u16>,
    data: Option<&[u8]>,
    crc: Option<u16>,
) -> bool {
    let params = trailing([
        Some(Param::Uint(u64::from(tsfr_handle))),
        block_num.map(|b| Param::Uint(u64::from(b))),
        data.map(Param::Bytes),
        crc.map(|c| Param::Uint(u64::from(c))),
    ]);
    req.append_command(CMD_ID_FSTSFR, &params)
}

/// Request one block of a device-to-host transfer.
#[must_use]
pub fn cmd_fsrecv<S>(req: &mut CmdReq<S>, tsfr_handle: u16, block_num: u16, length: Option<u16>) -> bool {
    let params = trailing([
        Some(Param::Uint(u64::from(tsfr_handle))),
        Some(Param::Uint(u64::from(block_num))),
        length.map(|l| Param::Uint(u64::from(l))),
    ]);
    req.append_command(CMD_ID_FSRECV, &params)
}

/// Wi-Fi configuration: query `param_id` when `value` is `None`,
/// otherwise set it.
#[must_use]
pub fn cmd_wific<S>(req: &mut CmdReq<S>, param_id: u16, value: Option<Param<'_>>) -> bool {
    let params = trailing([Some(Param::Uint(u64::from(param_id))), value]);
    req.append_command(CMD_ID_WIFIC, &params)
}

/// Association query; all associations when `assoc_id` is `None`.
#[must_use]
pub fn cmd_assoc<S>(req: &mut CmdReq<S>, assoc_id: Option<u16>) -> bool {
    let params = trailing([assoc_id.map(|id| Param::Uint(u64::from(id)))]);
    req.append_command(CMD_ID_ASSOC, &params)
}

/// Disconnect the station interface.
#[must_use]
pub fn cmd_wstadisc<S>(req: &mut CmdReq<S>) -> bool {
    req.append_command(CMD_ID_WSTADISC, &[])
}
