//! Regulatory-domain negotiation.
//!
//! One request may be outstanding per instance.  A set is never trusted
//! on its own acknowledgement: the module re-reads the selected domain
//! and only reports once the co-processor shows the new value, retrying
//! the read a bounded number of times.
//!
//! ```text
//!  set(X) ──▶ WIFIC(SELECTED, X) ──ack──▶ get CURRENT ──▶ SELECTED == old? ──yes──▶ get again
//!                                                               │ no
//!                                                               ▼
//!                                                 CHANMASK24 ──▶ cb(1, 1, true, X)
//! ```

use alloc::boxed::Box;

use heapless::Vec as HVec;
use log::{info, warn};

use super::WdrvState;
use crate::config::REGDOMAIN_MAX_NAME_LEN;
use crate::error::{Error, Result};
use crate::nc::cmd_req::{CmdReq, ReqHandle, STATUS_OK};
use crate::nc::cmds::{self, CMD_ID_WIFIC, WIFIC_REGDOMAIN_AVAILABLE, WIFIC_REGDOMAIN_CHANMASK24, WIFIC_REGDOMAIN_SELECTED};
use crate::nc::dev::{CmdReqEvent, CmdRspCallback, CmdStatus, DevTx, RspElems};
use crate::nc::elem::{ElemType, Param, ParamElem, read_param_elem};

/// A named domain and, when known, its 2.4 GHz channel mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegDomainInfo {
    name: HVec<u8, REGDOMAIN_MAX_NAME_LEN>,
    pub channel_mask: u16,
}

impl RegDomainInfo {
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Domain name from a string element; `None` when absent or empty.
    fn from_elem(elem: &ParamElem<'_>) -> Option<Self> {
        let mut raw = [0u8; REGDOMAIN_MAX_NAME_LEN];
        let n = read_param_elem(Some(elem), ElemType::String, &mut raw);
        if n == 0 {
            return None;
        }
        Some(Self {
            name: HVec::from_slice(&raw[..n]).ok()?,
            channel_mask: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegDomainSelect {
    /// Every domain the co-processor knows, one callback per entry.
    All,
    /// The selected domain with its channel mask.
    Current,
}

/// `(index, total, is_current, info)`.  Failure is reported as
/// `(0, 0, false, None)`.
pub type RegDomainCallback = Box<dyn FnMut(u8, u8, bool, Option<&RegDomainInfo>)>;

pub struct RegDomainCtrl {
    cb: Option<RegDomainCallback>,
    set_in_progress: bool,
    retries: u8,
    max_retries: u8,
    active: RegDomainInfo,
    avail_num: u8,
}

fn new_req(max_cmds: usize, extra_len: usize) -> Option<CmdReq<WdrvState>> {
    CmdReq::alloc(max_cmds, extra_len, Some(cmd_rsp as CmdRspCallback<WdrvState>), 0)
}

/// WIFIC parameter id and list index.  Requests carry a plain integer,
/// responses a fractional one.
fn wific_id(elem: &ParamElem<'_>) -> Option<(u16, i16)> {
    if let Some(id) = elem.as_frac() {
        return Some((id.i, id.f));
    }
    elem.as_u64().and_then(|v| u16::try_from(v).ok()).map(|id| (id, 0))
}

fn display(name: &[u8]) -> &str {
    core::str::from_utf8(name).unwrap_or("?")
}

impl RegDomainCtrl {
    pub fn new(max_retries: u8) -> Self {
        Self {
            cb: None,
            set_in_progress: false,
            retries: 0,
            max_retries,
            active: RegDomainInfo::default(),
            avail_num: 0,
        }
    }

    /// Last confirmed domain.
    pub fn active(&self) -> &RegDomainInfo {
        &self.active
    }

    pub fn is_busy(&self) -> bool {
        self.cb.is_some()
    }

    pub fn set(&mut self, tx: &mut dyn DevTx<WdrvState>, name: &[u8], mut cb: RegDomainCallback) -> Result<()> {
        if name.is_empty() || name.len() > REGDOMAIN_MAX_NAME_LEN {
            return Err(Error::InvalidArg);
        }
        if self.cb.is_some() {
            return Err(Error::RetryRequest);
        }
        if name == self.active.name() {
            cb(1, 1, true, Some(&self.active));
            return Ok(());
        }

        let mut req = new_req(1, name.len()).ok_or(Error::RequestError)?;
        if !cmds::cmd_wific(&mut req, WIFIC_REGDOMAIN_SELECTED, Some(Param::Str(name))) || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }

        info!("REGDOM: selecting {}", display(name));
        self.cb = Some(cb);
        self.set_in_progress = true;
        self.retries = 0;
        Ok(())
    }

    pub fn get(&mut self, tx: &mut dyn DevTx<WdrvState>, select: RegDomainSelect, cb: RegDomainCallback) -> Result<()> {
        if self.cb.is_some() {
            return Err(Error::RetryRequest);
        }
        let sent = match select {
            RegDomainSelect::All => {
                self.avail_num = 0;
                let mut req = new_req(1, 0).ok_or(Error::RequestError)?;
                cmds::cmd_wific(&mut req, WIFIC_REGDOMAIN_AVAILABLE, None) && tx.transmit(req).is_ok()
            }
            RegDomainSelect::Current => self.get_current(tx),
        };
        if !sent {
            return Err(Error::RequestError);
        }
        self.cb = Some(cb);
        Ok(())
    }

    fn get_current(&mut self, tx: &mut dyn DevTx<WdrvState>) -> bool {
        let Some(mut req) = new_req(2, 0) else {
            return false;
        };
        cmds::cmd_wific(&mut req, WIFIC_REGDOMAIN_SELECTED, None)
            && cmds::cmd_wific(&mut req, WIFIC_REGDOMAIN_CHANMASK24, None)
            && tx.transmit(req).is_ok()
    }

    fn fail(&mut self) {
        self.set_in_progress = false;
        if let Some(mut cb) = self.cb.take() {
            cb(0, 0, false, None);
        }
    }

    // ── Engine events ─────────────────────────────────────────

    fn process_status(&mut self, tx: &mut dyn DevTx<WdrvState>, st: &CmdStatus<'_>) {
        if st.rsp_cmd_id != CMD_ID_WIFIC || self.cb.is_none() {
            return;
        }
        let Some(src) = st.src_cmd.elements() else {
            return;
        };
        let Some((id, _)) = src.first().and_then(wific_id) else {
            return;
        };

        if st.status != STATUS_OK {
            warn!("REGDOM: WIFIC {} failed, status {}", id, st.status);
            self.fail();
            return;
        }

        match id {
            // The set itself was accepted; confirm by reading back.
            WIFIC_REGDOMAIN_SELECTED if st.src_cmd.num_params == 2 => {
                if !self.get_current(tx) {
                    self.fail();
                }
            }
            // Every entry reported clears the callback; anything left over
            // means the listing came up short.
            WIFIC_REGDOMAIN_AVAILABLE => {
                if self.cb.is_some() {
                    warn!("REGDOM: listing ended early, {} expected", self.avail_num);
                    self.fail();
                }
            }
            WIFIC_REGDOMAIN_CHANMASK24 if !self.set_in_progress => {
                if let Some(mut cb) = self.cb.take() {
                    cb(1, 1, true, Some(&self.active));
                }
            }
            _ => {}
        }
    }

    fn process_rsp(&mut self, tx: &mut dyn DevTx<WdrvState>, rsp: &RspElems<'_>) {
        if rsp.rsp_id != CMD_ID_WIFIC || rsp.num_elems() != 2 {
            return;
        }
        let Some((id, index)) = wific_id(&rsp.elems[0]) else {
            return;
        };
        let value = &rsp.elems[1];

        match id {
            WIFIC_REGDOMAIN_SELECTED => {
                // Echo of a set, not a read.
                if rsp.src_cmd.is_some_and(|s| s.num_params == 2) {
                    return;
                }
                let Some(info) = RegDomainInfo::from_elem(value) else {
                    return;
                };
                if !self.set_in_progress {
                    self.active.name = info.name;
                    return;
                }

                if info.name == self.active.name {
                    if self.retries >= self.max_retries {
                        warn!("REGDOM: domain unchanged after {} reads", self.retries);
                        self.fail();
                        return;
                    }
                    self.retries += 1;
                    if !self.get_current(tx) {
                        self.fail();
                    }
                    return;
                }

                info!("REGDOM: active {}", display(&info.name));
                self.active = info;
                self.set_in_progress = false;
            }

            WIFIC_REGDOMAIN_AVAILABLE => {
                if self.cb.is_none() {
                    return;
                }
                if index == -1 {
                    self.avail_num = value.as_u64().map_or(0, |n| u8::try_from(n).unwrap_or(u8::MAX));
                    return;
                }
                let Some(mut info) = RegDomainInfo::from_elem(value) else {
                    return;
                };
                let Ok(index) = u8::try_from(index) else {
                    return;
                };
                if index >= self.avail_num {
                    return;
                }

                let current = info.name == self.active.name;
                if current {
                    info.channel_mask = self.active.channel_mask;
                }
                let (nth, total) = (index + 1, self.avail_num);
                if let Some(cb) = self.cb.as_mut() {
                    cb(nth, total, current, Some(&info));
                }
                if nth == total {
                    self.cb = None;
                }
            }

            WIFIC_REGDOMAIN_CHANMASK24 => {
                let Some(mask) = value.as_u64() else {
                    return;
                };
                self.active.channel_mask = mask as u16;
                if !self.set_in_progress {
                    if let Some(mut cb) = self.cb.take() {
                        cb(1, 1, true, Some(&self.active));
                    }
                }
            }

            _ => {}
        }
    }
}

pub(crate) fn cmd_rsp(
    state: &mut WdrvState,
    tx: &mut dyn DevTx<WdrvState>,
    _req: ReqHandle,
    _ctx: usize,
    ev: CmdReqEvent<'_>,
) {
    match ev {
        CmdReqEvent::CmdStatus(st) => state.regdomain.process_status(tx, &st),
        CmdReqEvent::RspReceived(rsp) => state.regdomain.process_rsp(tx, &rsp),
        CmdReqEvent::TxComplete | CmdReqEvent::StatusComplete { .. } => {}
    }
}
