//! Association tracking.
//!
//! Keeps one entry for the station interface and [`NUM_ASSOCS`] entries
//! for peers of the access-point interface.  Connection events and RSSI
//! reports arrive unsolicited and are routed here by the facade.

use alloc::boxed::Box;

use log::{info, warn};

use super::WdrvState;
use crate::config::NUM_ASSOCS;
use crate::error::{Error, Result};
use crate::nc::cmd_req::{CmdReq, ReqHandle};
use crate::nc::cmds::{self, AEC_ID_ASSOC, AEC_ID_WAPSC, AEC_ID_WAPSD, AEC_ID_WSTALD, AEC_ID_WSTALU, CMD_ID_ASSOC};
use crate::nc::dev::{CmdReqEvent, CmdRspCallback, DevTx, RspElems};
use crate::nc::elem::{ElemList, MacAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocRole {
    Station,
    AccessPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Sta,
    Ap(u8),
}

/// Refers to one entry of the association table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssocHandle(Slot);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    Connected,
    Disconnected,
}

/// `(association, rssi)` for every RSSI report on a known association.
pub type RssiCallback = Box<dyn FnMut(AssocHandle, i8)>;
pub type ConnectCallback = Box<dyn FnMut(AssocHandle, ConnEvent)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssocInfo {
    pub in_use: bool,
    pub peer: Option<MacAddr>,
    pub assoc_id: u16,
    /// 0 until a report arrives.
    pub rssi: i8,
    pub auth_type: u8,
}

pub struct AssocCtrl {
    role: Option<AssocRole>,
    sta_connected: bool,
    sta: AssocInfo,
    ap: [AssocInfo; NUM_ASSOCS],
    rssi_cb: Option<RssiCallback>,
    connect_cb: Option<ConnectCallback>,
}

impl Default for AssocCtrl {
    fn default() -> Self {
        Self::new()
    }
}

impl AssocCtrl {
    pub fn new() -> Self {
        Self {
            role: None,
            sta_connected: false,
            sta: AssocInfo::default(),
            ap: [AssocInfo::default(); NUM_ASSOCS],
            rssi_cb: None,
            connect_cb: None,
        }
    }

    pub fn role(&self) -> Option<AssocRole> {
        self.role
    }

    /// Claim the station entry.  Its handle stays valid across link
    /// up/down; connection state is tracked from events.
    pub fn station(&mut self) -> AssocHandle {
        self.role = Some(AssocRole::Station);
        self.sta.in_use = true;
        AssocHandle(Slot::Sta)
    }

    pub fn info(&self, handle: AssocHandle) -> &AssocInfo {
        match handle.0 {
            Slot::Sta => &self.sta,
            Slot::Ap(i) => &self.ap[usize::from(i)],
        }
    }

    fn info_mut(&mut self, handle: AssocHandle) -> &mut AssocInfo {
        match handle.0 {
            Slot::Sta => &mut self.sta,
            Slot::Ap(i) => &mut self.ap[usize::from(i)],
        }
    }

    fn is_connected(&self, handle: AssocHandle) -> bool {
        match handle.0 {
            Slot::Sta => self.sta_connected,
            Slot::Ap(i) => self.ap[usize::from(i)].in_use,
        }
    }

    /// With a MAC, the access-point entry holding that peer.  Without
    /// one, the first free entry.
    pub fn find_sta_info(&self, mac: Option<&MacAddr>) -> Option<AssocHandle> {
        let idx = match mac {
            None => self.ap.iter().position(|a| !a.in_use && a.peer.is_none()),
            Some(mac) => self.ap.iter().position(|a| a.in_use && a.peer.as_ref() == Some(mac)),
        }?;
        Some(AssocHandle(Slot::Ap(idx as u8)))
    }

    pub fn set_connect_callback(&mut self, cb: Option<ConnectCallback>) {
        self.connect_cb = cb;
    }

    /// Cached RSSI without a callback; with one, always query the
    /// co-processor and return [`Error::RetryRequest`].  The callback
    /// replaces any previously registered one.
    pub fn rssi_get(
        &mut self,
        tx: &mut dyn DevTx<WdrvState>,
        handle: AssocHandle,
        cb: Option<RssiCallback>,
    ) -> Result<i8> {
        let info = *self.info(handle);
        if !info.in_use {
            return Err(Error::NotConnected);
        }
        let push = cb.is_some();
        self.rssi_cb = cb;

        if !self.is_connected(handle) {
            return Err(Error::RequestError);
        }
        if !push {
            return if info.rssi == 0 { Err(Error::RequestError) } else { Ok(info.rssi) };
        }

        let mut req = CmdReq::alloc(1, 0, Some(cmd_rsp as CmdRspCallback<WdrvState>), 0).ok_or(Error::RequestError)?;
        if !cmds::cmd_assoc(&mut req, Some(info.assoc_id)) || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }
        Err(Error::RetryRequest)
    }

    pub fn peer_address_get(&self, handle: AssocHandle) -> Result<MacAddr> {
        let info = self.info(handle);
        if !info.in_use {
            return Err(Error::NotConnected);
        }
        match info.peer {
            Some(mac) => Ok(mac),
            None if self.is_connected(handle) => Err(Error::RetryRequest),
            None => Err(Error::RequestError),
        }
    }

    /// Drop the station link.  Peers of an access point cannot be
    /// disconnected from here.
    pub fn disconnect(&mut self, tx: &mut dyn DevTx<WdrvState>, handle: AssocHandle) -> Result<()> {
        if !self.info(handle).in_use {
            return Err(Error::NotConnected);
        }
        if self.role == Some(AssocRole::AccessPoint) || matches!(handle.0, Slot::Ap(_)) {
            return Err(Error::OperationNotSupported);
        }
        if !self.sta_connected {
            return Err(Error::RequestError);
        }

        let mut req = CmdReq::alloc(1, 0, Some(cmd_rsp as CmdRspCallback<WdrvState>), 0).ok_or(Error::RequestError)?;
        if !cmds::cmd_wstadisc(&mut req) || tx.transmit(req).is_err() {
            return Err(Error::RequestError);
        }
        info!("ASSOC: station disconnect requested");
        Ok(())
    }

    // ── Events ────────────────────────────────────────────────

    fn notify(&mut self, handle: AssocHandle, ev: ConnEvent) {
        if let Some(cb) = self.connect_cb.as_mut() {
            cb(handle, ev);
        }
    }

    /// RSSI report: assoc id, peer-is-station, peer MAC, RSSI.
    fn rssi_report(&mut self, elems: &ElemList<'_>) {
        if elems.len() != 4 {
            return;
        }
        let (Some(assoc_id), Some(mac), Some(rssi)) = (elems[0].as_u64(), elems[2].as_mac(), elems[3].as_i64()) else {
            return;
        };
        let peer_is_sta = elems[1]
            .as_bool()
            .or_else(|| elems[1].as_u64().map(|v| v != 0))
            .unwrap_or(false);

        let handle = if peer_is_sta {
            self.find_sta_info(Some(&mac))
        } else {
            (self.sta.in_use && u64::from(self.sta.assoc_id) == assoc_id).then_some(AssocHandle(Slot::Sta))
        };
        let Some(handle) = handle else {
            return;
        };

        let rssi = rssi.clamp(i64::from(i8::MIN), i64::from(i8::MAX)) as i8;
        self.info_mut(handle).rssi = rssi;
        if let Some(cb) = self.rssi_cb.as_mut() {
            cb(handle, rssi);
        }
    }

    pub(crate) fn process_aec(&mut self, ev: &RspElems<'_>) {
        let elems = &ev.elems;
        match ev.rsp_id {
            AEC_ID_ASSOC => self.rssi_report(elems),

            AEC_ID_WSTALU => {
                let (Some(assoc_id), Some(bssid)) =
                    (elems.first().and_then(|e| e.as_u64()), elems.get(1).and_then(|e| e.as_mac()))
                else {
                    return;
                };
                let channel = elems.get(2).and_then(|e| e.as_u64()).unwrap_or(0);
                self.role = Some(AssocRole::Station);
                self.sta_connected = true;
                self.sta = AssocInfo {
                    in_use: true,
                    peer: Some(bssid),
                    assoc_id: assoc_id as u16,
                    rssi: 0,
                    auth_type: self.sta.auth_type,
                };
                info!("ASSOC: station up, assoc {} channel {}", assoc_id, channel);
                self.notify(AssocHandle(Slot::Sta), ConnEvent::Connected);
            }

            AEC_ID_WSTALD => {
                if !self.sta_connected {
                    return;
                }
                self.sta_connected = false;
                self.sta.peer = None;
                self.sta.rssi = 0;
                info!("ASSOC: station down");
                self.notify(AssocHandle(Slot::Sta), ConnEvent::Disconnected);
            }

            AEC_ID_WAPSC => {
                let (Some(assoc_id), Some(mac)) =
                    (elems.first().and_then(|e| e.as_u64()), elems.get(1).and_then(|e| e.as_mac()))
                else {
                    return;
                };
                self.role = Some(AssocRole::AccessPoint);
                let handle = match self.find_sta_info(Some(&mac)).or_else(|| self.find_sta_info(None)) {
                    Some(h) => h,
                    None => {
                        warn!("ASSOC: association table full");
                        return;
                    }
                };
                *self.info_mut(handle) = AssocInfo {
                    in_use: true,
                    peer: Some(mac),
                    assoc_id: assoc_id as u16,
                    ..AssocInfo::default()
                };
                info!("ASSOC: peer joined, assoc {}", assoc_id);
                self.notify(handle, ConnEvent::Connected);
            }

            AEC_ID_WAPSD => {
                let Some(mac) = elems.get(1).and_then(|e| e.as_mac()) else {
                    return;
                };
                let Some(handle) = self.find_sta_info(Some(&mac)) else {
                    return;
                };
                self.notify(handle, ConnEvent::Disconnected);
                *self.info_mut(handle) = AssocInfo::default();
                info!("ASSOC: peer left");
            }

            _ => {}
        }
    }
}

/// Replies to an association query carry the same fields as an RSSI
/// report.
pub(crate) fn cmd_rsp(
    state: &mut WdrvState,
    _tx: &mut dyn DevTx<WdrvState>,
    _req: ReqHandle,
    _ctx: usize,
    ev: CmdReqEvent<'_>,
) {
    if let CmdReqEvent::RspReceived(rsp) = ev {
        if rsp.rsp_id == CMD_ID_ASSOC {
            state.assoc.rssi_report(&rsp.elems);
        }
    }
}
