//! Device core: frame dispatch and request correlation.
//!
//! One [`Device`] owns the transport, the receive buffer, every
//! transmitted [`CmdReq`] until it completes, the unsolicited-event
//! (AEC) handler and the bus state.
//!
//! Callbacks are plain function pointers.  Each receives `&mut S`, the
//! caller's state threaded through [`Device::update_event`], and a
//! `&mut dyn DevTx<S>` so it can issue follow-up requests from inside the
//! callback:
//!
//! ```text
//!  update_event(&mut S)
//!    ├─ pending TX-complete ─────────▶ cb(S, tx, handle, ctx, TxComplete)
//!    └─ decode one frame
//!         ├─ CMD_STATUS ─ seq ▶ req ─▶ cb(.., CmdStatus)
//!         │                  └─ last status ─▶ cb(.., StatusComplete) ─▶ chained req
//!         ├─ RSP ──────── seq ▶ req ─▶ cb(.., RspReceived)
//!         └─ AEC ────────────────────▶ aec(S, tx, ctx, elems)
//! ```

use alloc::vec::Vec;
use core::fmt;

use log::{info, warn};

use super::cmd_req::{CmdReq, ReqHandle};
use super::codec::{Decoded, Frame, FrameDecoder};
use super::elem::{ElemList, unpack_elements};
use super::transport::Transport;

/// Engine version reported by [`Device::version`].
pub const DRIVER_VERSION: DriverVersion = DriverVersion {
    major: 3,
    minor: 1,
    patch: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ---------------------------------------------------------------------------
// Bus state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Unknown,
    /// Transport fault.  Sticky until the application resets it.
    Error,
    Idle,
    Active,
}

// ---------------------------------------------------------------------------
// Callback events
// ---------------------------------------------------------------------------

/// The originating command of a status or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcCmd<'a> {
    /// Position of the command within its burst.
    pub idx: u8,
    pub num_params: u8,
    /// Raw TLV parameter bytes as originally encoded.
    pub params: &'a [u8],
}

impl<'a> SrcCmd<'a> {
    /// Re-decode the original parameters.
    pub fn elements(&self) -> Option<ElemList<'a>> {
        unpack_elements(usize::from(self.num_params), self.params)
    }
}

/// Per-command completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdStatus<'a> {
    pub rsp_cmd_id: u16,
    pub status: u16,
    pub seq: u16,
    pub src_cmd: SrcCmd<'a>,
}

/// Typed elements of a response or unsolicited event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RspElems<'a> {
    /// Command that produced the response; 0 for unsolicited events.
    pub rsp_cmd_id: u16,
    /// Response or event id.
    pub rsp_id: u16,
    pub src_cmd: Option<SrcCmd<'a>>,
    pub elems: ElemList<'a>,
}

impl RspElems<'_> {
    pub fn num_elems(&self) -> usize {
        self.elems.len()
    }
}

/// Events delivered to a request's callback.
#[derive(Debug, PartialEq, Eq)]
pub enum CmdReqEvent<'a> {
    /// The burst left the host.
    TxComplete,
    /// Terminal.  The request region is handed back to the callback.
    StatusComplete {
        num_cmds: u8,
        num_errors: u8,
        buffer: Vec<u8>,
    },
    CmdStatus(CmdStatus<'a>),
    RspReceived(RspElems<'a>),
}

/// Request completion callback: `(state, tx, request, context, event)`.
pub type CmdRspCallback<S> = fn(&mut S, &mut dyn DevTx<S>, ReqHandle, usize, CmdReqEvent<'_>);

/// Unsolicited event callback: `(state, tx, context, event)`.
pub type AecCallback<S> = fn(&mut S, &mut dyn DevTx<S>, usize, &RspElems<'_>);

/// Receive intercept: `(state, context, msg_type, body)`.  Returning
/// `true` consumes the frame before normal dispatch.
pub type RxInterceptCallback<S> = fn(&mut S, usize, u8, &[u8]) -> bool;

/// The transmit half of a device, as seen by callbacks and modules.
pub trait DevTx<S> {
    /// Hand a request to the transport.  A refused request comes back in
    /// `Err`, untouched by the engine, ready for [`Device::discard`].
    fn transmit(&mut self, req: CmdReq<S>) -> Result<(), CmdReq<S>>;

    fn bus_state(&self) -> BusState;
}

// ---------------------------------------------------------------------------
// Transmit half
// ---------------------------------------------------------------------------

struct Link<T, S> {
    transport: T,
    in_flight: Vec<CmdReq<S>>,
    bus: BusState,
    next_seq: u16,
}

impl<T: Transport, S> Link<T, S> {
    fn alloc_seq(next_seq: &mut u16) -> u16 {
        if *next_seq == 0 {
            *next_seq = 1;
        }
        let seq = *next_seq;
        *next_seq = next_seq.wrapping_add(1);
        seq
    }

    /// Locate the in-flight command carrying `seq`.
    fn find(&self, seq: u16) -> Option<(usize, usize)> {
        self.in_flight
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.find_seq(seq).map(|k| (i, k)))
    }

    fn send(&mut self, req: &CmdReq<S>) -> Result<(), T::Error> {
        for frag in req.fragments() {
            self.transport.write(req.fragment_bytes(frag))?;
        }
        self.transport.flush()
    }
}

impl<T: Transport, S> DevTx<S> for Link<T, S> {
    fn transmit(&mut self, mut req: CmdReq<S>) -> Result<(), CmdReq<S>> {
        if self.bus == BusState::Error {
            warn!("NC: transmit refused, bus in error");
            return Err(req);
        }
        if req.num_cmds() == 0 {
            return Err(req);
        }

        let next_seq = &mut self.next_seq;
        req.prepare_burst(|| Self::alloc_seq(next_seq));

        if let Err(e) = self.send(&req) {
            warn!("NC: transport write failed: {:?}", e);
            self.bus = BusState::Error;
            return Err(req);
        }

        req.tx_pending = true;
        self.in_flight.push(req);
        self.bus = BusState::Active;
        Ok(())
    }

    fn bus_state(&self) -> BusState {
        self.bus
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One co-processor engine instance.
pub struct Device<T, S> {
    link: Link<T, S>,
    rx: FrameDecoder,
    aec: Option<(AecCallback<S>, usize)>,
    intercept: Option<(RxInterceptCallback<S>, usize)>,
}

impl<T: Transport, S> Device<T, S> {
    pub fn new(transport: T, receive_buffer_size: usize) -> Self {
        info!("NC: device init, rx buffer {} bytes, version {}", receive_buffer_size, DRIVER_VERSION);
        Self {
            link: Link {
                transport,
                in_flight: Vec::new(),
                bus: BusState::Unknown,
                next_seq: 1,
            },
            rx: FrameDecoder::new(receive_buffer_size),
            aec: None,
            intercept: None,
        }
    }

    pub fn version(&self) -> DriverVersion {
        DRIVER_VERSION
    }

    pub fn transport(&self) -> &T {
        &self.link.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.link.transport
    }

    /// Number of transmitted requests not yet complete.
    pub fn in_flight(&self) -> usize {
        self.link.in_flight.len()
    }

    /// Force the bus state.  This is the only way out of `Error`; moving
    /// to `Unknown` also drops any partially received bytes.
    pub fn set_bus_state(&mut self, state: BusState) {
        info!("NC: bus state {:?} -> {:?}", self.link.bus, state);
        if state == BusState::Unknown {
            self.rx.reset();
        }
        self.link.bus = state;
    }

    pub fn register_aec_callback(&mut self, cb: AecCallback<S>, context: usize) {
        self.aec = Some((cb, context));
    }

    pub fn deregister_aec_callback(&mut self) {
        self.aec = None;
    }

    pub fn set_rx_intercept(&mut self, cb: Option<RxInterceptCallback<S>>, context: usize) {
        self.intercept = cb.map(|cb| (cb, context));
    }

    /// Abandon an unsent request.  Its callback, and that of every chained
    /// follow-up, sees `StatusComplete` with no commands executed.
    pub fn discard(&mut self, state: &mut S, req: CmdReq<S>) {
        discard_chain(&mut self.link, state, req);
    }

    /// Process at most one event.  Returns whether one was consumed.
    pub fn update_event(&mut self, state: &mut S) -> bool {
        if self.link.bus == BusState::Error {
            return false;
        }

        // TX-complete notifications first, oldest request first.
        if let Some(req) = self.link.in_flight.iter_mut().find(|r| r.tx_pending) {
            req.tx_pending = false;
            let handle = req.handle();
            let callback = req.callback();
            if let Some((cb, ctx)) = callback {
                cb(state, &mut self.link, handle, ctx, CmdReqEvent::TxComplete);
            }
            return true;
        }

        if let Err(e) = self.rx.fill(&mut self.link.transport) {
            warn!("NC: transport read failed: {:?}", e);
            self.link.bus = BusState::Error;
            return false;
        }

        let (msg_type, body) = match self.rx.decode() {
            Decoded::Incomplete => return false,
            Decoded::Discarded(_) => return true,
            Decoded::Frame { msg_type, body } => (msg_type, body),
        };

        if self.link.bus == BusState::Unknown {
            self.link.bus = BusState::Idle;
        }

        let intercepted = match self.intercept {
            Some((cb, ctx)) => cb(state, ctx, msg_type, body),
            None => false,
        };

        if !intercepted {
            match Frame::parse(msg_type, body) {
                Ok(frame) => dispatch(&mut self.link, self.aec, state, frame),
                Err(e) => warn!("NC: dropping frame: {}", e),
            }
        }

        self.rx.consume();
        true
    }

    /// Pump events until `still_pending` reports the data-ready line idle.
    ///
    /// Stops early if a full pass consumed nothing, so a stuck line cannot
    /// spin forever.  Returns whether anything was processed.
    pub fn handle_event(&mut self, state: &mut S, mut still_pending: impl FnMut() -> bool) -> bool {
        let mut handled = false;
        loop {
            let mut progressed = false;
            while self.update_event(state) {
                progressed = true;
            }
            handled |= progressed;

            if !progressed || !still_pending() {
                break;
            }
        }
        handled
    }
}

impl<T: Transport, S> DevTx<S> for Device<T, S> {
    fn transmit(&mut self, req: CmdReq<S>) -> Result<(), CmdReq<S>> {
        self.link.transmit(req)
    }

    fn bus_state(&self) -> BusState {
        self.link.bus
    }
}

// ── Dispatch ──────────────────────────────────────────────────

fn dispatch<T: Transport, S>(
    link: &mut Link<T, S>,
    aec: Option<(AecCallback<S>, usize)>,
    state: &mut S,
    frame: Frame<'_>,
) {
    match frame {
        Frame::CmdStatus { seq, cmd_id, status } => {
            let Some((i, k)) = link.find(seq) else {
                warn!("NC: status for unknown seq {} (cmd 0x{:04x})", seq, cmd_id);
                return;
            };

            let mut req = link.in_flight.remove(i);
            req.record_status(k, status);

            if let (Some((cb, ctx)), Some(src_cmd)) = (req.callback(), req.src_cmd(k)) {
                let ev = CmdStatus {
                    rsp_cmd_id: req.cmd_id(k).unwrap_or(cmd_id),
                    status,
                    seq,
                    src_cmd,
                };
                cb(state, &mut *link, req.handle(), ctx, CmdReqEvent::CmdStatus(ev));
            }

            if req.all_status_received() {
                complete(link, state, req);
            } else {
                let at = i.min(link.in_flight.len());
                link.in_flight.insert(at, req);
            }
        }

        Frame::Rsp { seq, rsp_id, .. } => {
            let elems = match frame.elements() {
                Ok(elems) => elems,
                Err(e) => {
                    warn!("NC: response 0x{:04x}: {}", rsp_id, e);
                    return;
                }
            };
            let Some((i, k)) = link.find(seq) else {
                warn!("NC: response for unknown seq {} (rsp 0x{:04x})", seq, rsp_id);
                return;
            };

            let req = link.in_flight.remove(i);
            if let Some((cb, ctx)) = req.callback() {
                let ev = RspElems {
                    rsp_cmd_id: req.cmd_id(k).unwrap_or(0),
                    rsp_id,
                    src_cmd: req.src_cmd(k),
                    elems,
                };
                cb(state, &mut *link, req.handle(), ctx, CmdReqEvent::RspReceived(ev));
            }
            let at = i.min(link.in_flight.len());
            link.in_flight.insert(at, req);
        }

        Frame::Aec { aec_id, .. } => {
            let elems = match frame.elements() {
                Ok(elems) => elems,
                Err(e) => {
                    warn!("NC: event 0x{:04x}: {}", aec_id, e);
                    return;
                }
            };
            if let Some((cb, ctx)) = aec {
                let ev = RspElems {
                    rsp_cmd_id: 0,
                    rsp_id: aec_id,
                    src_cmd: None,
                    elems,
                };
                cb(state, link, ctx, &ev);
            }
        }
    }
}

/// Deliver `StatusComplete`, release the request and start any chained
/// follow-up.
fn complete<T: Transport, S>(link: &mut Link<T, S>, state: &mut S, req: CmdReq<S>) {
    let done = req.finish();

    if link.in_flight.is_empty() && link.bus == BusState::Active {
        link.bus = BusState::Idle;
    }

    if let Some(cb) = done.callback {
        let ev = CmdReqEvent::StatusComplete {
            num_cmds: done.num_cmds,
            num_errors: done.num_errors,
            buffer: done.buffer,
        };
        cb(state, &mut *link, done.handle, done.context, ev);
    }

    if let Some(next) = done.next {
        if let Err(next) = link.transmit(next) {
            warn!("NC: chained request {:?} could not be sent", next.handle());
            discard_chain(link, state, next);
        }
    }
}

fn discard_chain<T: Transport, S>(link: &mut Link<T, S>, state: &mut S, req: CmdReq<S>) {
    let mut cur = Some(req);
    while let Some(req) = cur {
        let done = req.finish();
        if let Some(cb) = done.callback {
            let ev = CmdReqEvent::StatusComplete {
                num_cmds: 0,
                num_errors: 0,
                buffer: done.buffer,
            };
            cb(state, &mut *link, done.handle, done.context, ev);
        }
        cur = done.next;
    }
}
