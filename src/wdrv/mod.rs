//! Driver services built on the engine.
//!
//! [`Wdrv`] owns one [`Device`] and the state of every service module.
//! Module entry points take `&mut dyn DevTx<WdrvState>` so the same code
//! runs from the public API and from inside engine callbacks.
//!
//! ```text
//!  app ──▶ Wdrv::file_* / regdomain_* / assoc_*
//!             │                       ▲
//!             ▼                       │ boxed FnMut callbacks
//!        FileCtrl · RegDomainCtrl · AssocCtrl   (WdrvState)
//!             │ CmdReq                ▲ cmd_rsp / on_aec
//!             ▼                       │
//!          Device ◀──── update_event ─┘
//! ```

pub mod assoc;
pub mod file;
pub mod regdomain;

use log::info;

use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::nc::dev::{BusState, DevTx, Device, RspElems};
use crate::nc::elem::MacAddr;
use crate::nc::transport::Transport;

use assoc::{AssocCtrl, AssocHandle, AssocRole, ConnectCallback, RssiCallback};
use file::{FileCtrl, FileDeleteCallback, FileFindCallback, FileHandle, FileMode, FileStatusCallback, FileType};
use regdomain::{RegDomainCallback, RegDomainCtrl, RegDomainInfo, RegDomainSelect};

/// Per-instance service state, threaded through every engine callback.
pub struct WdrvState {
    pub(crate) file: FileCtrl,
    pub(crate) regdomain: RegDomainCtrl,
    pub(crate) assoc: AssocCtrl,
}

impl WdrvState {
    pub fn new(cfg: &DriverConfig) -> Self {
        Self {
            file: FileCtrl::new(),
            regdomain: RegDomainCtrl::new(cfg.regdomain_max_retries),
            assoc: AssocCtrl::new(),
        }
    }
}

fn on_aec(state: &mut WdrvState, _tx: &mut dyn DevTx<WdrvState>, _ctx: usize, ev: &RspElems<'_>) {
    state.assoc.process_aec(ev);
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// One co-processor with its services.
pub struct Wdrv<T: Transport> {
    dev: Device<T, WdrvState>,
    state: WdrvState,
}

impl<T: Transport> Wdrv<T> {
    pub fn new(transport: T, cfg: &DriverConfig) -> Result<Self> {
        cfg.validate().map_err(|_| Error::InvalidArg)?;

        let mut dev = Device::new(transport, cfg.receive_buffer_size);
        dev.register_aec_callback(on_aec, 0);
        info!("WDRV: services up, {} file slots", crate::config::FILE_CTX_NUM);

        Ok(Self {
            dev,
            state: WdrvState::new(cfg),
        })
    }

    // ── Event pump ────────────────────────────────────────────

    pub fn update_event(&mut self) -> bool {
        self.dev.update_event(&mut self.state)
    }

    pub fn handle_event(&mut self, still_pending: impl FnMut() -> bool) -> bool {
        self.dev.handle_event(&mut self.state, still_pending)
    }

    pub fn bus_state(&self) -> BusState {
        self.dev.bus_state()
    }

    pub fn set_bus_state(&mut self, state: BusState) {
        self.dev.set_bus_state(state);
    }

    pub fn device(&self) -> &Device<T, WdrvState> {
        &self.dev
    }

    /// Raw engine access, for issuing verbs no service wraps.
    pub fn device_mut(&mut self) -> &mut Device<T, WdrvState> {
        &mut self.dev
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.dev.transport_mut()
    }

    // ── File transfer ─────────────────────────────────────────

    pub fn file_open(
        &mut self,
        filename: &[u8],
        file_type: FileType,
        mode: FileMode,
        length: u32,
        status_cb: FileStatusCallback,
    ) -> Option<FileHandle> {
        self.state.file.open(&mut self.dev, filename, file_type, mode, length, status_cb)
    }

    pub fn file_write(&mut self, handle: FileHandle, data: &[u8]) -> Result<()> {
        self.state.file.write(&mut self.dev, handle, data)
    }

    pub fn file_read(&mut self, handle: FileHandle, length: usize) -> Result<()> {
        self.state.file.read(&mut self.dev, handle, length)
    }

    pub fn file_close(&mut self, handle: FileHandle) -> Result<()> {
        self.state.file.close(&mut self.dev, handle)
    }

    pub fn file_find(&mut self, file_type: FileType, cb: FileFindCallback) -> Result<()> {
        self.state.file.find(&mut self.dev, file_type, cb)
    }

    pub fn file_delete(&mut self, filename: &[u8], file_type: FileType, cb: FileDeleteCallback) -> Result<()> {
        self.state.file.delete(&mut self.dev, filename, file_type, cb)
    }

    pub fn file_size(&self, handle: FileHandle) -> Result<u32> {
        self.state.file.file_size(handle)
    }

    // ── Regulatory domain ─────────────────────────────────────

    pub fn regdomain_set(&mut self, name: &[u8], cb: RegDomainCallback) -> Result<()> {
        self.state.regdomain.set(&mut self.dev, name, cb)
    }

    pub fn regdomain_get(&mut self, select: RegDomainSelect, cb: RegDomainCallback) -> Result<()> {
        self.state.regdomain.get(&mut self.dev, select, cb)
    }

    pub fn regdomain_active(&self) -> &RegDomainInfo {
        self.state.regdomain.active()
    }

    // ── Associations ──────────────────────────────────────────

    pub fn assoc_station(&mut self) -> AssocHandle {
        self.state.assoc.station()
    }

    pub fn assoc_role(&self) -> Option<AssocRole> {
        self.state.assoc.role()
    }

    pub fn assoc_find_sta_info(&self, mac: Option<&MacAddr>) -> Option<AssocHandle> {
        self.state.assoc.find_sta_info(mac)
    }

    pub fn assoc_rssi_get(&mut self, handle: AssocHandle, cb: Option<RssiCallback>) -> Result<i8> {
        self.state.assoc.rssi_get(&mut self.dev, handle, cb)
    }

    pub fn assoc_peer_address_get(&self, handle: AssocHandle) -> Result<MacAddr> {
        self.state.assoc.peer_address_get(handle)
    }

    pub fn assoc_disconnect(&mut self, handle: AssocHandle) -> Result<()> {
        self.state.assoc.disconnect(&mut self.dev, handle)
    }

    pub fn assoc_set_connect_callback(&mut self, cb: Option<ConnectCallback>) {
        self.state.assoc.set_connect_callback(cb);
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
