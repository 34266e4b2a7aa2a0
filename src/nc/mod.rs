//! Co-processor protocol core.
//!
//! ```text
//! ┌──────────┐  cmds::*   ┌──────────┐ transmit ┌──────────┐  write  ┌───────────┐
//! │  module  │──────────▶│  CmdReq  │─────────▶│  Device  │────────▶│ Transport │
//! └──────────┘            └──────────┘          └──────────┘         └───────────┘
//!       ▲                                  callbacks │  ▲ read             │
//!       └────────────────── elem::ParamElem ◀────────┘  └─────────────────┘
//! ```

pub mod cmd_req;
pub mod cmds;
pub mod codec;
pub mod dev;
pub mod elem;
pub mod transport;

pub use cmd_req::{CmdReq, ReqHandle, STATUS_OK};
pub use dev::{BusState, CmdReqEvent, CmdRspCallback, DevTx, Device, RspElems, SrcCmd};
pub use elem::{ElemType, FractInt, MacAddr, Param, ParamElem, read_param_elem, unpack_elements};
pub use transport::Transport;
