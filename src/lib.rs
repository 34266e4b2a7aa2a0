//! Host-side driver for a wireless network co-processor.
//!
//! Layers, leaves first:
//! - [`nc`]: the command/response engine (TLV elements, command bursts,
//!   frame dispatch, transport trait).
//! - [`wdrv`]: stateful services built on the engine (file transfer,
//!   regulatory domain, association tracking) behind the [`wdrv::Wdrv`]
//!   facade.
//!
//! Everything runs from the caller's pump loop; the only interrupt-safe
//! entry point is [`events::DataReady`].

#![deny(unused_must_use)]

extern crate alloc;

pub mod config;
pub mod events;
pub mod nc;
pub mod wdrv;

mod error;

pub use error::{Error, FrameError, Result};
