//! Driver configuration parameters.
//!
//! Runtime-tunable sizes and policy knobs.  Fixed pool capacities are
//! compile-time constants below; everything in [`DriverConfig`] can be
//! persisted (postcard) or provisioned (JSON) by the owning application.

use serde::{Deserialize, Serialize};

// --- Fixed pool capacities ---

/// Number of concurrently open file transfer sessions.
pub const FILE_CTX_NUM: usize = 2;

/// File staging buffer size.  Writes are coalesced into blocks of this size.
pub const FILE_LOAD_BUF_SZ: usize = 128;

/// Number of peer slots tracked in access-point role.
pub const NUM_ASSOCS: usize = 8;

/// Maximum typed elements carried by one response or event.
pub const MAX_ELEMS: usize = 10;

/// Longest regulatory-domain name the co-processor reports.
pub const REGDOMAIN_MAX_NAME_LEN: usize = 6;

/// Core driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Receive buffer size in bytes; bounds the largest accepted frame.
    pub receive_buffer_size: usize,
    /// How many times a regulatory-domain set is re-confirmed before
    /// giving up.
    pub regdomain_max_retries: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: 2048,
            regdomain_max_retries: 5,
        }
    }
}

impl DriverConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.receive_buffer_size < 64 || self.receive_buffer_size > usize::from(u16::MAX) {
            return Err("receive buffer size out of range");
        }
        Ok(())
    }

    /// Parse a provisioning document.  Every field must be present.
    pub fn from_json(raw: &[u8]) -> Result<Self, &'static str> {
        let cfg: Self = serde_json::from_slice(raw).map_err(|_| "malformed config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Compact form for flash persistence.
    pub fn to_postcard(&self) -> Result<alloc::vec::Vec<u8>, &'static str> {
        postcard::to_allocvec(self).map_err(|_| "config encode failed")
    }

    /// Decode the flash form written by [`Self::to_postcard`].
    pub fn from_postcard(raw: &[u8]) -> Result<Self, &'static str> {
        let cfg: Self = postcard::from_bytes(raw).map_err(|_| "malformed config blob")?;
        cfg.validate()?;
        Ok(cfg)
    }
}
