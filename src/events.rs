//! Interrupt-side "data ready" signalling.
//!
//! The co-processor raises a line when it has frames for the host.  The
//! interrupt handler must not touch engine or session state, so all it
//! does is set a flag here.  The main loop observes the flag and pumps
//! the engine with [`crate::wdrv::Wdrv::handle_event`].
//!
//! ```text
//! ┌─────────────┐  signal()  ┌──────────────┐  take()   ┌──────────────┐
//! │ IRQ handler │───────────▶│  DataReady   │──────────▶│  Main Loop   │
//! │ (ISR ctx)   │            │  (atomic)    │           │ handle_event │
//! └─────────────┘            └──────────────┘           └──────────────┘
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Lock-free flag shared between an interrupt handler and the pump loop.
///
/// Usually placed in a `static` so the ISR can reach it.
pub struct DataReady {
    pending: AtomicBool,
    count: AtomicU32,
}

impl DataReady {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            count: AtomicU32::new(0),
        }
    }

    /// Mark data as pending.
    /// Safe to call from ISR context (lock-free, no allocation).
    pub fn signal(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending flag.  Returns whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Peek without consuming; suitable as a `handle_event` predicate.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Total number of signals raised since construction (wraps).
    pub fn signal_count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for DataReady {
    fn default() -> Self {
        Self::new()
    }
}
