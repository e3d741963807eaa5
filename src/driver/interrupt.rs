//! Process-wide interruption registry
//!
//! A host that catches a termination signal can ask the active run to
//! stop via [`request_stop`]. At most one run registers at a time; the
//! registration is bracketed by a guard that unregisters on scope exit,
//! so a crashed run cannot leave a stale flag behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DriverError, Result};

static ACTIVE_RUN: Mutex<Option<Arc<AtomicBool>>> = Mutex::new(None);

/// Scoped registration of a run's stop flag.
pub struct InterruptGuard {
    _private: (),
}

impl InterruptGuard {
    /// Register `flag` as the active run's stop flag.
    ///
    /// Fails with [`DriverError::InterruptBusy`] if another run is
    /// already registered.
    pub fn install(flag: Arc<AtomicBool>) -> Result<Self> {
        let mut active = ACTIVE_RUN.lock().unwrap();
        if active.is_some() {
            return Err(DriverError::InterruptBusy);
        }
        *active = Some(flag);
        Ok(Self { _private: () })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        *ACTIVE_RUN.lock().unwrap() = None;
    }
}

/// Ask the registered run to stop after its current chunk.
///
/// Returns whether a run was registered.
pub fn request_stop() -> bool {
    match ACTIVE_RUN.lock().unwrap().as_ref() {
        Some(flag) => {
            flag.store(true, Ordering::Release);
            true
        }
        None => false,
    }
}
