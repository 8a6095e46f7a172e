//! Process-wide stop requests.
//!
//! [`ProcessControl`] is created once by the binary. It holds the shutdown flag that the
//! pipeline and the reporting loop poll, and the [`ActiveSource`] slot through which an
//! interrupt reaches whatever source is currently running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::source::StopHandle;
use crate::{Result, SonarError};

/// Set once an interrupt (or a programmatic shutdown) has been requested.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Reassignable slot holding the stop handle of the running source.
///
/// Set when a session starts and cleared when it is torn down.
#[derive(Debug, Clone, Default)]
pub struct ActiveSource {
    slot: Arc<Mutex<Option<StopHandle>>>,
}

impl ActiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, handle: StopHandle) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handle);
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Stop the active source, if any. Never blocks.
    ///
    /// Returns false if there was no source or the slot was busy. A busy slot means a
    /// session is being set up or torn down, and either path observes the shutdown flag.
    pub fn request_stop(&self) -> bool {
        match self.slot.try_lock() {
            Ok(slot) => match slot.as_ref() {
                Some(handle) => {
                    handle.stop();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

/// Shutdown flag plus active source, shared by the binary, the session and the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub shutdown: ShutdownFlag,
    pub active: ActiveSource,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// What the interrupt handler does: set the flag and stop the active source.
    pub fn interrupt(&self) {
        self.shutdown.trigger();
        self.active.request_stop();
    }

    pub fn is_interrupted(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Route SIGINT/SIGTERM to [`interrupt`](Self::interrupt). Can only be done once per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let control = self.clone();
        ctrlc::set_handler(move || control.interrupt()).map_err(SonarError::Signal)?;
        debug!("Interrupt handler installed");
        Ok(())
    }
}
