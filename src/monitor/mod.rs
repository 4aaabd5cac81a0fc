//! Device Monitors
//!
//! Subscription wrappers around a device's state stream and its flight plan
//! piloting interface. A monitor owns its SDK subscription; once released,
//! its callback is never invoked again.

mod device_state;
mod piloting;

pub use device_state::DeviceStateMonitor;
pub use piloting::{ConfinedItf, PilotingInterfaceMonitor};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Open/closed flag shared between a monitor and the callback it registered
#[derive(Debug, Clone)]
struct Gate(Arc<AtomicBool>);

impl Gate {
    fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Close the gate, returning whether it was open
    fn close(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
