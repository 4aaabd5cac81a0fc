//! Device bindings
//!
//! A binding ties one device of a kind to the monitors observing it. It is
//! replaced as a whole whenever the bound device changes.

use crate::monitor::{DeviceStateMonitor, PilotingInterfaceMonitor};
use std::fmt;

/// Identifies one binding; never reused within a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub(crate) u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monitors owned by a binding
pub trait Monitors {
    /// Release every subscription held
    fn release(&mut self);
}

impl Monitors for DeviceStateMonitor {
    fn release(&mut self) {
        DeviceStateMonitor::release(self);
    }
}

/// Monitors of a bound drone
pub struct DroneMonitors {
    pub state: DeviceStateMonitor,
    pub piloting: PilotingInterfaceMonitor,
}

impl Monitors for DroneMonitors {
    fn release(&mut self) {
        self.state.release();
        self.piloting.release();
    }
}

/// Binding state of one device kind
pub enum Binding<M> {
    Unbound,
    Bound {
        id: BindingId,
        uid: String,
        monitors: M,
    },
}

impl<M: Monitors> Binding<M> {
    /// Uid of the bound device
    pub fn uid(&self) -> Option<&str> {
        match self {
            Binding::Bound { uid, .. } => Some(uid),
            Binding::Unbound => None,
        }
    }

    pub fn id(&self) -> Option<BindingId> {
        match self {
            Binding::Bound { id, .. } => Some(*id),
            Binding::Unbound => None,
        }
    }

    /// Whether `id` is the live binding
    pub fn is_current(&self, id: BindingId) -> bool {
        self.id() == Some(id)
    }

    pub fn monitors(&self) -> Option<&M> {
        match self {
            Binding::Bound { monitors, .. } => Some(monitors),
            Binding::Unbound => None,
        }
    }

    /// Monitors of binding `id`, if it is still the live one
    pub fn current_mut(&mut self, id: BindingId) -> Option<&mut M> {
        match self {
            Binding::Bound {
                id: bound, monitors, ..
            } if *bound == id => Some(monitors),
            _ => None,
        }
    }

    /// Release the monitors and become unbound.
    ///
    /// Returns the uid that was bound, if any.
    pub fn unbind(&mut self) -> Option<String> {
        match std::mem::replace(self, Binding::Unbound) {
            Binding::Bound {
                uid, mut monitors, ..
            } => {
                monitors.release();
                Some(uid)
            }
            Binding::Unbound => None,
        }
    }
}

impl<M> Default for Binding<M> {
    fn default() -> Self {
        Binding::Unbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Counting {
        releases: Arc<AtomicU32>,
    }

    impl Monitors for Counting {
        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unbound() {
        let mut binding: Binding<Counting> = Binding::default();
        assert_eq!(binding.uid(), None);
        assert_eq!(binding.id(), None);
        assert!(binding.monitors().is_none());
        assert_eq!(binding.unbind(), None);
    }

    #[test]
    fn test_current_binding() {
        let mut binding = Binding::Bound {
            id: BindingId(3),
            uid: "drone-1".into(),
            monitors: Counting::default(),
        };

        assert_eq!(binding.uid(), Some("drone-1"));
        assert!(binding.is_current(BindingId(3)));
        assert!(!binding.is_current(BindingId(2)));
        assert!(binding.current_mut(BindingId(2)).is_none());
        assert!(binding.current_mut(BindingId(3)).is_some());
    }

    #[test]
    fn test_unbind_releases_once() {
        let monitors = Counting::default();
        let releases = monitors.releases.clone();
        let mut binding = Binding::Bound {
            id: BindingId(1),
            uid: "rc-1".into(),
            monitors,
        };

        assert_eq!(binding.unbind(), Some("rc-1".to_string()));
        assert_eq!(binding.unbind(), None);
        assert!(matches!(binding, Binding::Unbound));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
