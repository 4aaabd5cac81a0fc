//! Device connection state monitor

use super::Gate;
use crate::sdk::{Device, Subscription};
use flightplan_shared::{DeviceKind, DeviceState};
use tracing::{debug, info, warn};

/// Observes the connection state of one drone or remote control
pub struct DeviceStateMonitor {
    kind: DeviceKind,
    uid: String,
    gate: Gate,
    subscription: Box<dyn Subscription>,
}

impl DeviceStateMonitor {
    /// Subscribe to `device` state, calling `on_update` with every state it reports.
    ///
    /// Updates without a state payload are dropped here: the last displayed
    /// value stays until the coordinator tears the binding down.
    pub fn start<D, F>(kind: DeviceKind, device: &D, on_update: F) -> Self
    where
        D: Device + ?Sized,
        F: Fn(DeviceState) + Send + Sync + 'static,
    {
        let uid = device.uid().to_string();
        info!("[MONITOR] Starting {} state monitor: {}", kind, uid);

        let gate = Gate::open();
        let callback_gate = gate.clone();
        let callback_uid = uid.clone();

        let subscription = device.observe_state(Box::new(move |state| {
            if !callback_gate.is_open() {
                return;
            }
            match state {
                Some(state) => on_update(state),
                None => debug!("[MONITOR] {} {} reported no state", kind, callback_uid),
            }
        }));

        Self {
            kind,
            uid,
            gate,
            subscription,
        }
    }

    /// Stop observing. Safe to call more than once.
    pub fn release(&mut self) {
        if self.gate.close() {
            self.subscription.release();
            info!("[MONITOR] Stopped {} state monitor: {}", self.kind, self.uid);
        }
    }
}

impl Drop for DeviceStateMonitor {
    fn drop(&mut self) {
        if self.gate.is_open() {
            warn!(
                "[MONITOR] {} state monitor for {} dropped without release",
                self.kind, self.uid
            );
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::sim::{SdkCall, SimSession};
    use flightplan_shared::ConnectionState;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<ConnectionState>>>, impl Fn(DeviceState) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |state: DeviceState| {
            seen_clone.lock().unwrap().push(state.connection_state)
        })
    }

    #[test]
    fn test_forwards_every_state() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let (seen, on_update) = recorder();

        let mut monitor = DeviceStateMonitor::start(DeviceKind::Drone, &*drone, on_update);
        drone.set_connection_state(ConnectionState::Connecting);
        drone.set_connection_state(ConnectionState::Connected);
        monitor.release();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected
            ]
        );
    }

    #[test]
    fn test_absent_state_is_not_forwarded() {
        let session = SimSession::new();
        let rc = session.new_remote_control("rc-1");
        rc.set_connection_state(ConnectionState::Connected);
        let (seen, on_update) = recorder();

        let mut monitor = DeviceStateMonitor::start(DeviceKind::RemoteControl, &*rc, on_update);
        rc.clear_state();
        monitor.release();

        assert_eq!(*seen.lock().unwrap(), vec![ConnectionState::Connected]);
    }

    #[test]
    fn test_no_callback_after_release() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let (seen, on_update) = recorder();

        let mut monitor = DeviceStateMonitor::start(DeviceKind::Drone, &*drone, on_update);
        monitor.release();
        monitor.release();
        drone.set_connection_state(ConnectionState::Connected);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(drone.state_observer_count(), 0);
        assert_eq!(
            session.journal().count(|c| matches!(c, SdkCall::ReleaseState { .. })),
            1
        );
    }

    #[test]
    fn test_drop_releases_subscription() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");

        {
            let _monitor = DeviceStateMonitor::start(DeviceKind::Drone, &*drone, |_| {});
            assert_eq!(drone.state_observer_count(), 1);
        }

        assert_eq!(drone.state_observer_count(), 0);
    }
}
