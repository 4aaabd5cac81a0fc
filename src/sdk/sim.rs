//! Simulated ground SDK
//!
//! In-process stand-in for the vehicle SDK, used by the demo binary and by
//! tests. Devices are driven by hand (`set_connection_state`, `set_drone`,
//! ...) and every call the monitor makes into the SDK is recorded in a
//! [`Journal`] so ordering can be checked afterwards.

use super::traits::{
    AutoConnection, AutoConnectionObserver, Device, Drone, FlightPlanObserver,
    FlightPlanPilotingItf, GroundSession, StateObserver, Subscription,
};
use flightplan_shared::{
    ActivableState, AutoConnectionStatus, ConnectionState, DeviceState, PilotingItfSnapshot,
    UnavailabilityReason, UploadState,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// A call made into the simulated SDK
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkCall {
    ObserveAutoConnection,
    ReleaseAutoConnection,
    StartAutoConnection,
    ObserveState { uid: String },
    ReleaseState { uid: String },
    ObserveFlightPlan { uid: String },
    ReleaseFlightPlan { uid: String },
    UploadFlightPlan { uid: String, path: PathBuf },
    Activate { uid: String, restart: bool },
    Stop { uid: String },
}

impl SdkCall {
    /// Whether this call drives the piloting interface
    #[cfg(test)]
    pub fn is_piloting_command(&self) -> bool {
        matches!(
            self,
            SdkCall::UploadFlightPlan { .. } | SdkCall::Activate { .. } | SdkCall::Stop { .. }
        )
    }
}

/// Ordered record of SDK calls, shared by every simulated object of a session
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<SdkCall>>>,
}

impl Journal {
    fn record(&self, call: SdkCall) {
        debug!("[SIM] {:?}", call);
        lock(&self.calls).push(call);
    }

    /// All calls so far, oldest first
    #[cfg(test)]
    pub fn calls(&self) -> Vec<SdkCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls matching `pred`
    #[cfg(test)]
    pub fn count(&self, pred: impl Fn(&SdkCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    /// Index of the first occurrence of `call`
    #[cfg(test)]
    pub fn position(&self, call: &SdkCall) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c == call)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type ObserverFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Registered observers of one value
struct Observers<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, ObserverFn<T>)>>,
}

impl<T: Clone + 'static> Observers<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Register `observer`, delivering `current` to it first
    fn subscribe(
        self: &Arc<Self>,
        observer: Box<dyn Fn(T) + Send + Sync>,
        current: T,
        release_call: SdkCall,
        journal: &Journal,
    ) -> Box<dyn Subscription> {
        let observer: ObserverFn<T> = Arc::from(observer);
        observer(current);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).push((id, observer));

        Box::new(SimSubscription {
            observers: self.clone(),
            id,
            release_call: Some(release_call),
            journal: journal.clone(),
        })
    }

    fn remove(&self, id: u64) {
        lock(&self.entries).retain(|(entry_id, _)| *entry_id != id);
    }

    fn notify(&self, value: T) {
        // Observers run without the lock held so they may subscribe or release.
        let observers: Vec<ObserverFn<T>> =
            lock(&self.entries).iter().map(|(_, f)| f.clone()).collect();
        for observer in observers {
            observer(value.clone());
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

struct SimSubscription<T> {
    observers: Arc<Observers<T>>,
    id: u64,
    release_call: Option<SdkCall>,
    journal: Journal,
}

impl<T: Clone + 'static> Subscription for SimSubscription<T> {
    fn release(&mut self) {
        if let Some(call) = self.release_call.take() {
            self.observers.remove(self.id);
            self.journal.record(call);
        }
    }
}

/// A simulated ground SDK session
#[derive(Clone)]
pub struct SimSession {
    auto_connection: Arc<SimAutoConnection>,
    journal: Journal,
}

impl SimSession {
    pub fn new() -> Self {
        let journal = Journal::default();
        let auto_connection = Arc::new_cyclic(|me| SimAutoConnection {
            me: me.clone(),
            status: Mutex::new(AutoConnectionStatus::Stopped),
            drone: Mutex::new(None),
            remote_control: Mutex::new(None),
            available: AtomicBool::new(true),
            observers: Observers::new(),
            journal: journal.clone(),
        });

        Self {
            auto_connection,
            journal,
        }
    }

    pub fn auto_connection(&self) -> &Arc<SimAutoConnection> {
        &self.auto_connection
    }

    #[cfg(test)]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Create a drone attached to this session's journal
    pub fn new_drone(&self, uid: impl Into<String>) -> Arc<SimDrone> {
        Arc::new(SimDrone {
            core: SimDeviceCore::new(uid.into(), self.journal.clone()),
            flight_plan: Mutex::new(None),
            flight_plan_observers: Observers::new(),
        })
    }

    /// Create a remote control attached to this session's journal
    pub fn new_remote_control(&self, uid: impl Into<String>) -> Arc<SimRemoteControl> {
        Arc::new(SimRemoteControl {
            core: SimDeviceCore::new(uid.into(), self.journal.clone()),
        })
    }
}

impl Default for SimSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundSession for SimSession {
    fn observe_auto_connection(&self, observer: AutoConnectionObserver) -> Box<dyn Subscription> {
        self.journal.record(SdkCall::ObserveAutoConnection);
        self.auto_connection.observers.subscribe(
            observer,
            self.auto_connection.current(),
            SdkCall::ReleaseAutoConnection,
            &self.journal,
        )
    }
}

/// Simulated auto-connection facility
pub struct SimAutoConnection {
    me: Weak<SimAutoConnection>,
    status: Mutex<AutoConnectionStatus>,
    drone: Mutex<Option<Arc<SimDrone>>>,
    remote_control: Mutex<Option<Arc<SimRemoteControl>>>,
    available: AtomicBool,
    observers: Arc<Observers<Option<Arc<dyn AutoConnection>>>>,
    journal: Journal,
}

impl SimAutoConnection {
    fn current(&self) -> Option<Arc<dyn AutoConnection>> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        self.me
            .upgrade()
            .map(|me| me as Arc<dyn AutoConnection>)
    }

    /// Re-deliver the facility to every observer, changed or not
    pub fn notify(&self) {
        self.observers.notify(self.current());
    }

    /// Bind a drone (or none) and notify
    pub fn set_drone(&self, drone: Option<Arc<SimDrone>>) {
        *lock(&self.drone) = drone;
        self.notify();
    }

    /// Bind a remote control (or none) and notify
    pub fn set_remote_control(&self, remote_control: Option<Arc<SimRemoteControl>>) {
        *lock(&self.remote_control) = remote_control;
        self.notify();
    }

    /// Make the facility (un)available and notify
    #[cfg(test)]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.notify();
    }

    /// Number of live facility observers
    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl AutoConnection for SimAutoConnection {
    fn status(&self) -> AutoConnectionStatus {
        *lock(&self.status)
    }

    fn start(&self) -> bool {
        self.journal.record(SdkCall::StartAutoConnection);
        *lock(&self.status) = AutoConnectionStatus::Started;
        self.notify();
        true
    }

    fn drone(&self) -> Option<Arc<dyn Drone>> {
        lock(&self.drone).clone().map(|d| d as Arc<dyn Drone>)
    }

    fn remote_control(&self) -> Option<Arc<dyn Device>> {
        lock(&self.remote_control)
            .clone()
            .map(|rc| rc as Arc<dyn Device>)
    }
}

/// State shared by simulated drones and remote controls
struct SimDeviceCore {
    uid: String,
    state: Mutex<Option<DeviceState>>,
    state_observers: Arc<Observers<Option<DeviceState>>>,
    journal: Journal,
}

impl SimDeviceCore {
    fn new(uid: String, journal: Journal) -> Self {
        Self {
            uid,
            state: Mutex::new(Some(DeviceState::new(ConnectionState::Disconnected))),
            state_observers: Observers::new(),
            journal,
        }
    }

    fn observe_state(&self, observer: StateObserver) -> Box<dyn Subscription> {
        self.journal.record(SdkCall::ObserveState {
            uid: self.uid.clone(),
        });
        let current = *lock(&self.state);
        self.state_observers.subscribe(
            observer,
            current,
            SdkCall::ReleaseState {
                uid: self.uid.clone(),
            },
            &self.journal,
        )
    }

    fn set_state(&self, state: Option<DeviceState>) {
        *lock(&self.state) = state;
        self.state_observers.notify(state);
    }
}

/// Simulated drone
pub struct SimDrone {
    core: SimDeviceCore,
    flight_plan: Mutex<Option<Arc<SimFlightPlanItf>>>,
    flight_plan_observers: Arc<Observers<Option<Arc<dyn FlightPlanPilotingItf>>>>,
}

impl SimDrone {
    pub fn set_connection_state(&self, connection_state: ConnectionState) {
        self.core.set_state(Some(DeviceState::new(connection_state)));
    }

    /// Deliver an update without a state payload
    #[cfg(test)]
    pub fn clear_state(&self) {
        self.core.set_state(None);
    }

    /// Expose a fresh flight plan interface and notify its observers
    pub fn expose_flight_plan_itf(&self) -> Arc<SimFlightPlanItf> {
        let itf = Arc::new_cyclic(|me| SimFlightPlanItf {
            me: me.clone(),
            uid: self.core.uid.clone(),
            snapshot: Mutex::new(PilotingItfSnapshot {
                state: ActivableState::Unavailable,
                latest_upload_state: UploadState::None,
                unavailability_reasons: [UnavailabilityReason::MissingFlightPlanFile]
                    .into_iter()
                    .collect(),
            }),
            observers: self.flight_plan_observers.clone(),
            journal: self.core.journal.clone(),
        });
        *lock(&self.flight_plan) = Some(itf.clone());
        itf.publish();
        itf
    }

    /// Stop exposing the flight plan interface
    #[cfg(test)]
    pub fn withdraw_flight_plan_itf(&self) {
        *lock(&self.flight_plan) = None;
        self.flight_plan_observers.notify(None);
    }

    pub fn flight_plan_itf(&self) -> Option<Arc<SimFlightPlanItf>> {
        lock(&self.flight_plan).clone()
    }

    /// Number of live state observers
    #[cfg(test)]
    pub fn state_observer_count(&self) -> usize {
        self.core.state_observers.len()
    }

    /// Number of live flight plan observers
    #[cfg(test)]
    pub fn flight_plan_observer_count(&self) -> usize {
        self.flight_plan_observers.len()
    }
}

impl Device for SimDrone {
    fn uid(&self) -> &str {
        &self.core.uid
    }

    fn observe_state(&self, observer: StateObserver) -> Box<dyn Subscription> {
        self.core.observe_state(observer)
    }
}

impl Drone for SimDrone {
    fn observe_flight_plan_itf(&self, observer: FlightPlanObserver) -> Box<dyn Subscription> {
        self.core.journal.record(SdkCall::ObserveFlightPlan {
            uid: self.core.uid.clone(),
        });
        let current = self
            .flight_plan_itf()
            .map(|itf| itf as Arc<dyn FlightPlanPilotingItf>);
        self.flight_plan_observers.subscribe(
            observer,
            current,
            SdkCall::ReleaseFlightPlan {
                uid: self.core.uid.clone(),
            },
            &self.core.journal,
        )
    }
}

/// Simulated remote control
pub struct SimRemoteControl {
    core: SimDeviceCore,
}

impl SimRemoteControl {
    pub fn set_connection_state(&self, connection_state: ConnectionState) {
        self.core.set_state(Some(DeviceState::new(connection_state)));
    }

    /// Deliver an update without a state payload
    #[cfg(test)]
    pub fn clear_state(&self) {
        self.core.set_state(None);
    }

    #[cfg(test)]
    pub fn state_observer_count(&self) -> usize {
        self.core.state_observers.len()
    }
}

impl Device for SimRemoteControl {
    fn uid(&self) -> &str {
        &self.core.uid
    }

    fn observe_state(&self, observer: StateObserver) -> Box<dyn Subscription> {
        self.core.observe_state(observer)
    }
}

/// Simulated flight plan piloting interface.
///
/// Uploading a readable, non-empty file clears `MissingFlightPlanFile` and
/// makes the interface idle; activate and stop toggle between idle and active.
pub struct SimFlightPlanItf {
    me: Weak<SimFlightPlanItf>,
    uid: String,
    snapshot: Mutex<PilotingItfSnapshot>,
    observers: Arc<Observers<Option<Arc<dyn FlightPlanPilotingItf>>>>,
    journal: Journal,
}

impl SimFlightPlanItf {
    fn publish(&self) {
        if let Some(me) = self.me.upgrade() {
            self.observers
                .notify(Some(me as Arc<dyn FlightPlanPilotingItf>));
        }
    }

    /// Replace every field and notify
    #[cfg(test)]
    pub fn set_snapshot(&self, snapshot: PilotingItfSnapshot) {
        *lock(&self.snapshot) = snapshot;
        self.publish();
    }

    fn update(&self, f: impl FnOnce(&mut PilotingItfSnapshot)) {
        f(&mut lock(&self.snapshot));
        self.publish();
    }
}

impl FlightPlanPilotingItf for SimFlightPlanItf {
    fn state(&self) -> ActivableState {
        lock(&self.snapshot).state
    }

    fn latest_upload_state(&self) -> UploadState {
        lock(&self.snapshot).latest_upload_state
    }

    fn unavailability_reasons(&self) -> BTreeSet<UnavailabilityReason> {
        lock(&self.snapshot).unavailability_reasons.clone()
    }

    fn upload_flight_plan(&self, path: &Path) {
        self.journal.record(SdkCall::UploadFlightPlan {
            uid: self.uid.clone(),
            path: path.to_path_buf(),
        });

        self.update(|s| s.latest_upload_state = UploadState::Uploading);

        let accepted = std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);

        self.update(|s| {
            if accepted {
                s.latest_upload_state = UploadState::Uploaded;
                s.unavailability_reasons
                    .remove(&UnavailabilityReason::MissingFlightPlanFile);
                if s.unavailability_reasons.is_empty() && s.state == ActivableState::Unavailable {
                    s.state = ActivableState::Idle;
                }
            } else {
                s.latest_upload_state = UploadState::Failed;
            }
        });
    }

    fn activate(&self, restart: bool) -> bool {
        self.journal.record(SdkCall::Activate {
            uid: self.uid.clone(),
            restart,
        });
        if self.state() != ActivableState::Idle {
            return false;
        }
        self.update(|s| s.state = ActivableState::Active);
        true
    }

    fn stop(&self) -> bool {
        self.journal.record(SdkCall::Stop {
            uid: self.uid.clone(),
        });
        if self.state() != ActivableState::Active {
            return false;
        }
        self.update(|s| s.state = ActivableState::Idle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_observe_delivers_current_state() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        drone.set_connection_state(ConnectionState::Connected);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut sub = drone.observe_state(Box::new(move |state| {
            seen_clone.lock().unwrap().push(state);
        }));

        drone.set_connection_state(ConnectionState::Disconnecting);
        sub.release();
        drone.set_connection_state(ConnectionState::Disconnected);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            Some(DeviceState::new(ConnectionState::Connected))
        );
        assert_eq!(
            seen[1],
            Some(DeviceState::new(ConnectionState::Disconnecting))
        );
    }

    #[test]
    fn test_release_is_idempotent() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");

        let mut sub = drone.observe_state(Box::new(|_| {}));
        assert_eq!(drone.state_observer_count(), 1);

        sub.release();
        sub.release();

        assert_eq!(drone.state_observer_count(), 0);
        assert_eq!(
            session.journal().count(|c| matches!(c, SdkCall::ReleaseState { .. })),
            1
        );
    }

    #[test]
    fn test_start_renotifies_observers() {
        let session = SimSession::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let _sub = session.observe_auto_connection(Box::new(move |ac| {
            assert!(ac.is_some());
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(session.auto_connection().start());
        assert_eq!(
            session.auto_connection().status(),
            AutoConnectionStatus::Started
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_upload_then_activate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = dir.path().join("plan.mavlink");
        std::fs::write(&plan, "QGC WPL 110\n").expect("write plan");

        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let itf = drone.expose_flight_plan_itf();

        assert_eq!(itf.state(), ActivableState::Unavailable);
        assert!(!itf.activate(true));

        itf.upload_flight_plan(&plan);
        assert_eq!(itf.latest_upload_state(), UploadState::Uploaded);
        assert!(itf.unavailability_reasons().is_empty());
        assert_eq!(itf.state(), ActivableState::Idle);

        assert!(itf.activate(true));
        assert_eq!(itf.state(), ActivableState::Active);
        assert!(itf.stop());
        assert_eq!(itf.state(), ActivableState::Idle);
    }

    #[test]
    fn test_upload_missing_file_fails() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let itf = drone.expose_flight_plan_itf();

        itf.upload_flight_plan(Path::new("/nonexistent/flightplan.mavlink"));
        assert_eq!(itf.latest_upload_state(), UploadState::Failed);
        assert_eq!(itf.state(), ActivableState::Unavailable);
    }
}
