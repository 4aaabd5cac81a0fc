//! Session coordinator
//!
//! Owns the drone and remote control bindings and runs the single event
//! loop on which every SDK callback is handled and every piloting interface
//! call is made.

use super::binding::{Binding, BindingId, DroneMonitors};
use crate::config::MonitorConfig;
use crate::monitor::{ConfinedItf, DeviceStateMonitor, PilotingInterfaceMonitor};
use crate::sdk::{
    AssetSource, AutoConnection, Device, Drone, FlightPlanPilotingItf, GroundSession, Subscription,
};
use crate::upload::{StageResult, UploadWorkflow};
use anyhow::{anyhow, Result};
use flightplan_shared::{
    AutoConnectionStatus, ConnectionState, DeviceKind, DeviceState, PilotingView,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Events handled by the coordinator's event loop
pub enum Event {
    /// The auto-connection facility changed, or became unavailable (`None`)
    AutoConnectionChanged(Option<Arc<dyn AutoConnection>>),
    /// A bound device reported a new state
    DeviceStateChanged {
        kind: DeviceKind,
        binding: BindingId,
        state: DeviceState,
    },
    /// The bound drone's flight plan interface changed
    FlightPlanChanged {
        binding: BindingId,
        itf: Option<Arc<dyn FlightPlanPilotingItf>>,
    },
    /// A flight plan staged for the drone of `binding` is ready
    FlightPlanStaged {
        binding: BindingId,
        result: StageResult,
    },
    /// Operator command
    Command(UserCommand),
}

/// Commands issued by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Stage and upload the bundled flight plan
    Upload,
    /// Start or stop the uploaded flight plan
    Activate,
    /// Tear everything down and leave the event loop
    Shutdown,
}

/// Everything the operator sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub drone_state: ConnectionState,
    pub remote_control_state: ConnectionState,
    pub piloting: PilotingView,
}

impl Default for DashboardView {
    fn default() -> Self {
        Self {
            drone_state: ConnectionState::Disconnected,
            remote_control_state: ConnectionState::Disconnected,
            piloting: PilotingView::initial(),
        }
    }
}

/// Cloneable handle for sending commands and watching the view
#[derive(Clone)]
pub struct CoordinatorHandle {
    events: mpsc::UnboundedSender<Event>,
    view: watch::Receiver<DashboardView>,
}

impl CoordinatorHandle {
    /// Send a command to the event loop
    pub fn send(&self, command: UserCommand) -> Result<()> {
        self.events
            .send(Event::Command(command))
            .map_err(|_| anyhow!("Coordinator closed"))
    }

    pub fn upload(&self) -> Result<()> {
        self.send(UserCommand::Upload)
    }

    pub fn activate(&self) -> Result<()> {
        self.send(UserCommand::Activate)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(UserCommand::Shutdown)
    }

    /// Receiver of every published view
    pub fn view(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }
}

/// Reconciles the devices bound to the auto-connection session with the
/// monitors observing them
pub struct SessionCoordinator {
    session: Arc<dyn GroundSession>,
    facility: Option<Box<dyn Subscription>>,
    drone: Binding<DroneMonitors>,
    remote_control: Binding<DeviceStateMonitor>,
    next_binding: u64,
    upload: UploadWorkflow,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    view: DashboardView,
    view_tx: watch::Sender<DashboardView>,
}

impl SessionCoordinator {
    /// Create a coordinator for `session`. Nothing is observed until [`Self::open`].
    pub fn new(
        session: Arc<dyn GroundSession>,
        assets: Arc<dyn AssetSource>,
        config: &MonitorConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let view = DashboardView::default();
        let (view_tx, _) = watch::channel(view.clone());

        Self {
            session,
            facility: None,
            drone: Binding::Unbound,
            remote_control: Binding::Unbound,
            next_binding: 0,
            upload: UploadWorkflow::new(
                assets,
                config.flight_plan_asset.clone(),
                config.staging_dir.clone(),
            ),
            events_tx,
            events_rx,
            view,
            view_tx,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            events: self.events_tx.clone(),
            view: self.view_tx.subscribe(),
        }
    }

    /// Latest published view
    #[cfg(test)]
    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    /// Uid of the bound drone
    #[cfg(test)]
    pub fn drone_uid(&self) -> Option<&str> {
        self.drone.uid()
    }

    /// Uid of the bound remote control
    #[cfg(test)]
    pub fn remote_control_uid(&self) -> Option<&str> {
        self.remote_control.uid()
    }

    /// Start observing the auto-connection facility
    pub fn open(&mut self) {
        if self.facility.is_some() {
            return;
        }
        info!("[SESSION] Observing auto connection");
        let events = self.events_tx.clone();
        self.facility = Some(self.session.observe_auto_connection(Box::new(
            move |auto_connection| {
                let _ = events.send(Event::AutoConnectionChanged(auto_connection));
            },
        )));
    }

    /// Release the facility subscription and tear down both bindings
    pub fn close(&mut self) {
        if let Some(mut facility) = self.facility.take() {
            facility.release();
            info!("[SESSION] Stopped observing auto connection");
        }
        self.stop_drone_monitors();
        self.stop_remote_control_monitors();
    }

    /// Open, handle events until shutdown, then close
    pub async fn run(mut self) {
        self.open();
        while self.step().await {}
        self.close();
        info!("[SESSION] Coordinator stopped");
    }

    /// Wait for the next event and handle it. Returns false on shutdown.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    /// Handle every event already queued. Returns how many were handled.
    #[cfg(test)]
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            if !self.handle_event(event) {
                break;
            }
        }
        handled
    }

    /// Handle one event. Returns false when the loop should stop.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::AutoConnectionChanged(Some(auto_connection)) => {
                self.on_auto_connection(auto_connection.as_ref());
            }
            Event::AutoConnectionChanged(None) => {
                debug!("[SESSION] Auto connection unavailable");
            }
            Event::DeviceStateChanged {
                kind,
                binding,
                state,
            } => self.on_device_state(kind, binding, state),
            Event::FlightPlanChanged { binding, itf } => self.on_flight_plan(binding, itf),
            Event::FlightPlanStaged { binding, result } => self.on_flight_plan_staged(binding, result),
            Event::Command(UserCommand::Upload) => self.on_upload(),
            Event::Command(UserCommand::Activate) => self.on_activate(),
            Event::Command(UserCommand::Shutdown) => {
                info!("[SESSION] Shutdown requested");
                return false;
            }
        }
        true
    }

    fn on_auto_connection(&mut self, auto_connection: &dyn AutoConnection) {
        if auto_connection.status() != AutoConnectionStatus::Started {
            info!("[SESSION] Auto connection not started, starting it now");
            if !auto_connection.start() {
                warn!("[SESSION] Auto connection could not be started");
            }
        } else {
            trace!("[SESSION] Auto connection already started");
        }

        self.reconcile_drone(auto_connection.drone());
        self.reconcile_remote_control(auto_connection.remote_control());
    }

    fn reconcile_drone(&mut self, drone: Option<Arc<dyn Drone>>) {
        let reported = drone.as_ref().map(|d| d.uid());
        if self.drone.uid() == reported {
            return;
        }
        info!(
            "[SESSION] Drone has changed: {} -> {}",
            self.drone.uid().unwrap_or("none"),
            reported.unwrap_or("none")
        );

        self.stop_drone_monitors();
        if let Some(drone) = drone {
            self.start_drone_monitors(drone.as_ref());
        }
    }

    fn reconcile_remote_control(&mut self, remote_control: Option<Arc<dyn Device>>) {
        let reported = remote_control.as_ref().map(|rc| rc.uid());
        if self.remote_control.uid() == reported {
            return;
        }
        info!(
            "[SESSION] Remote control has changed: {} -> {}",
            self.remote_control.uid().unwrap_or("none"),
            reported.unwrap_or("none")
        );

        self.stop_remote_control_monitors();
        if let Some(remote_control) = remote_control {
            self.start_remote_control_monitors(remote_control.as_ref());
        }
    }

    fn next_binding_id(&mut self) -> BindingId {
        self.next_binding += 1;
        BindingId(self.next_binding)
    }

    fn start_drone_monitors(&mut self, drone: &dyn Drone) {
        let id = self.next_binding_id();
        info!("[SESSION] Starting drone monitors: {} {}", drone.uid(), id);

        let events = self.events_tx.clone();
        let state = DeviceStateMonitor::start(DeviceKind::Drone, drone, move |state| {
            let _ = events.send(Event::DeviceStateChanged {
                kind: DeviceKind::Drone,
                binding: id,
                state,
            });
        });

        let events = self.events_tx.clone();
        let piloting = PilotingInterfaceMonitor::start(drone, move |itf| {
            let _ = events.send(Event::FlightPlanChanged { binding: id, itf });
        });

        self.drone = Binding::Bound {
            id,
            uid: drone.uid().to_string(),
            monitors: DroneMonitors { state, piloting },
        };
    }

    fn stop_drone_monitors(&mut self) {
        let Some(uid) = self.drone.unbind() else {
            return;
        };
        info!("[SESSION] Stopped drone monitors: {}", uid);

        self.view.drone_state = ConnectionState::Disconnected;
        self.view.piloting = PilotingView::unavailable();
        self.publish();
    }

    fn start_remote_control_monitors(&mut self, remote_control: &dyn Device) {
        let id = self.next_binding_id();
        info!(
            "[SESSION] Starting remote control monitors: {} {}",
            remote_control.uid(),
            id
        );

        let events = self.events_tx.clone();
        let monitor = DeviceStateMonitor::start(
            DeviceKind::RemoteControl,
            remote_control,
            move |state| {
                let _ = events.send(Event::DeviceStateChanged {
                    kind: DeviceKind::RemoteControl,
                    binding: id,
                    state,
                });
            },
        );

        self.remote_control = Binding::Bound {
            id,
            uid: remote_control.uid().to_string(),
            monitors: monitor,
        };
    }

    fn stop_remote_control_monitors(&mut self) {
        let Some(uid) = self.remote_control.unbind() else {
            return;
        };
        info!("[SESSION] Stopped remote control monitors: {}", uid);

        self.view.remote_control_state = ConnectionState::Disconnected;
        self.publish();
    }

    fn on_device_state(&mut self, kind: DeviceKind, binding: BindingId, state: DeviceState) {
        let current = match kind {
            DeviceKind::Drone => self.drone.is_current(binding),
            DeviceKind::RemoteControl => self.remote_control.is_current(binding),
        };
        if !current {
            trace!("[SESSION] Dropping {} state from released binding {}", kind, binding);
            return;
        }

        let connection_state = state.connection_state;
        info!("[SESSION] {} connection state changed: {}", kind, connection_state);
        match kind {
            DeviceKind::Drone => self.view.drone_state = connection_state,
            DeviceKind::RemoteControl => self.view.remote_control_state = connection_state,
        }
        self.publish();
    }

    fn on_flight_plan(&mut self, binding: BindingId, itf: Option<Arc<dyn FlightPlanPilotingItf>>) {
        let Some(monitors) = self.drone.current_mut(binding) else {
            trace!("[SESSION] Dropping flight plan update from released binding {}", binding);
            return;
        };

        self.view.piloting = monitors.piloting.apply(itf).clone();
        self.publish();
    }

    /// Flight plan interface of the bound drone, if it exposes one
    fn piloting_itf(&self) -> Option<&ConfinedItf> {
        self.drone.monitors().and_then(|m| m.piloting.current())
    }

    fn on_upload(&mut self) {
        info!("[SESSION] Upload requested");
        let Some(binding) = self.drone.id() else {
            debug!("[SESSION] No drone bound, upload ignored");
            return;
        };

        let events = self.events_tx.clone();
        self.upload.start_upload(self.piloting_itf(), move |result| {
            let _ = events.send(Event::FlightPlanStaged { binding, result });
        });
    }

    fn on_flight_plan_staged(&mut self, binding: BindingId, result: StageResult) {
        // The interface must still belong to the drone the upload was started for.
        let itf = if self.drone.is_current(binding) {
            self.piloting_itf()
        } else {
            None
        };
        self.upload.finish_upload(result, itf);
    }

    fn on_activate(&mut self) {
        info!("[SESSION] Activate requested");
        UploadWorkflow::activate(self.piloting_itf());
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view.clone());
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}
