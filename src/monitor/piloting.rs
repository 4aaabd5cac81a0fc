//! Flight plan piloting interface monitor

use super::Gate;
use crate::sdk::{Drone, FlightPlanPilotingItf, Subscription};
use flightplan_shared::PilotingView;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Flight plan interface handle confined to the coordinator's event loop.
///
/// It is deliberately `!Send`: it cannot be moved into a worker task.
#[derive(Clone)]
pub struct ConfinedItf {
    itf: Arc<dyn FlightPlanPilotingItf>,
    _confined: PhantomData<*const ()>,
}

impl ConfinedItf {
    pub(crate) fn new(itf: Arc<dyn FlightPlanPilotingItf>) -> Self {
        Self {
            itf,
            _confined: PhantomData,
        }
    }
}

impl Deref for ConfinedItf {
    type Target = dyn FlightPlanPilotingItf;

    fn deref(&self) -> &Self::Target {
        self.itf.as_ref()
    }
}

/// Observes a drone's flight plan piloting interface and derives what the
/// operator sees from each update
pub struct PilotingInterfaceMonitor {
    uid: String,
    gate: Gate,
    subscription: Box<dyn Subscription>,
    current: Option<ConfinedItf>,
    view: PilotingView,
}

impl PilotingInterfaceMonitor {
    /// Subscribe to the flight plan interface of `drone`.
    ///
    /// `on_update` runs in the SDK's context and should only forward the
    /// interface to the event loop, which then calls [`Self::apply`].
    pub fn start<D, F>(drone: &D, on_update: F) -> Self
    where
        D: Drone + ?Sized,
        F: Fn(Option<Arc<dyn FlightPlanPilotingItf>>) + Send + Sync + 'static,
    {
        let uid = drone.uid().to_string();
        info!("[MONITOR] Starting flight plan monitor: {}", uid);

        let gate = Gate::open();
        let callback_gate = gate.clone();

        let subscription = drone.observe_flight_plan_itf(Box::new(move |itf| {
            if callback_gate.is_open() {
                on_update(itf);
            }
        }));

        Self {
            uid,
            gate,
            subscription,
            current: None,
            view: PilotingView::unavailable(),
        }
    }

    /// Record the interface delivered by an update and derive the new view
    /// from a single read of it
    pub fn apply(&mut self, itf: Option<Arc<dyn FlightPlanPilotingItf>>) -> &PilotingView {
        let snapshot = itf.as_ref().map(|itf| itf.snapshot());
        self.current = itf.map(ConfinedItf::new);
        self.view = PilotingView::derive(snapshot.as_ref());

        debug!(
            "[MONITOR] Upload state: {}, reasons: [{}]",
            self.view.upload_state,
            self.view.unavailability_reasons.replace('\n', ", ")
        );
        debug!(
            "[MONITOR] Piloting interface {}: upload enabled={}, activate enabled={} label={}",
            self.view.activable_state,
            self.view.upload_enabled,
            self.view.activate_enabled,
            self.view.activate_label
        );

        &self.view
    }

    /// Interface delivered by the latest update, if any
    pub fn current(&self) -> Option<&ConfinedItf> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub fn view(&self) -> &PilotingView {
        &self.view
    }

    /// Stop observing and forget the interface. Safe to call more than once.
    pub fn release(&mut self) {
        if self.gate.close() {
            self.subscription.release();
            self.current = None;
            self.view = PilotingView::unavailable();
            info!("[MONITOR] Stopped flight plan monitor: {}", self.uid);
        }
    }
}

impl Drop for PilotingInterfaceMonitor {
    fn drop(&mut self) {
        if self.gate.is_open() {
            warn!(
                "[MONITOR] Flight plan monitor for {} dropped without release",
                self.uid
            );
            self.release();
        }
    }
}
