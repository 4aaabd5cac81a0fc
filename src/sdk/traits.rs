//! Ground SDK abstraction
//!
//! The vehicle SDK owns discovery, the wire protocol and persistence. The
//! monitor only sees it through these traits.

use flightplan_shared::{
    ActivableState, AutoConnectionStatus, DeviceState, PilotingItfSnapshot, UnavailabilityReason,
    UploadState,
};
use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// Observer of the auto-connection facility; `None` when the facility is unavailable
pub type AutoConnectionObserver = Box<dyn Fn(Option<Arc<dyn AutoConnection>>) + Send + Sync>;

/// Observer of a device state; `None` when the device no longer reports one
pub type StateObserver = Box<dyn Fn(Option<DeviceState>) + Send + Sync>;

/// Observer of the flight plan piloting interface; `None` when the drone does not expose it
pub type FlightPlanObserver = Box<dyn Fn(Option<Arc<dyn FlightPlanPilotingItf>>) + Send + Sync>;

/// A live observation registered with the SDK
pub trait Subscription: Send {
    /// Stop the observation. Calling it more than once has no effect.
    fn release(&mut self);
}

/// An open session with the ground SDK
pub trait GroundSession: Send + Sync {
    /// Observe the auto-connection facility. The observer is called with the
    /// current facility right away, then on every change.
    fn observe_auto_connection(&self, observer: AutoConnectionObserver) -> Box<dyn Subscription>;
}

/// Facility that connects to the best available drone and remote control
pub trait AutoConnection: Send + Sync {
    fn status(&self) -> AutoConnectionStatus;

    /// Start auto-connection. Returns false when it could not be started.
    fn start(&self) -> bool;

    fn drone(&self) -> Option<Arc<dyn Drone>>;

    fn remote_control(&self) -> Option<Arc<dyn Device>>;
}

/// Any device the SDK knows about
pub trait Device: Send + Sync {
    /// Unique identifier, only used to detect a change of device
    fn uid(&self) -> &str;

    /// Observe the device state. Called with the current state right away.
    fn observe_state(&self, observer: StateObserver) -> Box<dyn Subscription>;
}

/// A drone, which additionally exposes piloting interfaces
pub trait Drone: Device {
    fn observe_flight_plan_itf(&self, observer: FlightPlanObserver) -> Box<dyn Subscription>;
}

/// Flight plan piloting interface of a drone.
///
/// Methods must only be called from the coordinator's event loop.
pub trait FlightPlanPilotingItf: Send + Sync {
    fn state(&self) -> ActivableState;

    fn latest_upload_state(&self) -> UploadState;

    fn unavailability_reasons(&self) -> BTreeSet<UnavailabilityReason>;

    /// Upload a flight plan file to the drone
    fn upload_flight_plan(&self, path: &Path);

    /// Activate the flight plan. Returns false when the request was refused.
    fn activate(&self, restart: bool) -> bool;

    /// Stop the running flight plan. Returns false when the request was refused.
    fn stop(&self) -> bool;

    /// Read every field at once
    fn snapshot(&self) -> PilotingItfSnapshot {
        PilotingItfSnapshot {
            state: self.state(),
            latest_upload_state: self.latest_upload_state(),
            unavailability_reasons: self.unavailability_reasons(),
        }
    }
}

/// Read-only store of bundled assets
pub trait AssetSource: Send + Sync {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;
}
