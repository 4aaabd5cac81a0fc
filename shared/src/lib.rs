//! Flight Plan Monitor Shared Types
//!
//! This crate provides the device, piloting interface and flight plan types
//! shared between the session coordinator, the monitors and the SDK bindings.

pub mod mission;
pub mod piloting;

use std::collections::BTreeSet;
use std::fmt;

pub use mission::{FlightPlan, MissionError, MissionItem};
pub use piloting::{ActivationCommand, PilotingView};

/// Name of the bundled flight plan asset
pub const FLIGHT_PLAN_ASSET: &str = "flightplan.mavlink";

/// Text displayed when the piloting interface is not available
pub const NOT_AVAILABLE: &str = "N/A";

/// Labels for the activate button
pub mod labels {
    pub const ACTIVATE_START: &str = "start";
    pub const ACTIVATE_STOP: &str = "stop";
}

/// Kind of device bound to the auto-connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Drone,
    RemoteControl,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Drone => write!(f, "drone"),
            DeviceKind::RemoteControl => write!(f, "remote control"),
        }
    }
}

/// Connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        };
        f.write_str(label)
    }
}

/// Snapshot of a device state as delivered by the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub connection_state: ConnectionState,
}

impl DeviceState {
    pub fn new(connection_state: ConnectionState) -> Self {
        Self { connection_state }
    }
}

/// Lifecycle of an activable piloting interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivableState {
    #[default]
    Unavailable,
    Idle,
    Active,
}

impl fmt::Display for ActivableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivableState::Unavailable => "UNAVAILABLE",
            ActivableState::Idle => "IDLE",
            ActivableState::Active => "ACTIVE",
        };
        f.write_str(label)
    }
}

/// State of the latest flight plan upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    None,
    Uploading,
    Uploaded,
    Failed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadState::None => "NONE",
            UploadState::Uploading => "UPLOADING",
            UploadState::Uploaded => "UPLOADED",
            UploadState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Why the flight plan piloting interface cannot be activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnavailabilityReason {
    CannotTakeOff,
    DroneGpsInfoInaccurate,
    DroneNotCalibrated,
    MissingFlightPlanFile,
    CameraUnavailable,
    InsufficientBattery,
}

impl fmt::Display for UnavailabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnavailabilityReason::CannotTakeOff => "CANNOT_TAKE_OFF",
            UnavailabilityReason::DroneGpsInfoInaccurate => "DRONE_GPS_INFO_INACCURATE",
            UnavailabilityReason::DroneNotCalibrated => "DRONE_NOT_CALIBRATED",
            UnavailabilityReason::MissingFlightPlanFile => "MISSING_FLIGHT_PLAN_FILE",
            UnavailabilityReason::CameraUnavailable => "CAMERA_UNAVAILABLE",
            UnavailabilityReason::InsufficientBattery => "INSUFFICIENT_BATTERY",
        };
        f.write_str(label)
    }
}

/// Status of the auto-connection facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoConnectionStatus {
    #[default]
    Stopped,
    Started,
}

/// Values read from a flight plan piloting interface at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PilotingItfSnapshot {
    pub state: ActivableState,
    pub latest_upload_state: UploadState,
    pub unavailability_reasons: BTreeSet<UnavailabilityReason>,
}

/// Join unavailability reasons for display, one per line
pub fn join_reasons<'a>(
    reasons: impl IntoIterator<Item = &'a UnavailabilityReason>,
    separator: &str,
) -> String {
    reasons
        .into_iter()
        .map(|reason| reason.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
