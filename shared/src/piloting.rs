//! Flight Plan Piloting Presentation
//!
//! Derives what the operator sees from a piloting interface snapshot, and
//! which activation command a button press maps to.

use crate::{join_reasons, labels, ActivableState, PilotingItfSnapshot, UploadState, NOT_AVAILABLE};

/// Presentation state derived from a single piloting interface update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PilotingView {
    /// Latest upload state label, or "N/A" without an interface
    pub upload_state: String,
    /// Unavailability reasons, one per line
    pub unavailability_reasons: String,
    pub upload_enabled: bool,
    pub activable_state: ActivableState,
    pub activate_enabled: bool,
    pub activate_label: &'static str,
}

impl PilotingView {
    /// Derive every presentation field from one snapshot.
    ///
    /// `None` means the drone does not currently expose the interface.
    pub fn derive(itf: Option<&PilotingItfSnapshot>) -> Self {
        let upload_state = itf
            .map(|itf| itf.latest_upload_state.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let unavailability_reasons = itf
            .map(|itf| join_reasons(&itf.unavailability_reasons, "\n"))
            .unwrap_or_default();

        let upload_enabled = itf
            .map(|itf| itf.latest_upload_state != UploadState::Uploading)
            .unwrap_or(false);

        let activable_state = itf.map(|itf| itf.state).unwrap_or(ActivableState::Unavailable);

        let activate_label = match activable_state {
            ActivableState::Active => labels::ACTIVATE_STOP,
            _ => labels::ACTIVATE_START,
        };

        Self {
            upload_state,
            unavailability_reasons,
            upload_enabled,
            activable_state,
            activate_enabled: activable_state != ActivableState::Unavailable,
            activate_label,
        }
    }

    /// View shown while no piloting interface is bound
    pub fn unavailable() -> Self {
        Self::derive(None)
    }

    /// View shown before any piloting interface update has arrived
    pub fn initial() -> Self {
        Self {
            upload_state: UploadState::None.to_string(),
            ..Self::unavailable()
        }
    }
}

impl Default for PilotingView {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Command issued to the piloting interface when the activate button is pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCommand {
    /// Stop the running flight plan
    Stop,
    /// Start the flight plan, restarting from the first waypoint when `restart` is set
    Activate { restart: bool },
}

impl ActivationCommand {
    /// Map the interface state to the command to issue, if any
    pub fn for_state(state: ActivableState) -> Option<Self> {
        match state {
            ActivableState::Active => Some(ActivationCommand::Stop),
            ActivableState::Idle => Some(ActivationCommand::Activate { restart: true }),
            ActivableState::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnavailabilityReason;

    fn snapshot(state: ActivableState, upload: UploadState) -> PilotingItfSnapshot {
        PilotingItfSnapshot {
            state,
            latest_upload_state: upload,
            unavailability_reasons: Default::default(),
        }
    }

    #[test]
    fn test_absent_interface() {
        let view = PilotingView::derive(None);
        assert_eq!(view.upload_state, "N/A");
        assert_eq!(view.unavailability_reasons, "");
        assert!(!view.upload_enabled);
        assert_eq!(view.activable_state, ActivableState::Unavailable);
        assert!(!view.activate_enabled);
        assert_eq!(view.activate_label, "start");
        assert_eq!(view, PilotingView::unavailable());
    }

    #[test]
    fn test_initial_view() {
        let view = PilotingView::initial();
        assert_eq!(view.upload_state, "NONE");
        assert!(!view.upload_enabled);
        assert!(!view.activate_enabled);
        assert_ne!(view, PilotingView::unavailable());
    }

    #[test]
    fn test_active_while_uploading() {
        let itf = snapshot(ActivableState::Active, UploadState::Uploading);
        let view = PilotingView::derive(Some(&itf));

        assert_eq!(
            (view.upload_enabled, view.activate_enabled, view.activate_label),
            (false, true, "stop")
        );
        assert_eq!(view.upload_state, "UPLOADING");
    }

    #[test]
    fn test_idle_after_upload() {
        let itf = snapshot(ActivableState::Idle, UploadState::Uploaded);
        let view = PilotingView::derive(Some(&itf));

        assert!(view.upload_enabled);
        assert!(view.activate_enabled);
        assert_eq!(view.activate_label, "start");
    }

    #[test]
    fn test_unavailable_with_reasons() {
        let mut itf = snapshot(ActivableState::Unavailable, UploadState::None);
        itf.unavailability_reasons.insert(UnavailabilityReason::MissingFlightPlanFile);
        itf.unavailability_reasons.insert(UnavailabilityReason::DroneGpsInfoInaccurate);

        let view = PilotingView::derive(Some(&itf));
        assert!(view.upload_enabled);
        assert!(!view.activate_enabled);
        assert_eq!(
            view.unavailability_reasons,
            "DRONE_GPS_INFO_INACCURATE\nMISSING_FLIGHT_PLAN_FILE"
        );
    }

    #[test]
    fn test_activation_dispatch() {
        assert_eq!(
            ActivationCommand::for_state(ActivableState::Active),
            Some(ActivationCommand::Stop)
        );
        assert_eq!(
            ActivationCommand::for_state(ActivableState::Idle),
            Some(ActivationCommand::Activate { restart: true })
        );
        assert_eq!(ActivationCommand::for_state(ActivableState::Unavailable), None);
    }
}
