//! Flight Plan Upload Module
//!
//! This module handles:
//! - Staging the bundled flight plan on a blocking worker
//! - Handing the staged file back to the event loop for upload
//! - Activating and stopping the flight plan

mod assets;
mod staging;

pub use assets::{log_flight_plan, DirAssets};
pub use staging::{stage_flight_plan, StagedFlightPlan};

use crate::monitor::ConfinedItf;
use crate::sdk::AssetSource;
use flightplan_shared::{join_reasons, ActivationCommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of staging, handed from the worker back to the event loop
pub type StageResult = anyhow::Result<StagedFlightPlan>;

/// Drives the stage, upload and activate steps against the flight plan interface
pub struct UploadWorkflow {
    assets: Arc<dyn AssetSource>,
    asset_name: String,
    staging_dir: PathBuf,
}

impl UploadWorkflow {
    pub fn new(
        assets: Arc<dyn AssetSource>,
        asset_name: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            assets,
            asset_name: asset_name.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Start an upload to `itf`.
    ///
    /// Does nothing without an interface. Otherwise the asset is staged on a
    /// blocking worker and `hand_off` is called there with the result; it must
    /// only schedule [`Self::finish_upload`] back on the event loop. Must be
    /// called from within a tokio runtime.
    pub fn start_upload<H>(&self, itf: Option<&ConfinedItf>, hand_off: H) -> bool
    where
        H: FnOnce(StageResult) + Send + 'static,
    {
        if itf.is_none() {
            debug!("[UPLOAD] No flight plan interface, upload ignored");
            return false;
        }

        let assets = self.assets.clone();
        let name = self.asset_name.clone();
        let dir = self.staging_dir.clone();
        info!("[UPLOAD] Staging {} into {}", name, dir.display());

        tokio::task::spawn_blocking(move || {
            hand_off(stage_flight_plan(assets.as_ref(), &name, &dir));
        });
        true
    }

    /// Upload a staged flight plan to `itf`, the interface that is current
    /// when the hand-off arrives. Returns whether the interface was invoked.
    pub fn finish_upload(&self, staged: StageResult, itf: Option<&ConfinedItf>) -> bool {
        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => {
                warn!("[UPLOAD] Failed to create flight plan file: {:#}", e);
                return false;
            }
        };
        info!(
            "[UPLOAD] Flight plan file created: {} ({} bytes)",
            staged.path.display(),
            staged.bytes
        );

        let Some(itf) = itf else {
            warn!(
                "[UPLOAD] Flight plan interface gone while staging, discarding {}",
                staged.path.display()
            );
            if let Err(e) = std::fs::remove_file(&staged.path) {
                debug!("[UPLOAD] Could not remove {}: {}", staged.path.display(), e);
            }
            return false;
        };

        itf.upload_flight_plan(&staged.path);

        let reasons = itf.unavailability_reasons();
        if reasons.is_empty() {
            info!("[UPLOAD] No unavailability reasons found");
        } else {
            info!("[UPLOAD] Unavailability reasons: {}", join_reasons(&reasons, ", "));
        }
        true
    }

    /// Stop the flight plan if active, start it if idle.
    ///
    /// Returns the command issued, if any.
    pub fn activate(itf: Option<&ConfinedItf>) -> Option<ActivationCommand> {
        let Some(itf) = itf else {
            debug!("[UPLOAD] No flight plan interface, activate ignored");
            return None;
        };

        let state = itf.state();
        let Some(command) = ActivationCommand::for_state(state) else {
            debug!("[UPLOAD] Flight plan {}, nothing to do", state);
            return None;
        };

        let accepted = match command {
            ActivationCommand::Stop => itf.stop(),
            ActivationCommand::Activate { restart } => itf.activate(restart),
        };

        if accepted {
            info!("[UPLOAD] Flight plan {:?} sent", command);
        } else {
            warn!("[UPLOAD] Flight plan {:?} refused in state {}", command, state);
        }
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::sim::{SdkCall, SimSession};
    use crate::sdk::FlightPlanPilotingItf;
    use flightplan_shared::{ActivableState, PilotingItfSnapshot, UploadState};
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Asset source counting opens, optionally failing them
    struct CountingAssets {
        opens: AtomicUsize,
        fail: bool,
    }

    impl CountingAssets {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl AssetSource for CountingAssets {
        fn open(&self, _name: &str) -> io::Result<Box<dyn Read + Send>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such asset"));
            }
            Ok(Box::new(io::Cursor::new(b"QGC WPL 110\n".to_vec())))
        }
    }

    fn confined(itf: Arc<dyn FlightPlanPilotingItf>) -> ConfinedItf {
        ConfinedItf::new(itf)
    }

    async fn stage(workflow: &UploadWorkflow, itf: &ConfinedItf) -> StageResult {
        let (tx, rx) = oneshot::channel();
        assert!(workflow.start_upload(Some(itf), move |result| {
            let _ = tx.send(result);
        }));
        rx.await.expect("hand-off dropped")
    }

    #[tokio::test]
    async fn test_upload_without_interface_is_noop() {
        let assets = CountingAssets::new(false);
        let staging_dir = tempfile::tempdir().expect("tempdir");
        let workflow = UploadWorkflow::new(assets.clone(), "flightplan.mavlink", staging_dir.path());

        let started = workflow.start_upload(None, |_| panic!("no hand-off expected"));

        assert!(!started);
        assert_eq!(assets.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_then_upload() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let itf = confined(drone.expose_flight_plan_itf());
        let staging_dir = tempfile::tempdir().expect("tempdir");
        let workflow = UploadWorkflow::new(
            CountingAssets::new(false),
            "flightplan.mavlink",
            staging_dir.path(),
        );

        let staged = stage(&workflow, &itf).await;
        let path = staged.as_ref().expect("staged").path.clone();

        assert!(workflow.finish_upload(staged, Some(&itf)));
        assert_eq!(
            session.journal().count(|c| matches!(
                c,
                SdkCall::UploadFlightPlan { path: p, .. } if *p == path
            )),
            1
        );
        assert_eq!(itf.latest_upload_state(), UploadState::Uploaded);
        assert_eq!(itf.state(), ActivableState::Idle);
    }

    #[tokio::test]
    async fn test_staging_failure_never_uploads() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let itf = confined(drone.expose_flight_plan_itf());
        let assets = CountingAssets::new(true);
        let staging_dir = tempfile::tempdir().expect("tempdir");
        let workflow = UploadWorkflow::new(assets.clone(), "flightplan.mavlink", staging_dir.path());

        let staged = stage(&workflow, &itf).await;
        assert!(staged.is_err());

        assert!(!workflow.finish_upload(staged, Some(&itf)));
        assert_eq!(assets.opens.load(Ordering::SeqCst), 1);
        assert_eq!(
            session.journal().count(|c| matches!(c, SdkCall::UploadFlightPlan { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_hand_off_after_release_is_discarded() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let itf = confined(drone.expose_flight_plan_itf());
        let staging_dir = tempfile::tempdir().expect("tempdir");
        let workflow = UploadWorkflow::new(
            CountingAssets::new(false),
            "flightplan.mavlink",
            staging_dir.path(),
        );

        let staged = stage(&workflow, &itf).await;
        let path = staged.as_ref().expect("staged").path.clone();

        assert!(!workflow.finish_upload(staged, None));
        assert!(!path.exists());
        assert_eq!(
            session.journal().count(|c| matches!(c, SdkCall::UploadFlightPlan { .. })),
            0
        );
    }

    #[test]
    fn test_activate_dispatch() {
        let session = SimSession::new();
        let drone = session.new_drone("drone-1");
        let sim_itf = drone.expose_flight_plan_itf();
        let itf = confined(sim_itf.clone());

        assert_eq!(UploadWorkflow::activate(None), None);
        assert_eq!(UploadWorkflow::activate(Some(&itf)), None);
        assert_eq!(session.journal().count(SdkCall::is_piloting_command), 0);

        sim_itf.set_snapshot(PilotingItfSnapshot {
            state: ActivableState::Idle,
            ..Default::default()
        });
        assert_eq!(
            UploadWorkflow::activate(Some(&itf)),
            Some(ActivationCommand::Activate { restart: true })
        );
        assert_eq!(itf.state(), ActivableState::Active);

        assert_eq!(
            UploadWorkflow::activate(Some(&itf)),
            Some(ActivationCommand::Stop)
        );
        assert_eq!(itf.state(), ActivableState::Idle);

        let calls = session.journal().calls();
        assert!(calls.contains(&SdkCall::Activate {
            uid: "drone-1".into(),
            restart: true
        }));
        assert!(calls.contains(&SdkCall::Stop {
            uid: "drone-1".into()
        }));
    }
}
