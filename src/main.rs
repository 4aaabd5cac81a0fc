mod config;
mod monitor;
mod sdk;
mod session;
mod upload;

use anyhow::{Context, Result};
use config::MonitorConfig;
use flightplan_shared::ConnectionState;
use sdk::sim::SimSession;
use session::{CoordinatorHandle, DashboardView, SessionCoordinator};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use upload::{log_flight_plan, DirAssets};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pause between simulated device events
const STEP: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let config = MonitorConfig::from_env();
    init_tracing(&config)?;

    info!("Flight plan monitor starting");
    info!("  Assets: {}", config.asset_dir.display());
    info!("  Staging: {}", config.staging_dir.display());

    let assets = Arc::new(DirAssets::new(&config.asset_dir));
    log_flight_plan(&*assets, &config.flight_plan_asset);

    // No vehicle SDK is linked in; drive the coordinator with the simulated one.
    let session = SimSession::new();
    let coordinator = SessionCoordinator::new(Arc::new(session.clone()), assets, &config);
    let handle = coordinator.handle();

    tokio::spawn(log_views(handle.view()));

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            let _ = ctrl_c.shutdown();
        }
    });

    let scenario = async {
        if let Err(e) = run_scenario(session, handle.clone()).await {
            error!("Scenario failed: {:#}", e);
            let _ = handle.shutdown();
        }
    };
    tokio::join!(coordinator.run(), scenario);

    info!("Flight plan monitor stopped");
    Ok(())
}

fn init_tracing(config: &MonitorConfig) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
    Ok(())
}

/// Log every dashboard view the coordinator publishes
async fn log_views(mut views: watch::Receiver<DashboardView>) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        info!(
            "[VIEW] drone={} rc={} upload={} upload_enabled={} state={} activate={}({})",
            view.drone_state,
            view.remote_control_state,
            view.piloting.upload_state,
            view.piloting.upload_enabled,
            view.piloting.activable_state,
            view.piloting.activate_label,
            if view.piloting.activate_enabled { "enabled" } else { "disabled" },
        );
        if !view.piloting.unavailability_reasons.is_empty() {
            info!(
                "[VIEW] unavailability reasons: {}",
                view.piloting.unavailability_reasons.replace('\n', ", ")
            );
        }
    }
}

/// Connect a drone and a remote control, upload the flight plan, start and
/// stop it, then disconnect everything and shut down
async fn run_scenario(session: SimSession, handle: CoordinatorHandle) -> Result<()> {
    let auto_connection = session.auto_connection().clone();
    let mut view = handle.view();

    tokio::time::sleep(STEP).await;
    let remote_control = session.new_remote_control("rc-0001");
    auto_connection.set_remote_control(Some(remote_control.clone()));
    remote_control.set_connection_state(ConnectionState::Connected);

    tokio::time::sleep(STEP).await;
    let drone = session.new_drone("drone-0001");
    auto_connection.set_drone(Some(drone.clone()));
    drone.set_connection_state(ConnectionState::Connecting);
    tokio::time::sleep(STEP).await;
    drone.set_connection_state(ConnectionState::Connected);
    drone.expose_flight_plan_itf();

    tokio::time::sleep(STEP).await;
    handle.upload()?;
    tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.piloting.activate_enabled),
    )
    .await
    .context("Flight plan never became activable")?
    .context("Coordinator closed")?;

    handle.activate()?;
    tokio::time::sleep(STEP).await;
    handle.activate()?;

    tokio::time::sleep(STEP).await;
    warn!("Drone link lost");
    auto_connection.set_drone(None);
    tokio::time::sleep(STEP).await;
    auto_connection.set_remote_control(None);

    tokio::time::sleep(STEP).await;
    handle.shutdown()
}
