//! Bundled asset access

use crate::sdk::AssetSource;
use flightplan_shared::FlightPlan;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{info, warn};

/// Assets read from a directory on disk
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirAssets {
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.root.join(name))?;
        Ok(Box::new(file))
    }
}

/// Log a summary of the flight plan asset, or why it could not be read
pub fn log_flight_plan(assets: &dyn AssetSource, name: &str) -> Option<FlightPlan> {
    let mut text = String::new();
    let read = assets
        .open(name)
        .and_then(|mut input| input.read_to_string(&mut text));

    if let Err(e) = read {
        warn!("[UPLOAD] Failed to read the flight plan data: {}", e);
        return None;
    }

    match FlightPlan::parse(&text) {
        Ok(plan) if plan.is_empty() => {
            warn!("[UPLOAD] Flight plan {} has no mission items", name);
            Some(plan)
        }
        Ok(plan) => {
            info!("[UPLOAD] Flight plan data: {}", plan.summary());
            Some(plan)
        }
        Err(e) => {
            warn!("[UPLOAD] Flight plan {} is not a valid waypoint file: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_assets_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("plan.mavlink"), b"QGC WPL 110\n").expect("write");

        let assets = DirAssets::new(dir.path());
        let mut text = String::new();
        assets
            .open("plan.mavlink")
            .expect("open")
            .read_to_string(&mut text)
            .expect("read");

        assert_eq!(text, "QGC WPL 110\n");
        assert!(assets.open("missing.mavlink").is_err());
    }

    #[test]
    fn test_log_flight_plan() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("plan.mavlink"),
            "QGC WPL 110\n0\t1\t0\t22\t0\t0\t0\t0\t48.8\t2.3\t10\t1\n",
        )
        .expect("write");
        std::fs::write(dir.path().join("bad.mavlink"), "not a plan").expect("write");

        let assets = DirAssets::new(dir.path());
        let plan = log_flight_plan(&assets, "plan.mavlink").expect("plan");
        assert_eq!(plan.items.len(), 1);
        assert!(log_flight_plan(&assets, "bad.mavlink").is_none());
        assert!(log_flight_plan(&assets, "missing.mavlink").is_none());
    }
}
