//! Flight plan staging
//!
//! Copies the read-only flight plan asset to a writable file the SDK can
//! upload from. Runs on a blocking worker, never on the event loop.

use crate::sdk::AssetSource;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A flight plan copied to a writable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFlightPlan {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Copy asset `name` into a new temporary file under `dir`.
///
/// The file is only kept once the whole asset has been written, so a failed
/// copy never leaves a partial flight plan behind.
pub fn stage_flight_plan(
    assets: &dyn AssetSource,
    name: &str,
    dir: &Path,
) -> Result<StagedFlightPlan> {
    let mut input = assets
        .open(name)
        .with_context(|| format!("Failed to open asset {}", name))?;

    let asset = Path::new(name);
    let prefix = asset
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flightplan");
    let suffix = asset
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let mut staged = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    let bytes = io::copy(&mut input, &mut staged)
        .with_context(|| format!("Failed to copy asset {}", name))?;
    staged.flush().context("Failed to flush staged flight plan")?;

    let (_, path) = staged
        .keep()
        .context("Failed to keep staged flight plan")?;

    Ok(StagedFlightPlan { path, bytes })
}
