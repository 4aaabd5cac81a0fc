//! Monitor configuration

use flightplan_shared::FLIGHT_PLAN_ASSET;
use std::path::PathBuf;

/// Configuration for the session monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Directory holding the bundled, read-only assets
    pub asset_dir: PathBuf,
    /// Name of the flight plan asset within `asset_dir`
    pub flight_plan_asset: String,
    /// Writable directory the flight plan is staged into before upload
    pub staging_dir: PathBuf,
    /// Append-only log file, in addition to stdout
    pub log_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            flight_plan_asset: FLIGHT_PLAN_ASSET.into(),
            staging_dir: std::env::temp_dir(),
            log_file: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `FLIGHTPLAN_ASSET_DIR`, `FLIGHTPLAN_ASSET`,
    /// `FLIGHTPLAN_STAGING_DIR` and `FLIGHTPLAN_LOG_FILE`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            asset_dir: var("FLIGHTPLAN_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_dir),
            flight_plan_asset: var("FLIGHTPLAN_ASSET").unwrap_or(defaults.flight_plan_asset),
            staging_dir: var("FLIGHTPLAN_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            log_file: var("FLIGHTPLAN_LOG_FILE").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.asset_dir, PathBuf::from("assets"));
        assert_eq!(config.flight_plan_asset, "flightplan.mavlink");
        assert_eq!(config.staging_dir, std::env::temp_dir());
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLIGHTPLAN_ASSET_DIR", "/opt/monitor/assets"),
            ("FLIGHTPLAN_STAGING_DIR", "/var/tmp"),
            ("FLIGHTPLAN_LOG_FILE", "app_logs.txt"),
        ]
        .into_iter()
        .collect();

        let config = MonitorConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.asset_dir, PathBuf::from("/opt/monitor/assets"));
        assert_eq!(config.flight_plan_asset, "flightplan.mavlink");
        assert_eq!(config.staging_dir, PathBuf::from("/var/tmp"));
        assert_eq!(config.log_file, Some(PathBuf::from("app_logs.txt")));
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = MonitorConfig::from_lookup(|key| match key {
            "FLIGHTPLAN_ASSET" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config, MonitorConfig::default());
    }
}
