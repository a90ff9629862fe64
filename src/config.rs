//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! vessel-range.toml file. It holds the battery size, the calibration seed
//! used when no saved calibration exists, the rolling window, which strategy
//! the telemetry server wants and where calibration is persisted.
//!
//! Every section has defaults (the Stargazer: 58 kWh usable), so a file only
//! needs the keys it changes:
//!
//! ```toml
//! [estimator]
//! strategy = "rolling-average"
//! averaging = { policy = "exponential-smoothing", alpha = 0.15 }
//! ```

use crate::averaging::{AveragingPolicy, Calibration};
use crate::strategy::{RollingWindow, Strategy, DEFAULT_WINDOW_MINUTES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "vessel-range.toml";

/// Application configuration loaded from vessel-range.toml
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Battery pack
    pub battery: BatteryConfig,
    /// Calibration seed, used when no saved calibration is available
    pub calibration: CalibrationConfig,
    /// Rolling-average window
    pub rolling: RollingConfig,
    /// Strategy and averaging policy
    pub estimator: EstimatorConfig,
    /// Calibration persistence
    pub state: StateConfig,
}

/// Battery pack configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Total usable energy in kWh
    pub capacity_kwh: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self { capacity_kwh: 58.0 }
    }
}

/// Initial efficiency averages
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// kWh per nautical mile
    pub distance_avg: f64,
    /// kWh per minute
    pub time_avg: f64,
    /// Trips already folded into the averages above
    pub run_count: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            distance_avg: 1.0,
            time_avg: 0.5,
            run_count: 0,
        }
    }
}

impl From<&CalibrationConfig> for Calibration {
    fn from(config: &CalibrationConfig) -> Self {
        Self {
            distance_avg: config.distance_avg,
            time_avg: config.time_avg,
            run_count: config.run_count,
        }
    }
}

/// Rolling-average window configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Minutes between rolling reference points
    pub window_minutes: f64,
    /// Starting energy reference (kWh)
    pub energy_ref: f64,
    /// Starting distance reference (nm)
    pub distance_ref: f64,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            energy_ref: 0.0,
            distance_ref: 0.0,
        }
    }
}

impl From<&RollingConfig> for RollingWindow {
    fn from(config: &RollingConfig) -> Self {
        Self::new(config.window_minutes, config.energy_ref, config.distance_ref)
    }
}

/// Strategy selection
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Algorithm run on every tick
    pub strategy: Strategy,
    /// How completed trips update the averages
    pub averaging: AveragingPolicy,
}

/// Where calibration is stored between runs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding the latest calibration
    pub calibration_path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            calibration_path: PathBuf::from("vessel-range-calibration.json"),
        }
    }
}

impl Config {
    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        strategy = %config.estimator.strategy,
                        capacity_kwh = config.battery.capacity_kwh,
                        "loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), "invalid config file format: {e}");
                    warn!("using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using default configuration");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.battery.capacity_kwh, 58.0);
        assert_eq!(config.calibration.distance_avg, 1.0);
        assert_eq!(config.calibration.time_avg, 0.5);
        assert_eq!(config.calibration.run_count, 0);
        assert_eq!(config.rolling.window_minutes, 10.0);
        assert_eq!(config.estimator.strategy, Strategy::OverallAverage);
        assert_eq!(config.estimator.averaging, AveragingPolicy::RunningMean);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config {
            estimator: EstimatorConfig {
                strategy: Strategy::RollingAverage,
                averaging: AveragingPolicy::exponential(),
            },
            ..Config::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [battery]
            capacity_kwh = 40.0

            [estimator]
            strategy = "time-average"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.battery.capacity_kwh, 40.0);
        assert_eq!(parsed.estimator.strategy, Strategy::TimeAverage);
        assert_eq!(parsed.calibration, CalibrationConfig::default());
        assert_eq!(parsed.rolling, RollingConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_file_falls_back() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[estimator]\nstrategy = \"kalman\"\n").unwrap();
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.calibration.run_count = 12;
        config.rolling.window_minutes = 5.0;
        config.save(file.path()).unwrap();

        assert_eq!(Config::load_from_path(file.path()), config);
    }
}
