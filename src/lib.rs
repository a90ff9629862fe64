//! # Vessel Range Core Library
//!
//! Statistical range and battery-time estimation for electric vessels. A
//! telemetry server (typically an NMEA 2000 gateway) hands the estimator a
//! snapshot of the current trip on every update and reads back how far and
//! how long the vessel can still run.
//!
//! ## Approach
//!
//! This is not a physics model. There is no terrain, weather or load input.
//! Everything is derived from consumption ratios:
//! - **kWh/nm** (`distance_avg`): long-run energy per nautical mile
//! - **kWh/min** (`time_avg`): long-run energy per minute underway
//! - **Rolling kWh/nm**: realized efficiency over the most recent window
//!
//! The long-run ratios are calibrated once per completed trip, so a single
//! noisy trip only moves them a little. The rolling strategy blends recent
//! data in gradually as a trip gets longer.
//!
//! ## Data Flow
//! 1. **Tick**: snapshot → configured [`Strategy`] → [`Estimate`]
//! 2. **Trip complete**: snapshot → [`Estimator::update_average`] → new calibration
//! 3. **Persistence**: the caller stores the [`Calibration`] between runs
//!    (see [`calibration_store`])
//!
//! ## Example
//! ```
//! use vessel_range_lib::{Estimator, Strategy, TelemetrySnapshot};
//!
//! let mut estimator = Estimator::new(58.0, 1.0, 0.5, 0, Strategy::OverallAverage);
//! let snapshot = TelemetrySnapshot {
//!     energy_available: 29.0,
//!     energy_used: 29.0,
//!     trip_distance: 25.0,
//!     trip_duration: 3000.0,
//! };
//!
//! let estimate = estimator.tick(&snapshot).unwrap();
//! assert_eq!(estimate.range_remaining, 29.0);
//! assert_eq!(estimate.time_remaining, 58.0);
//! ```

use serde::{Deserialize, Serialize};

pub mod averaging;
pub mod calibration_store;
pub mod config;
pub mod error;
pub mod estimator;
pub mod feed;
pub mod strategy;

pub use averaging::{AveragingPolicy, Calibration};
pub use error::{EstimatorError, Result};
pub use estimator::{Estimator, SharedEstimator};
pub use strategy::{RollingWindow, Strategy};

/// Trip state delivered by the telemetry feed on every update.
///
/// Units follow the vessel's data bus: kWh for energy, nautical miles for
/// distance and **seconds** for duration. The wire names are the camelCase
/// keys the gateway emits (`energyAvailable`, `tripDuration`, ...).
///
/// # Example
/// ```
/// use vessel_range_lib::TelemetrySnapshot;
///
/// let json = r#"{"energyAvailable":40.0,"energyUsed":18.0,"tripDistance":12.5,"tripDuration":1800}"#;
/// let snapshot: TelemetrySnapshot = serde_json::from_str(json).unwrap();
///
/// assert_eq!(snapshot.elapsed_minutes(), 30.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Remaining usable battery energy (kWh)
    pub energy_available: f64,
    /// Energy consumed so far this trip (kWh)
    pub energy_used: f64,
    /// Distance covered so far this trip (nm)
    pub trip_distance: f64,
    /// Time elapsed this trip (seconds)
    pub trip_duration: f64,
}

impl TelemetrySnapshot {
    /// Trip time elapsed in minutes.
    pub fn elapsed_minutes(&self) -> f64 {
        self.trip_duration / 60.0
    }
}

/// Range and time remaining, as last computed by a tick.
///
/// `range_remaining` is in nautical miles, `time_remaining` in minutes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    /// Distance the remaining energy should cover (nm)
    pub range_remaining: f64,
    /// Time the remaining energy should last (min)
    pub time_remaining: f64,
}
