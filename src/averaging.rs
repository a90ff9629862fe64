//! # Long-Run Calibration
//!
//! The calibration is the estimator's memory across trips: one kWh/nm figure,
//! one kWh/min figure and the number of trips folded into them. It changes
//! only when a trip completes.
//!
//! ## Averaging Policies
//!
//! ### Running mean (default)
//! The trip counter is incremented first and the new sample is then folded as
//!
//! ```text
//! new = (run_count * old + sample) / run_count
//! ```
//!
//! with the *incremented* `run_count`. This is the formula the vessel has been
//! calibrated with so far and it is kept bit-for-bit. Note that it is not the
//! textbook mean over `run_count` samples: repeated identical trips keep
//! pushing the average upwards instead of settling on the trip value.
//!
//! ### Exponential smoothing
//! A fixed weight on each new trip (0.15 by default):
//!
//! ```text
//! new = (1 - alpha) * old + alpha * sample
//! ```
//!
//! Recent trips dominate after a handful of runs, older history fades out.

use crate::error::{EstimatorError, Result};
use crate::TelemetrySnapshot;
use serde::{Deserialize, Serialize};

/// Default weight given to a new trip under exponential smoothing.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.15;

/// Seconds per minute, used to turn `trip_duration` into kWh/min.
const SECS_PER_MIN: f64 = 60.0;

/// Calibrated efficiency averages plus the number of trips behind them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    /// Energy per distance (kWh/nm)
    pub distance_avg: f64,
    /// Energy per time (kWh/min)
    pub time_avg: f64,
    /// Completed trips folded into the averages; zero it to recalibrate
    pub run_count: u32,
}

impl Calibration {
    /// `distance_avg`, or `DegenerateAverage` if it cannot be divided by.
    pub fn checked_distance_avg(&self) -> Result<f64> {
        usable_average("distance_avg", self.distance_avg)
    }

    /// `time_avg`, or `DegenerateAverage` if it cannot be divided by.
    pub fn checked_time_avg(&self) -> Result<f64> {
        usable_average("time_avg", self.time_avg)
    }

    /// Fold a completed trip into a copy of this calibration.
    ///
    /// `self` is left alone; the caller commits the returned value. Fails
    /// with `InvalidTripData` when the trip has no distance or no duration,
    /// and with `DegenerateAverage` when the folded averages would not be
    /// positive finite numbers.
    pub fn folded(&self, trip: &TelemetrySnapshot, policy: AveragingPolicy) -> Result<Self> {
        let (trip_distance_avg, trip_time_avg) = trip_efficiency(trip)?;
        let run_count = self.run_count.saturating_add(1);

        let distance_avg = policy.fold(self.distance_avg, trip_distance_avg, run_count);
        let time_avg = policy.fold(self.time_avg, trip_time_avg, run_count);

        Ok(Self {
            distance_avg: usable_average("distance_avg", distance_avg)?,
            time_avg: usable_average("time_avg", time_avg)?,
            run_count,
        })
    }
}

/// How a completed trip's efficiency is merged into the long-run averages.
///
/// In TOML this is an inline table tagged by `policy`:
///
/// ```toml
/// averaging = { policy = "running-mean" }
/// averaging = { policy = "exponential-smoothing", alpha = 0.15 }
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum AveragingPolicy {
    /// Increment-then-average running mean
    #[default]
    RunningMean,
    /// Fixed-weight blend of old average and new sample
    ExponentialSmoothing {
        /// Weight of the new trip, in (0, 1]
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
}

fn default_alpha() -> f64 {
    DEFAULT_SMOOTHING_ALPHA
}

impl AveragingPolicy {
    /// Exponential smoothing with the default 0.15 weight.
    pub const fn exponential() -> Self {
        Self::ExponentialSmoothing {
            alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }

    /// Reject smoothing weights outside (0, 1].
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::RunningMean => Ok(()),
            Self::ExponentialSmoothing { alpha } => {
                if alpha > 0.0 && alpha <= 1.0 {
                    Ok(())
                } else {
                    Err(EstimatorError::InvalidParameter {
                        name: "alpha",
                        value: alpha,
                    })
                }
            }
        }
    }

    /// Merge `sample` into `old`. `run_count` is the already incremented count.
    pub fn fold(&self, old: f64, sample: f64, run_count: u32) -> f64 {
        match *self {
            Self::RunningMean => {
                let n = f64::from(run_count);
                (n * old + sample) / n
            }
            Self::ExponentialSmoothing { alpha } => (1.0 - alpha) * old + alpha * sample,
        }
    }
}

/// Realized (kWh/nm, kWh/min) of a completed trip.
fn trip_efficiency(trip: &TelemetrySnapshot) -> Result<(f64, f64)> {
    if !trip.energy_used.is_finite() {
        return Err(EstimatorError::invalid_trip("energy used is not finite"));
    }
    if !(trip.trip_distance.is_finite() && trip.trip_distance > 0.0) {
        return Err(EstimatorError::invalid_trip("trip distance must be positive"));
    }
    if !(trip.trip_duration.is_finite() && trip.trip_duration > 0.0) {
        return Err(EstimatorError::invalid_trip("trip duration must be positive"));
    }

    let per_distance = trip.energy_used / trip.trip_distance;
    let per_minute = trip.energy_used / trip.trip_duration * SECS_PER_MIN;
    Ok((per_distance, per_minute))
}

pub(crate) fn usable_average(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EstimatorError::degenerate(name, value))
    }
}
