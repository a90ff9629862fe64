//! # Error Types
//!
//! Every division the estimator performs is checked. Instead of letting a zero
//! distance or a zero average turn into `inf`/`NaN` and poison the outputs or
//! the long-run calibration, the failing call returns one of these errors and
//! leaves the estimator exactly as it was.
//!
//! Callers should treat any error from `tick` as "estimate unavailable this
//! tick" and keep showing the previous valid estimate.

use std::io;
use thiserror::Error;

/// Result alias for estimator operations.
pub type Result<T> = std::result::Result<T, EstimatorError>;

/// Errors raised by [`Estimator::tick`](crate::estimator::Estimator::tick) and
/// [`Estimator::update_average`](crate::estimator::Estimator::update_average).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// Snapshot data that cannot produce a meaningful ratio
    /// (zero/negative distance or duration, non-finite readings).
    #[error("invalid trip data: {reason}")]
    InvalidTripData {
        /// What was wrong with the snapshot
        reason: &'static str,
    },

    /// An efficiency average that is zero, negative or non-finite, either
    /// stored in the calibration or produced by a computation.
    #[error("degenerate average: {name} = {value}")]
    DegenerateAverage {
        /// Which average (`distance_avg`, `time_avg`, `roll_blended_avg`)
        name: &'static str,
        /// The offending value
        value: f64,
    },

    /// Construction parameter outside its valid range.
    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// The rejected value
        value: f64,
    },
}

impl EstimatorError {
    pub(crate) const fn invalid_trip(reason: &'static str) -> Self {
        Self::InvalidTripData { reason }
    }

    pub(crate) const fn degenerate(name: &'static str, value: f64) -> Self {
        Self::DegenerateAverage { name, value }
    }
}

/// Errors from loading or saving the persisted calibration file.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// File could not be read or written
    #[error("calibration IO: {0}")]
    Io(#[from] io::Error),

    /// File contents are not a valid calibration record
    #[error("calibration format: {0}")]
    Format(#[from] serde_json::Error),

    /// Record parsed but holds an unusable average
    #[error("calibration rejected: {0}")]
    Rejected(#[from] EstimatorError),
}

/// Errors that stop the telemetry feed loop.
///
/// Malformed frames and estimator errors do not end up here; they are logged
/// and the loop moves on to the next line.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Reading input or writing output failed
    #[error("feed IO: {0}")]
    Io(#[from] io::Error),

    /// Output record could not be serialized
    #[error("feed encode: {0}")]
    Encode(#[from] serde_json::Error),
}
