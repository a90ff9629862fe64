//! # Range Estimator
//!
//! [`Estimator`] owns all state the algorithms need: the long-run
//! [`Calibration`], the rolling window and the last outputs. The telemetry
//! server drives it with two calls:
//!
//! - [`Estimator::tick`] on every telemetry update (high frequency)
//! - [`Estimator::update_average`] once per completed trip (low frequency)
//!
//! ## Failure Semantics
//!
//! Both calls compute into locals and commit only when every division
//! succeeded. A rejected tick leaves the previous range and time in place, and
//! a rejected trip neither moves the averages nor bumps `run_count`.
//!
//! ## Sharing
//!
//! The estimator is a plain `&mut self` object. When ticks and trip
//! completions arrive from more than one task, wrap it in a
//! [`SharedEstimator`] so each call runs under one lock.

use crate::averaging::{AveragingPolicy, Calibration};
use crate::config::Config;
use crate::error::Result;
use crate::strategy::{self, RollingWindow, Strategy};
use crate::{Estimate, TelemetrySnapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Stateful range and time estimator for one vessel.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimator {
    capacity: f64,
    calibration: Calibration,
    rolling: RollingWindow,
    strategy: Strategy,
    averaging: AveragingPolicy,
    estimate: Estimate,
}

impl Estimator {
    /// Estimator with the default 10-minute rolling window starting at zero
    /// and running-mean averaging.
    ///
    /// Placeholder (zero) averages are accepted here; ticks fail with
    /// `DegenerateAverage` until the first trip has been folded in.
    pub fn new(
        capacity: f64,
        distance_avg: f64,
        time_avg: f64,
        run_count: u32,
        strategy: Strategy,
    ) -> Self {
        Self {
            capacity,
            calibration: Calibration {
                distance_avg,
                time_avg,
                run_count,
            },
            rolling: RollingWindow::default(),
            strategy,
            averaging: AveragingPolicy::default(),
            estimate: Estimate::default(),
        }
    }

    /// Build from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let calibration = Calibration::from(&config.calibration);
        Self::new(
            config.battery.capacity_kwh,
            calibration.distance_avg,
            calibration.time_avg,
            calibration.run_count,
            config.estimator.strategy,
        )
        .with_rolling_window(RollingWindow::from(&config.rolling))?
        .with_averaging(config.estimator.averaging)
    }

    /// Replace the rolling window (length and reference points).
    pub fn with_rolling_window(mut self, rolling: RollingWindow) -> Result<Self> {
        rolling.validate()?;
        self.rolling = rolling;
        Ok(self)
    }

    /// Select the averaging policy used by [`update_average`](Self::update_average).
    pub fn with_averaging(mut self, averaging: AveragingPolicy) -> Result<Self> {
        averaging.validate()?;
        self.averaging = averaging;
        Ok(self)
    }

    /// Seed the long-run averages, e.g. from a saved calibration file.
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn rolling(&self) -> &RollingWindow {
        &self.rolling
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn averaging(&self) -> AveragingPolicy {
        self.averaging
    }

    /// Last committed outputs.
    pub fn estimate(&self) -> Estimate {
        self.estimate
    }

    pub fn range_remaining(&self) -> f64 {
        self.estimate.range_remaining
    }

    pub fn time_remaining(&self) -> f64 {
        self.estimate.time_remaining
    }

    /// Switch the strategy used by subsequent ticks.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Discard accumulated calibration history.
    ///
    /// Only `run_count` is zeroed. The current averages stay as the seed, so
    /// with running-mean averaging the next completed trip counts as the
    /// first and outweighs everything before it.
    pub fn reset_calibration(&mut self) {
        info!(
            previous_runs = self.calibration.run_count,
            "calibration history reset"
        );
        self.calibration.run_count = 0;
    }

    /// Point the rolling window at the start of a new trip.
    ///
    /// `energy_used` and `trip_distance` count from zero again on every trip,
    /// so the references left at the previous trip's last boundary would
    /// otherwise be compared against the new trip's counters. The window length
    /// and the calibration are kept.
    pub fn start_trip(&mut self) {
        self.rolling = self.rolling.restarted();
        debug!("rolling window restarted for a new trip");
    }

    /// Run the configured strategy on `snapshot` and store the outputs.
    pub fn tick(&mut self, snapshot: &TelemetrySnapshot) -> Result<Estimate> {
        let estimate = match self.strategy {
            Strategy::OverallAverage => strategy::overall_average(&self.calibration, snapshot)?,
            Strategy::TimeAverage => strategy::time_average(&self.calibration, snapshot)?,
            Strategy::RollingAverage => {
                let step = strategy::rolling_average(
                    &self.calibration,
                    &self.rolling,
                    snapshot,
                    self.estimate,
                )?;
                self.rolling = step.window;
                step.estimate
            }
        };

        self.estimate = estimate;
        debug!(
            strategy = %self.strategy,
            range_nm = estimate.range_remaining,
            time_min = estimate.time_remaining,
            "tick"
        );
        Ok(estimate)
    }

    /// Fold a completed trip into the long-run averages.
    ///
    /// `trip` is the final snapshot of the trip: total energy used, total
    /// distance and total duration.
    pub fn update_average(&mut self, trip: &TelemetrySnapshot) -> Result<()> {
        let calibration = self.calibration.folded(trip, self.averaging)?;
        self.calibration = calibration;
        info!(
            run_count = calibration.run_count,
            distance_avg = calibration.distance_avg,
            time_avg = calibration.time_avg,
            "trip folded into calibration"
        );
        Ok(())
    }
}

/// An [`Estimator`] behind a mutex, for feeds that tick from several tasks.
///
/// Failed calls never leave partial state behind, so a poisoned lock is
/// recovered rather than propagated.
#[derive(Debug, Clone)]
pub struct SharedEstimator {
    inner: Arc<Mutex<Estimator>>,
}

impl SharedEstimator {
    pub fn new(estimator: Estimator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(estimator)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Estimator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`Estimator::tick`] under the lock.
    pub fn tick(&self, snapshot: &TelemetrySnapshot) -> Result<Estimate> {
        self.lock().tick(snapshot)
    }

    /// [`Estimator::update_average`] under the lock.
    pub fn update_average(&self, trip: &TelemetrySnapshot) -> Result<()> {
        self.lock().update_average(trip)
    }

    /// Run `f` with exclusive access to the estimator.
    pub fn with<R>(&self, f: impl FnOnce(&mut Estimator) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the current estimator state.
    pub fn snapshot(&self) -> Estimator {
        self.lock().clone()
    }
}
