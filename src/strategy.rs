//! # Estimation Strategies
//!
//! Three interchangeable ways of turning a telemetry snapshot into range and
//! time remaining. The telemetry server picks one by name in its config; the
//! estimator dispatches to it on every tick, so switching strategies never
//! touches the calling code.
//!
//! | Name              | Range from                         | Time from        |
//! |-------------------|------------------------------------|------------------|
//! | `overall-average` | long-run kWh/nm                    | long-run kWh/min |
//! | `time-average`    | time remaining × current trip speed | long-run kWh/min |
//! | `rolling-average` | long-run kWh/nm blended with recent | carried over     |
//!
//! Every strategy is a plain function of the current state and the snapshot.
//! Nothing here mutates the estimator: the rolling strategy returns its next
//! window state and [`Estimator`](crate::Estimator) commits it only when the
//! whole computation succeeded.

use crate::averaging::{usable_average, Calibration};
use crate::error::{EstimatorError, Result};
use crate::{Estimate, TelemetrySnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default rolling window length in minutes.
pub const DEFAULT_WINDOW_MINUTES: f64 = 10.0;

const SECS_PER_HOUR: f64 = 3600.0;
const MINS_PER_HOUR: f64 = 60.0;

/// Which algorithm a tick runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Long-run kWh/nm and kWh/min only
    #[default]
    OverallAverage,
    /// Long-run kWh/min combined with this trip's average speed
    TimeAverage,
    /// Long-run kWh/nm blended with the most recent window's kWh/nm
    RollingAverage,
}

impl Strategy {
    /// All strategies, in declaration order.
    pub const ALL: [Self; 3] = [Self::OverallAverage, Self::TimeAverage, Self::RollingAverage];

    /// Stable name used in config files and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OverallAverage => "overall-average",
            Self::TimeAverage => "time-average",
            Self::RollingAverage => "rolling-average",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown strategy name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown strategy '{0}' (expected overall-average, time-average or rolling-average)")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStrategyError(s.to_string()))
    }
}

/// Rolling-window sub-state, written only by the rolling strategy and by
/// [`Estimator::start_trip`](crate::Estimator::start_trip).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    /// Window length in minutes
    pub window_minutes: f64,
    /// `energy_used` captured at the last window boundary (kWh)
    pub energy_ref: f64,
    /// `trip_distance` captured at the last window boundary (nm)
    pub distance_ref: f64,
    /// kWh/nm realized over the most recent complete window
    pub consumption: f64,
    /// kWh/nm actually used for the last range computation
    pub blended_avg: f64,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MINUTES, 0.0, 0.0)
    }
}

impl RollingWindow {
    /// Window with the given length and starting reference points.
    pub const fn new(window_minutes: f64, energy_ref: f64, distance_ref: f64) -> Self {
        Self {
            window_minutes,
            energy_ref,
            distance_ref,
            consumption: 0.0,
            blended_avg: 0.0,
        }
    }

    /// Reject windows that are not a positive finite number of minutes.
    pub fn validate(&self) -> Result<()> {
        if self.window_minutes.is_finite() && self.window_minutes > 0.0 {
            Ok(())
        } else {
            Err(EstimatorError::InvalidParameter {
                name: "window_minutes",
                value: self.window_minutes,
            })
        }
    }

    /// Same window length, reference points back at the start of a trip.
    pub const fn restarted(&self) -> Self {
        Self::new(self.window_minutes, 0.0, 0.0)
    }

    /// True when `elapsed_minutes` falls exactly on a window boundary.
    pub fn is_boundary(&self, elapsed_minutes: f64) -> bool {
        elapsed_minutes % self.window_minutes == 0.0
    }
}

/// Result of one rolling-average step: the window to commit and the outputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollingStep {
    /// Window state after this tick
    pub window: RollingWindow,
    /// Outputs after this tick
    pub estimate: Estimate,
}

/// Weight given to the rolling consumption after `elapsed_minutes`.
///
/// Zero through the first window, then `t / (t + window)` with
/// `t = elapsed - window`: one half a window after the grace period, rising
/// towards one as the trip gets longer.
pub fn blend_weight(elapsed_minutes: f64, window_minutes: f64) -> f64 {
    if elapsed_minutes <= window_minutes {
        return 0.0;
    }
    let t = elapsed_minutes - window_minutes;
    t / (t + window_minutes)
}

/// Strategy A: both outputs from the long-run averages.
pub fn overall_average(calibration: &Calibration, snapshot: &TelemetrySnapshot) -> Result<Estimate> {
    let energy = available_energy(snapshot)?;
    let distance_avg = calibration.checked_distance_avg()?;
    let time_avg = calibration.checked_time_avg()?;

    Ok(Estimate {
        range_remaining: energy / distance_avg,
        time_remaining: energy / time_avg,
    })
}

/// Strategy B: time from the long-run kWh/min, range from that time at the
/// trip's average speed so far.
///
/// The first tick of a trip has no duration and is rejected.
pub fn time_average(calibration: &Calibration, snapshot: &TelemetrySnapshot) -> Result<Estimate> {
    let energy = available_energy(snapshot)?;
    let time_avg = calibration.checked_time_avg()?;

    if !(snapshot.trip_duration.is_finite() && snapshot.trip_duration > 0.0) {
        return Err(EstimatorError::invalid_trip("trip duration must be positive"));
    }
    let distance = trip_distance(snapshot)?;

    let time_remaining = energy / time_avg;
    // knots
    let trip_speed = distance / snapshot.trip_duration * SECS_PER_HOUR;

    Ok(Estimate {
        range_remaining: (time_remaining / MINS_PER_HOUR) * trip_speed,
        time_remaining,
    })
}

/// Strategy C: range from the long-run kWh/nm blended with the last window.
///
/// On a window boundary the window's realized kWh/nm is recomputed and the
/// reference points move to the current snapshot. A window in which the
/// vessel covered no distance has no kWh/nm and is rejected as
/// `InvalidTripData`. `time_remaining` is carried over from `previous`.
pub fn rolling_average(
    calibration: &Calibration,
    window: &RollingWindow,
    snapshot: &TelemetrySnapshot,
    previous: Estimate,
) -> Result<RollingStep> {
    let energy = available_energy(snapshot)?;
    trip_distance(snapshot)?;
    // Zero is allowed: the first tick of a trip sits on a window boundary
    if !(snapshot.trip_duration.is_finite() && snapshot.trip_duration >= 0.0) {
        return Err(EstimatorError::invalid_trip("trip duration must not be negative"));
    }
    let elapsed = snapshot.elapsed_minutes();

    let mut next = *window;

    if window.is_boundary(elapsed) {
        let distance_delta = snapshot.trip_distance - window.distance_ref;
        if distance_delta == 0.0 || !distance_delta.is_finite() {
            return Err(EstimatorError::invalid_trip(
                "no distance covered over the rolling window",
            ));
        }
        let consumption = (snapshot.energy_used - window.energy_ref) / distance_delta;
        if !consumption.is_finite() {
            return Err(EstimatorError::invalid_trip("energy used is not finite"));
        }
        next.consumption = consumption;
        next.energy_ref = snapshot.energy_used;
        next.distance_ref = snapshot.trip_distance;
    }

    let distance_avg = calibration.checked_distance_avg()?;
    let weight = blend_weight(elapsed, window.window_minutes);
    next.blended_avg = (1.0 - weight) * distance_avg + weight * next.consumption;
    let blended = usable_average("roll_blended_avg", next.blended_avg)?;

    Ok(RollingStep {
        window: next,
        estimate: Estimate {
            range_remaining: energy / blended,
            time_remaining: previous.time_remaining,
        },
    })
}

fn trip_distance(snapshot: &TelemetrySnapshot) -> Result<f64> {
    if snapshot.trip_distance.is_finite() && snapshot.trip_distance >= 0.0 {
        Ok(snapshot.trip_distance)
    } else {
        Err(EstimatorError::invalid_trip("trip distance must not be negative"))
    }
}

fn available_energy(snapshot: &TelemetrySnapshot) -> Result<f64> {
    if snapshot.energy_available.is_finite() {
        Ok(snapshot.energy_available)
    } else {
        Err(EstimatorError::invalid_trip("energy available is not finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration() -> Calibration {
        Calibration {
            distance_avg: 1.0,
            time_avg: 0.5,
            run_count: 4,
        }
    }

    fn snapshot(
        energy_available: f64,
        energy_used: f64,
        trip_distance: f64,
        trip_duration: f64,
    ) -> TelemetrySnapshot {
        TelemetrySnapshot {
            energy_available,
            energy_used,
            trip_distance,
            trip_duration,
        }
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>(), Ok(strategy));
            assert_eq!(strategy.to_string(), strategy.as_str());
        }
        assert_eq!(" Rolling-Average ".parse::<Strategy>(), Ok(Strategy::RollingAverage));
        assert!("kalman".parse::<Strategy>().is_err());
    }

    #[test]
    fn overall_average_stargazer_half_charge() {
        let estimate = overall_average(&calibration(), &snapshot(29.0, 29.0, 20.0, 3600.0)).unwrap();
        assert_eq!(estimate.range_remaining, 29.0);
        assert_eq!(estimate.time_remaining, 58.0);
    }

    #[test]
    fn overall_average_rejects_zero_average() {
        let cal = Calibration {
            distance_avg: 0.0,
            ..calibration()
        };
        assert_eq!(
            overall_average(&cal, &snapshot(29.0, 0.0, 0.0, 0.0)),
            Err(EstimatorError::DegenerateAverage {
                name: "distance_avg",
                value: 0.0
            })
        );
    }

    #[test]
    fn time_average_uses_trip_speed() {
        // 30 min at 6 nm = 12 kts; 20 kWh / 0.5 kWh/min = 40 min → 8 nm
        let estimate = time_average(&calibration(), &snapshot(20.0, 15.0, 6.0, 1800.0)).unwrap();
        assert_relative_eq!(estimate.time_remaining, 40.0);
        assert_relative_eq!(estimate.range_remaining, 8.0);
    }

    #[test]
    fn time_average_rejects_trip_start() {
        assert!(matches!(
            time_average(&calibration(), &snapshot(20.0, 0.0, 0.0, 0.0)),
            Err(EstimatorError::InvalidTripData { .. })
        ));
    }

    #[test]
    fn time_average_rejects_negative_distance() {
        assert!(matches!(
            time_average(&calibration(), &snapshot(20.0, 15.0, -6.0, 1800.0)),
            Err(EstimatorError::InvalidTripData { .. })
        ));
    }

    #[test]
    fn rolling_rejects_negative_distance_and_duration() {
        let window = RollingWindow::new(10.0, 1.0, 1.0);
        for bad in [snapshot(40.0, 6.0, 4.0, -1800.0), snapshot(40.0, 6.0, -4.0, 1260.0)] {
            assert!(
                matches!(
                    rolling_average(&calibration(), &window, &bad, Estimate::default()),
                    Err(EstimatorError::InvalidTripData { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn blend_weight_grace_period_and_growth() {
        assert_eq!(blend_weight(0.0, 10.0), 0.0);
        assert_eq!(blend_weight(10.0, 10.0), 0.0);
        assert_relative_eq!(blend_weight(20.0, 10.0), 0.5);

        let mut last = 0.0;
        for minute in 11..600 {
            let w = blend_weight(f64::from(minute), 10.0);
            assert!(w > last, "weight must increase: {w} <= {last} at {minute}");
            assert!(w < 1.0);
            last = w;
        }
        assert!(blend_weight(1.0e6, 10.0) > 0.9999);
    }

    #[test]
    fn rolling_grace_period_ignores_rolling_state() {
        let window = RollingWindow {
            consumption: 42.0,
            ..RollingWindow::new(10.0, 3.0, 1.0)
        };
        // 7 minutes in: not a boundary, inside the grace period
        let step = rolling_average(&calibration(), &window, &snapshot(50.0, 8.0, 2.0, 420.0), Estimate::default())
            .unwrap();
        assert_eq!(step.estimate.range_remaining, 50.0);
        assert_eq!(step.window.blended_avg, 1.0);
        assert_eq!(step.window.energy_ref, 3.0);
    }

    #[test]
    fn rolling_boundary_moves_references() {
        let window = RollingWindow::new(10.0, 0.0, 0.0);
        // 20 min boundary: 6 kWh over 4 nm = 1.5 kWh/nm, weight 0.5 → 1.25
        let step = rolling_average(
            &calibration(),
            &window,
            &snapshot(40.0, 6.0, 4.0, 1200.0),
            Estimate {
                range_remaining: 1.0,
                time_remaining: 77.0,
            },
        )
        .unwrap();
        assert_relative_eq!(step.window.consumption, 1.5);
        assert_eq!(step.window.energy_ref, 6.0);
        assert_eq!(step.window.distance_ref, 4.0);
        assert_relative_eq!(step.window.blended_avg, 1.25);
        assert_relative_eq!(step.estimate.range_remaining, 32.0);
        assert_eq!(step.estimate.time_remaining, 77.0);
    }

    #[test]
    fn rolling_stationary_window_is_invalid() {
        let window = RollingWindow::new(10.0, 5.0, 3.0);
        assert!(matches!(
            rolling_average(&calibration(), &window, &snapshot(40.0, 6.0, 3.0, 600.0), Estimate::default()),
            Err(EstimatorError::InvalidTripData { .. })
        ));
    }

    #[test]
    fn rolling_negative_blend_is_degenerate() {
        // Energy counter went backwards across the window
        let window = RollingWindow::new(10.0, 10.0, 0.0);
        assert!(matches!(
            rolling_average(&calibration(), &window, &snapshot(40.0, 0.0, 1.0, 1200.0), Estimate::default()),
            Err(EstimatorError::DegenerateAverage {
                name: "roll_blended_avg",
                ..
            })
        ));
    }

    #[test]
    fn window_validation() {
        assert!(RollingWindow::default().validate().is_ok());
        assert!(RollingWindow::new(0.0, 0.0, 0.0).validate().is_err());
        assert!(RollingWindow::new(f64::NAN, 0.0, 0.0).validate().is_err());
    }
}
