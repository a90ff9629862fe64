//! # Telemetry Feed Driver
//!
//! Plays the part of the telemetry server: reads newline-delimited JSON
//! frames, ticks the estimator for each one and writes one JSON estimate
//! record per frame.
//!
//! ## Input frame
//! ```json
//! {"energyAvailable":41.5,"energyUsed":16.5,"tripDistance":11.2,"tripDuration":1800,"tripComplete":false}
//! ```
//! `tripComplete` is optional. When it is `true` the frame is ticked as usual
//! and then folded into the calibration, which is saved if a calibration path
//! was given. The rolling window then restarts, since the next frame belongs
//! to a new trip whose counters begin at zero.
//!
//! ## Output record
//! ```json
//! {"strategy":"overall-average","rangeRemaining":41.5,"timeRemaining":83.0,"status":"ok","computedAt":"..."}
//! ```
//! When the estimator rejects a frame the record repeats the last valid
//! estimate with `"status":"held"` and the rejection reason. Lines that are
//! not valid frames are logged and skipped.

use crate::calibration_store;
use crate::error::FeedError;
use crate::estimator::Estimator;
use crate::strategy::Strategy;
use crate::{Estimate, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// One line of the telemetry feed.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFrame {
    #[serde(flatten)]
    pub snapshot: TelemetrySnapshot,
    /// Last frame of a trip
    #[serde(default)]
    pub trip_complete: bool,
}

/// Whether the record carries a fresh estimate or repeats the last one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateStatus {
    Ok,
    Held,
}

/// One line of output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRecord {
    pub strategy: Strategy,
    #[serde(flatten)]
    pub estimate: Estimate,
    pub status: EstimateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub computed_at: DateTime<Utc>,
}

/// Counters reported when the feed ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Frames ticked
    pub frames: u64,
    /// Frames answered with a held estimate
    pub held: u64,
    /// Lines that were not valid frames
    pub malformed: u64,
    /// Trips folded into the calibration
    pub trips: u64,
}

/// Drive `estimator` from `reader` until end of input.
///
/// Returns early only on I/O failure. `calibration_path`, when set, receives
/// the calibration after every trip that was folded in successfully.
pub async fn run<R, W>(
    estimator: &mut Estimator,
    reader: R,
    mut writer: W,
    calibration_path: Option<&Path>,
) -> Result<FeedSummary, FeedError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame: FeedFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("skipping malformed telemetry frame: {e}");
                summary.malformed += 1;
                continue;
            }
        };

        let record = process_frame(estimator, &frame, calibration_path, &mut summary);
        let mut out = serde_json::to_vec(&record)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    info!(
        frames = summary.frames,
        held = summary.held,
        malformed = summary.malformed,
        trips = summary.trips,
        "telemetry feed ended"
    );
    Ok(summary)
}

fn process_frame(
    estimator: &mut Estimator,
    frame: &FeedFrame,
    calibration_path: Option<&Path>,
    summary: &mut FeedSummary,
) -> EstimateRecord {
    summary.frames += 1;

    let (status, reason) = match estimator.tick(&frame.snapshot) {
        Ok(_) => (EstimateStatus::Ok, None),
        Err(e) => {
            debug!("estimate held: {e}");
            summary.held += 1;
            (EstimateStatus::Held, Some(e.to_string()))
        }
    };

    if frame.trip_complete {
        complete_trip(estimator, &frame.snapshot, calibration_path, summary);
    }

    EstimateRecord {
        strategy: estimator.strategy(),
        estimate: estimator.estimate(),
        status,
        reason,
        computed_at: Utc::now(),
    }
}

fn complete_trip(
    estimator: &mut Estimator,
    trip: &TelemetrySnapshot,
    calibration_path: Option<&Path>,
    summary: &mut FeedSummary,
) {
    if let Err(e) = estimator.update_average(trip) {
        warn!("completed trip not folded into calibration: {e}");
        return;
    }
    summary.trips += 1;
    estimator.start_trip();

    if let Some(path) = calibration_path {
        if let Err(e) = calibration_store::save(path, estimator.calibration()) {
            warn!(path = %path.display(), "failed to save calibration: {e}");
        }
    }
}
