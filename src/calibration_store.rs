//! # Calibration Persistence
//!
//! The estimator itself never touches the disk. Keeping the long-run
//! averages across restarts is the telemetry server's job, and this module is
//! how the bundled binary does it.
//!
//! ## Storage
//! - **Location**: `state.calibration_path` from the config
//!   (default `vessel-range-calibration.json`)
//! - **Format**: JSON, written after every completed trip
//! - **Contents**: averages, run count and the time they were saved
//!
//! ## Failure Handling
//! A missing, corrupt or degenerate file is not fatal. The caller logs it and
//! starts from the calibration seed in the config instead.

use crate::averaging::Calibration;
use crate::error::CalibrationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Calibration as written to disk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCalibration {
    /// The averages and run count
    #[serde(flatten)]
    pub calibration: Calibration,
    /// When this record was written
    pub saved_at: DateTime<Utc>,
}

impl StoredCalibration {
    /// Stamp `calibration` with the current time.
    pub fn now(calibration: Calibration) -> Self {
        Self {
            calibration,
            saved_at: Utc::now(),
        }
    }
}

/// Load a saved calibration.
///
/// Rejects records whose averages could not be divided by, so a bad file
/// never reaches the estimator.
pub fn load<P: AsRef<Path>>(path: P) -> Result<StoredCalibration, CalibrationError> {
    let data = fs::read(path.as_ref())?;
    let stored: StoredCalibration = serde_json::from_slice(&data)?;

    stored.calibration.checked_distance_avg()?;
    stored.calibration.checked_time_avg()?;

    debug!(
        path = %path.as_ref().display(),
        run_count = stored.calibration.run_count,
        saved_at = %stored.saved_at,
        "calibration loaded"
    );
    Ok(stored)
}

/// Save `calibration` stamped with the current time.
pub fn save<P: AsRef<Path>>(path: P, calibration: Calibration) -> Result<(), CalibrationError> {
    let data = serde_json::to_vec_pretty(&StoredCalibration::now(calibration))?;
    // Write beside the target and rename, so a crash mid-write keeps the old file
    let tmp = path.as_ref().with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path.as_ref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_calibration() -> Calibration {
        Calibration {
            distance_avg: 1.8,
            time_avg: 0.42,
            run_count: 17,
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calibration.json");

        save(&path, sample_calibration()).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.calibration, sample_calibration());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"distanceAvg":1.2,"timeAvg":0.4,"runCount":3,"savedAt":"2026-05-01T12:00:00Z"}"#;
        let stored: StoredCalibration = serde_json::from_str(json).unwrap();
        assert_eq!(stored.calibration.run_count, 3);
        assert_eq!(stored.saved_at.to_rfc3339(), "2026-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load(dir.path().join("absent.json")),
            Err(CalibrationError::Io(_))
        ));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calibration.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load(&path), Err(CalibrationError::Format(_))));
    }

    #[test]
    fn test_degenerate_record_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("calibration.json");
        fs::write(
            &path,
            r#"{"distanceAvg":0.0,"timeAvg":0.4,"runCount":3,"savedAt":"2026-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(load(&path), Err(CalibrationError::Rejected(_))));
    }
}
