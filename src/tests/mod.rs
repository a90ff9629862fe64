//! Scenario tests for the range estimator and the command line.
//!
//! These exercise the library the way the telemetry server does: whole trips,
//! strategy switches and calibration carried from one trip to the next.
