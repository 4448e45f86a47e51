//! Augur Runner — run pipeline, agent fusion, calibration, κ autotuning and
//! the run archive.
//!
//! This crate builds on `augur-core` to provide:
//! - Lottery and screener runs over a shared `Core` (store, oracle, agent pool)
//! - Orchestrator that scores agents in parallel and fuses them into a bounded multiplier
//! - Immutable per-run archive and replay
//! - Calibration: ridge agent weights, reliability bins, dynamic cap
//! - κ autotuning from temporal logs and outcomes
//! - TOML configuration

pub mod archive;
pub mod autotune;
pub mod bundle;
pub mod calibrate;
pub mod config;
pub mod orchestrator;
pub mod pipeline;

pub use archive::{load_run, latest_run, list_runs, RecordedInputs, RunRecord};
pub use autotune::{autotune, Metric, Tuned};
pub use bundle::{LotteryOutput, RankedRow, RunInputs, RunOptions, ScreenInputs, ScreenOutput, Telemetry};
pub use calibrate::{run_calibration, CalibrateOptions, CalibrationReport, CapLock};
pub use config::{AugurConfig, KappaFile, PathsConfig, SettingsError};
pub use orchestrator::{AgentWeights, Fused, Label, Orchestrator};
pub use pipeline::{Core, Replay, RunError};
