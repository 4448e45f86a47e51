//! Augur Core — history, features, oracle signals, probability surfaces,
//! agents and the pick selector.
//!
//! This crate holds everything a run computes:
//! - History rows (draws, OHLCV bars) and the per-entity CSV store
//! - Indicators and frequency features, computed top-down from history
//! - Oracle signal bundle with neutral fallbacks
//! - Nine-step probability builder and the temporal correction helper
//! - Static agent registry and the explainer contract
//! - Weighted selector producing diverse picks

pub mod agents;
pub mod domain;
pub mod explain;
pub mod features;
pub mod history;
pub mod indicators;
pub mod oracle;
pub mod probability;
pub mod rng;
pub mod selector;
pub mod serde_nan;
pub mod temporal;
