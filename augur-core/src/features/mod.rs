//! Feature builder: per-candidate frequency features for draw histories and
//! the breakout predictor for bars.
//!
//! Everything here is computed top-down from immutable history rows.

pub mod equity;
pub mod frequency;
pub mod pmi;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use equity::breakout_probability;
pub use frequency::{
    gap_bonus, gap_bonus_shifted, long_short_blend, mean_interval_days, recency_weights,
    weighted_counts, Ball,
};
pub use pmi::PairPmi;

use crate::domain::{DrawRow, GameRules};

/// Frequency-feature parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub half_life_days: f64,
    /// Weight of the short window in the long/short blend.
    pub alpha: f64,
    /// Rows in the short window.
    pub short_window: usize,
    pub gap_strength: f64,
    /// Optional upper bound on the gap factor; unbounded when `None`.
    pub gap_ceiling: Option<f64>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            half_life_days: 180.0,
            alpha: 0.3,
            short_window: 30,
            gap_strength: 0.2,
            gap_ceiling: None,
        }
    }
}

/// Blend and gap vectors for one ball over its domain.
#[derive(Debug, Clone, PartialEq)]
pub struct BallFeatures {
    pub blend: Vec<f64>,
    pub gap: Vec<f64>,
}

impl BallFeatures {
    fn build(
        rows: &[DrawRow],
        weights: &[f64],
        rules: &GameRules,
        ball: Ball,
        cfg: &FeatureConfig,
    ) -> Self {
        Self {
            blend: long_short_blend(rows, weights, rules, ball, cfg.alpha, cfg.short_window),
            gap: gap_bonus(rows, rules, ball, cfg.gap_strength, cfg.gap_ceiling),
        }
    }
}

/// Feature snapshot of a draw history as of one date.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSnapshot {
    pub n_rows: usize,
    pub last_date: Option<NaiveDate>,
    pub white: BallFeatures,
    pub special: Option<BallFeatures>,
    pub pmi: PairPmi,
}

impl FeatureSnapshot {
    /// Build features from rows dated on or before `as_of`.
    pub fn build(rows: &[DrawRow], rules: &GameRules, as_of: NaiveDate, cfg: &FeatureConfig) -> Self {
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.draw_date).collect();
        let weights = recency_weights(&dates, as_of, cfg.half_life_days);
        Self {
            n_rows: rows.len(),
            last_date: dates.last().copied(),
            white: BallFeatures::build(rows, &weights, rules, Ball::White, cfg),
            special: rules
                .has_special()
                .then(|| BallFeatures::build(rows, &weights, rules, Ball::Special, cfg)),
            pmi: PairPmi::from_rows(rows, rules),
        }
    }

    /// Days between the last row and `as_of`, if any row exists.
    pub fn staleness_days(&self, as_of: NaiveDate) -> Option<i64> {
        self.last_date.map(|d| (as_of - d).num_days())
    }
}
