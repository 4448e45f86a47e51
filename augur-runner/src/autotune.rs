//! κ autotuner.
//!
//! Joins `temporal_logs.csv` with `outcomes.csv` on `(run_ts, entity)` and
//! replays each logged nudge at a candidate κ by linear rescale,
//! `delta(κ) = delta_used·κ/κ_used`. Rows logged with `κ_used = 0` carry no
//! slope and are skipped. The best κ on the chosen metric is written to
//! `kappa.toml`, which every run reads at start.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use augur_core::temporal::{OutcomeRow, TemporalLogRow};

use crate::archive;
use crate::config::{KappaFile, PathsConfig};

/// Probability clip for log-loss.
pub const LOG_LOSS_EPS: f64 = 1e-6;
pub const DEFAULT_GRID: (f64, f64) = (-5e16, 5e16);
pub const DEFAULT_GRID_STEPS: usize = 101;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    LogLoss,
    Auc,
    Mse,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::LogLoss => "log_loss",
            Metric::Auc => "auc",
            Metric::Mse => "mse",
        }
    }

    /// Lower is better for every metric's loss form (AUC is negated).
    fn loss(self, preds: &[f64], labels: &[u8]) -> f64 {
        match self {
            Metric::LogLoss => log_loss(preds, labels),
            Metric::Auc => -auc(preds, labels),
            Metric::Mse => mse(preds, labels),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "log_loss" | "logloss" => Ok(Metric::LogLoss),
            "auc" => Ok(Metric::Auc),
            "mse" => Ok(Metric::Mse),
            other => Err(format!("unknown metric '{other}' (expected log_loss, auc or mse)")),
        }
    }
}

pub fn log_loss(preds: &[f64], labels: &[u8]) -> f64 {
    if preds.is_empty() {
        return f64::NAN;
    }
    let total: f64 = preds
        .iter()
        .zip(labels)
        .map(|(p, y)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if *y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / preds.len() as f64
}

pub fn mse(preds: &[f64], labels: &[u8]) -> f64 {
    if preds.is_empty() {
        return f64::NAN;
    }
    preds
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - f64::from(*y)).powi(2))
        .sum::<f64>()
        / preds.len() as f64
}

/// Rank-based AUC with tie averaging; 0.5 when only one class is present.
pub fn auc(preds: &[f64], labels: &[u8]) -> f64 {
    let pos = labels.iter().filter(|y| **y == 1).count();
    let neg = labels.len() - pos;
    if pos == 0 || neg == 0 {
        return 0.5;
    }
    let mut order: Vec<usize> = (0..preds.len()).collect();
    order.sort_by(|&a, &b| preds[a].total_cmp(&preds[b]));

    let mut ranks = vec![0.0; preds.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && preds[order[j + 1]] == preds[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y == 1)
        .map(|(r, _)| r)
        .sum();
    (pos_rank_sum - (pos * (pos + 1)) as f64 / 2.0) / (pos * neg) as f64
}

/// One logged nudge with its realized label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub y_base: f64,
    pub delta_used: f64,
    pub kappa_used: f64,
    pub label: u8,
}

impl Sample {
    /// Prediction replayed at `kappa`, clipped to [0, 1].
    pub fn predict(&self, kappa: f64) -> f64 {
        (self.y_base + self.delta_used * kappa / self.kappa_used).clamp(0.0, 1.0)
    }
}

/// Inner join on `(run_ts, entity)`; the latest outcome for a key wins.
pub fn join(logs: &[TemporalLogRow], outcomes: &[OutcomeRow]) -> Vec<Sample> {
    let labels: HashMap<(&str, &str), u8> = outcomes
        .iter()
        .map(|o| ((o.run_ts.as_str(), o.entity.as_str()), o.label.min(1)))
        .collect();
    logs.iter()
        .filter(|l| l.kappa != 0.0 && l.kappa.is_finite())
        .filter(|l| l.y_base.is_finite() && l.delta_k.is_finite())
        .filter_map(|l| {
            let label = *labels.get(&(l.run_ts.as_str(), l.entity.as_str()))?;
            Some(Sample {
                y_base: l.y_base,
                delta_used: l.delta_k,
                kappa_used: l.kappa,
                label,
            })
        })
        .collect()
}

/// Loss of `samples` replayed at `kappa`.
pub fn evaluate(samples: &[Sample], kappa: f64, metric: Metric) -> f64 {
    let preds: Vec<f64> = samples.iter().map(|s| s.predict(kappa)).collect();
    let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();
    metric.loss(&preds, &labels)
}

/// `steps` evenly spaced values over `[lo, hi]`, always including 0 when the
/// range spans it.
pub fn linear_grid(lo: f64, hi: f64, steps: usize) -> Vec<f64> {
    let steps = steps.max(2);
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let mut grid: Vec<f64> = (0..steps)
        .map(|i| lo + (hi - lo) * i as f64 / (steps - 1) as f64)
        .collect();
    if lo < 0.0 && hi > 0.0 && !grid.contains(&0.0) {
        grid.push(0.0);
        grid.sort_by(f64::total_cmp);
    }
    grid
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuned {
    pub kappa: f64,
    /// Metric value at `kappa` (AUC reported as AUC, not negated).
    pub score: f64,
    pub samples: usize,
    pub metric: Metric,
}

/// Best κ on the grid. Ties go to the smaller |κ|.
pub fn scan(samples: &[Sample], grid: &[f64], metric: Metric) -> Option<Tuned> {
    if samples.is_empty() {
        return None;
    }
    let mut best: Option<(f64, f64)> = None;
    for &kappa in grid.iter().filter(|k| k.is_finite()) {
        let loss = evaluate(samples, kappa, metric);
        if !loss.is_finite() {
            continue;
        }
        let better = match best {
            None => true,
            Some((bk, bl)) => loss < bl || (loss == bl && kappa.abs() < bk.abs()),
        };
        if better {
            best = Some((kappa, loss));
        }
    }
    best.map(|(kappa, loss)| Tuned {
        kappa,
        score: if metric == Metric::Auc { -loss } else { loss },
        samples: samples.len(),
        metric,
    })
}

/// Read the logs, scan the grid and persist the winner to `kappa.toml`.
/// Returns `None` (and leaves `kappa.toml` alone) when nothing joins.
pub fn autotune(paths: &PathsConfig, grid: &[f64], metric: Metric) -> Result<Option<Tuned>> {
    let logs: Vec<TemporalLogRow> = archive::read_csv(&paths.temporal_logs_path())?;
    let outcomes: Vec<OutcomeRow> = archive::read_csv(&paths.outcomes_path())?;
    let samples = join(&logs, &outcomes);
    let skipped = logs.len() - samples.len();
    if skipped > 0 {
        info!(skipped, "log rows without an outcome or with κ_used = 0 skipped");
    }

    let Some(tuned) = scan(&samples, grid, metric) else {
        warn!(logs = logs.len(), outcomes = outcomes.len(), "no joined samples; kappa unchanged");
        return Ok(None);
    };
    KappaFile {
        kappa: tuned.kappa,
        metric: Some(metric.as_str().to_string()),
        score: Some(tuned.score),
        samples: Some(tuned.samples),
        updated: Some(Utc::now().to_rfc3339()),
    }
    .save(&paths.kappa_path())
    .context("Failed to persist kappa.toml")?;
    info!(kappa = tuned.kappa, metric = %metric, score = tuned.score, samples = tuned.samples, "kappa tuned");
    Ok(Some(tuned))
}
