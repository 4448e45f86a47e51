//! Calibrator: ridge weight fit over archived agent scores, reliability
//! binning against forward labels, and the dynamic agent-influence cap.
//!
//! Files under the calibration directory:
//! - `weights/<ts>.json` history plus `agent_weights.json` (latest)
//! - `calibration_bins.csv` (append-only CalibRow sets)
//! - `cap_lock.csv` (append-only; the latest row wins)
//! - `outcomes.csv` (labels joined by the κ autotuner)

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use augur_core::agents::agent_names;
use augur_core::domain::{Bar, DrawRow, GameRules};
use augur_core::history::HistoryStore;
use augur_core::temporal::OutcomeRow;

use crate::archive::{self, FinalPicks, ModelProbs, RecordedInputs, RunRecord, RANKED_CSV};
use crate::config::{CalibrationConfig, PathsConfig};
use crate::orchestrator::AgentWeights;

pub const CAP_MIN: f64 = 1.10;
pub const CAP_MAX: f64 = 1.18;
/// MAE at which the error term reaches zero.
pub const CAP_MAE_SCALE: f64 = 0.08;
/// Sample count at which the size term saturates.
pub const CAP_FULL_SAMPLES: f64 = 1000.0;
pub const BIN_EDGES: [f64; 8] = [0.0, 0.2, 0.4, 0.6, 0.7, 0.8, 0.9, 1.0];

pub const WEIGHTS_FILE: &str = "agent_weights.json";
pub const WEIGHTS_DIR: &str = "weights";
pub const BINS_FILE: &str = "calibration_bins.csv";
pub const CAP_LOCK_FILE: &str = "cap_lock.csv";

// ── Ranked CSV ───────────────────────────────────────────────────────

/// Design matrix read from a ranked CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTable {
    /// Agent score columns, in file order.
    pub agents: Vec<String>,
    pub ids: Vec<String>,
    /// `Combined_base`, else `Combined`, else `P_up·100`.
    pub target: Vec<f64>,
    /// One row of agent scores per id.
    pub scores: Vec<Vec<f64>>,
}

fn column(headers: &[String], names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(n))
    })
}

/// Read a ranked CSV. Rows with an unparsable target are skipped; a
/// missing agent score reads as 0.
pub fn read_ranked(path: &Path) -> Result<RankedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open ranked CSV {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("Ranked CSV has no header")?
        .iter()
        .map(str::to_string)
        .collect();

    let id_col = column(&headers, &["Ticker", "Id"]).context("Ranked CSV needs a Ticker or Id column")?;
    let (target_col, scale) = if let Some(c) = column(&headers, &["Combined_base"]) {
        (c, 1.0)
    } else if let Some(c) = column(&headers, &["Combined"]) {
        (c, 1.0)
    } else if let Some(c) = column(&headers, &["P_up"]) {
        (c, 100.0)
    } else {
        anyhow::bail!("Ranked CSV needs Combined_base, Combined or P_up");
    };
    let known = agent_names();
    let agent_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| known.iter().any(|k| *k == h.as_str()))
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut table = RankedTable {
        agents: agent_cols.iter().map(|(_, h)| h.clone()).collect(),
        ids: Vec::new(),
        target: Vec::new(),
        scores: Vec::new(),
    };
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let Some(target) = record
            .get(target_col)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
        else {
            continue;
        };
        table.ids.push(record.get(id_col).unwrap_or_default().to_string());
        table.target.push(target * scale);
        table.scores.push(
            agent_cols
                .iter()
                .map(|(i, _)| {
                    record
                        .get(*i)
                        .and_then(|v| v.parse::<f64>().ok())
                        .filter(|v| v.is_finite())
                        .unwrap_or(0.0)
                })
                .collect(),
        );
    }
    Ok(table)
}

// ── Ridge fit ────────────────────────────────────────────────────────

/// Solve `A·x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        let (pivot_row, pivot_b) = (a[col].clone(), b[col]);
        for row in col + 1..n {
            let f = a[row][col] / pivot_row[col];
            if f == 0.0 {
                continue;
            }
            for (cell, p) in a[row][col..].iter_mut().zip(&pivot_row[col..]) {
                *cell -= f * p;
            }
            b[row] -= f * pivot_b;
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Scale `weights` uniformly so their L1 norm is at most `cap`.
pub fn clip_l1(weights: &mut [f64], cap: f64) {
    let l1: f64 = weights.iter().map(|w| w.abs()).sum();
    if l1 > cap && l1 > 0.0 {
        let s = cap / l1;
        weights.iter_mut().for_each(|w| *w *= s);
    }
}

/// Ridge regression on standardized columns, rescaled back to raw score
/// units and L1-clipped. Constant columns get weight 0.
pub fn fit_ridge(x: &[Vec<f64>], y: &[f64], lambda: f64, l1_cap: f64) -> Option<Vec<f64>> {
    let n = y.len();
    let p = x.first().map(Vec::len)?;
    if n < 2 || x.len() != n {
        return None;
    }
    let mean = |j: usize| x.iter().map(|r| r[j]).sum::<f64>() / n as f64;
    let means: Vec<f64> = (0..p).map(mean).collect();
    let stds: Vec<f64> = (0..p)
        .map(|j| (x.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n as f64).sqrt())
        .collect();
    let active: Vec<usize> = (0..p).filter(|&j| stds[j] > 1e-12).collect();

    let mut beta = vec![0.0; p];
    if !active.is_empty() {
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let z: Vec<Vec<f64>> = x
            .iter()
            .map(|r| active.iter().map(|&j| (r[j] - means[j]) / stds[j]).collect())
            .collect();
        let q = active.len();
        let mut a = vec![vec![0.0; q]; q];
        let mut b = vec![0.0; q];
        for (row, yi) in z.iter().zip(y) {
            for i in 0..q {
                b[i] += row[i] * (yi - y_mean);
                for k in 0..q {
                    a[i][k] += row[i] * row[k];
                }
            }
        }
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += lambda;
        }
        let solved = solve(a, b)?;
        for (slot, &j) in active.iter().enumerate() {
            beta[j] = solved[slot] / stds[j];
        }
    }
    clip_l1(&mut beta, l1_cap);
    Some(beta)
}

/// Fit agent weights from a ranked table.
pub fn fit_weights(table: &RankedTable, cfg: &CalibrationConfig) -> Option<AgentWeights> {
    let beta = fit_ridge(&table.scores, &table.target, cfg.lambda, cfg.l1_cap)?;
    Some(AgentWeights {
        timestamp: Utc::now().to_rfc3339(),
        weights: table.agents.iter().cloned().zip(beta).collect(),
    })
}

/// Write `weights/<ts>.json` and replace `agent_weights.json`.
pub fn save_weights(dir: &Path, weights: &AgentWeights) -> Result<PathBuf> {
    let history = dir.join(WEIGHTS_DIR);
    fs::create_dir_all(&history)
        .with_context(|| format!("Failed to create {}", history.display()))?;
    let json = serde_json::to_string_pretty(weights).context("Failed to serialize weights")?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let versioned = history.join(format!("{stamp}.json"));
    fs::write(&versioned, &json)
        .with_context(|| format!("Failed to write {}", versioned.display()))?;

    let latest = dir.join(WEIGHTS_FILE);
    let tmp = dir.join(format!("{WEIGHTS_FILE}.tmp"));
    fs::write(&tmp, &json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &latest).with_context(|| format!("Failed to replace {}", latest.display()))?;
    Ok(latest)
}

// ── Reliability bins & cap ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibRow {
    pub bin_low: f64,
    pub bin_high: f64,
    pub count: u64,
    pub hit_rate: f64,
    pub metric: String,
    pub date: NaiveDate,
}

impl CalibRow {
    pub fn mid(&self) -> f64 {
        0.5 * (self.bin_low + self.bin_high)
    }
}

fn bin_index(score: f64) -> usize {
    let s = score.clamp(0.0, 1.0);
    let last = BIN_EDGES.len() - 2;
    (0..=last)
        .find(|&i| s < BIN_EDGES[i + 1])
        .unwrap_or(last)
}

/// Bin `(score ∈ [0,1], hit)` samples on `BIN_EDGES`. Every bin is emitted;
/// empty bins carry a zero hit rate.
pub fn reliability_bins(samples: &[(f64, bool)], metric: &str, date: NaiveDate) -> Vec<CalibRow> {
    let mut counts = [0u64; BIN_EDGES.len() - 1];
    let mut hits = [0u64; BIN_EDGES.len() - 1];
    for (score, hit) in samples.iter().filter(|(s, _)| s.is_finite()) {
        let i = bin_index(*score);
        counts[i] += 1;
        hits[i] += u64::from(*hit);
    }
    (0..counts.len())
        .map(|i| CalibRow {
            bin_low: BIN_EDGES[i],
            bin_high: BIN_EDGES[i + 1],
            count: counts[i],
            hit_rate: if counts[i] > 0 {
                hits[i] as f64 / counts[i] as f64
            } else {
                0.0
            },
            metric: metric.to_string(),
            date,
        })
        .collect()
}

/// `(N, MAE)` with `MAE = Σ|hit_rate − mid|·count / N`.
pub fn bins_error(bins: &[CalibRow]) -> (u64, f64) {
    let n: u64 = bins.iter().map(|b| b.count).sum();
    if n == 0 {
        return (0, f64::NAN);
    }
    let err: f64 = bins
        .iter()
        .map(|b| (b.hit_rate - b.mid()).abs() * b.count as f64)
        .sum();
    (n, err / n as f64)
}

/// `1.10 + 0.08·min(1, N/1000)·max(0, 1 − min(1, MAE/0.08))`, in [1.10, 1.18].
pub fn cap_from(n: u64, mae: f64) -> f64 {
    if n == 0 || !mae.is_finite() {
        return CAP_MIN;
    }
    let size_term = (n as f64 / CAP_FULL_SAMPLES).min(1.0);
    let error_term = (1.0 - (mae / CAP_MAE_SCALE).min(1.0)).max(0.0);
    (CAP_MIN + (CAP_MAX - CAP_MIN) * size_term * error_term).clamp(CAP_MIN, CAP_MAX)
}

pub fn dynamic_cap(bins: &[CalibRow]) -> f64 {
    let (n, mae) = bins_error(bins);
    cap_from(n, mae)
}

/// The most recently appended bin set: rows sharing the last row's date and
/// metric.
pub fn latest_bins(rows: &[CalibRow]) -> Vec<CalibRow> {
    let Some(last) = rows.last() else {
        return Vec::new();
    };
    rows.iter()
        .filter(|r| r.date == last.date && r.metric == last.metric)
        .cloned()
        .collect()
}

/// Manual cap override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapLock {
    pub enabled: bool,
    pub cap_high: f64,
    #[serde(default)]
    pub ts: String,
}

impl CapLock {
    pub fn new(enabled: bool, cap_high: f64) -> Self {
        Self {
            enabled,
            cap_high: cap_high.clamp(CAP_MIN, CAP_MAX),
            ts: Utc::now().to_rfc3339(),
        }
    }
}

pub fn read_cap_lock(dir: &Path) -> Result<Option<CapLock>> {
    Ok(archive::read_csv::<CapLock>(&dir.join(CAP_LOCK_FILE))?.pop())
}

pub fn append_cap_lock(dir: &Path, lock: &CapLock) -> Result<()> {
    archive::append_csv(&dir.join(CAP_LOCK_FILE), std::slice::from_ref(lock))
}

/// Cap in force: an enabled lock, else the dynamic cap of the latest bins,
/// else the floor. Unreadable files fall back to the floor.
pub fn current_cap(dir: &Path) -> f64 {
    match read_cap_lock(dir) {
        Ok(Some(lock)) if lock.enabled => return lock.cap_high.clamp(CAP_MIN, CAP_MAX),
        Ok(_) => {}
        Err(e) => warn!(error = format!("{e:#}"), "cap lock unreadable"),
    }
    match archive::read_csv::<CalibRow>(&dir.join(BINS_FILE)) {
        Ok(rows) => dynamic_cap(&latest_bins(&rows)),
        Err(e) => {
            warn!(error = format!("{e:#}"), "calibration bins unreadable");
            CAP_MIN
        }
    }
}

// ── Forward labels ───────────────────────────────────────────────────

/// Whether `max(high)` over the `horizon` bars after `idx` reaches
/// `close[idx]·(1 + target_pct/100)`. `None` until the full horizon exists.
pub fn forward_label(bars: &[Bar], idx: usize, horizon: usize, target_pct: f64) -> Option<bool> {
    if horizon == 0 || idx + horizon >= bars.len() {
        return None;
    }
    let close = bars[idx].close;
    if !(close.is_finite() && close > 0.0) {
        return None;
    }
    let threshold = close * (1.0 + target_pct / 100.0);
    let best = bars[idx + 1..=idx + horizon]
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(best >= threshold)
}

/// Any pick whose whites (and special, when the game has one) equal the draw.
pub fn lottery_exact_hit(picks: &[augur_core::domain::Pick], draw: &DrawRow, rules: &GameRules) -> bool {
    let mut drawn = draw.whites.clone();
    if !rules.ordered {
        drawn.sort_unstable();
    }
    picks.iter().any(|p| {
        let mut whites = p.white.clone();
        if !rules.ordered {
            whites.sort_unstable();
        }
        whites == drawn && (!rules.has_special() || p.special == draw.special)
    })
}

// ── Calibration job ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrateOptions {
    pub as_of: NaiveDate,
    pub lookback_days: i64,
    /// Forward window, in bars.
    pub horizon_days: usize,
    pub target_pct: f64,
}

impl CalibrateOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            lookback_days: 90,
            horizon_days: 5,
            target_pct: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub runs_scanned: usize,
    pub weights: Option<AgentWeights>,
    pub weights_path: Option<PathBuf>,
    pub bins: Vec<CalibRow>,
    pub samples: usize,
    pub cap_high: f64,
    pub outcomes_written: usize,
}

/// Label every archived run inside the lookback window, refit weights from
/// the newest ranked CSV, and append a fresh bin set.
pub fn run_calibration(
    paths: &PathsConfig,
    cfg: &CalibrationConfig,
    store: &HistoryStore,
    opts: &CalibrateOptions,
) -> Result<CalibrationReport> {
    let cal_dir = paths.calibration_dir();
    let since = opts.as_of - Duration::days(opts.lookback_days.max(0));

    let records: Vec<(PathBuf, RunRecord)> = archive::list_runs(&paths.runs_dir())
        .into_iter()
        .filter_map(|dir| match archive::load_run(&dir) {
            Ok(r) => Some((dir, r)),
            Err(e) => {
                warn!(dir = %dir.display(), error = format!("{e:#}"), "skipping unreadable run");
                None
            }
        })
        .filter(|(_, r)| r.as_of() >= since && r.as_of() <= opts.as_of)
        .collect();

    let labelled: BTreeSet<(String, String)> = archive::read_csv::<OutcomeRow>(&paths.outcomes_path())?
        .into_iter()
        .map(|o| (o.run_ts, o.entity))
        .collect();

    let mut samples: Vec<(f64, bool)> = Vec::new();
    let mut outcomes: Vec<OutcomeRow> = Vec::new();
    let mut newest_ranked: Option<(String, PathBuf)> = None;
    let mut bars_cache: HashMap<String, Vec<Bar>> = HashMap::new();

    for (dir, record) in &records {
        match (&record.inputs, &record.picks, &record.probs) {
            (RecordedInputs::Screen(inputs), FinalPicks::Screen(rows), _) => {
                let ranked = dir.join(RANKED_CSV);
                if ranked.is_file()
                    && newest_ranked.as_ref().map_or(true, |(ts, _)| record.ts > *ts)
                {
                    newest_ranked = Some((record.ts.clone(), ranked));
                }
                for row in rows {
                    let bars = bars_cache.entry(row.ticker.clone()).or_insert_with(|| {
                        store
                            .load::<Bar>(&row.ticker, &())
                            .map(|h| h.rows.to_vec())
                            .unwrap_or_default()
                    });
                    let idx = bars.partition_point(|b| b.date <= inputs.as_of);
                    let Some(idx) = idx.checked_sub(1) else { continue };
                    let Some(hit) = forward_label(bars, idx, opts.horizon_days, opts.target_pct) else {
                        continue;
                    };
                    samples.push(((row.combined / 100.0).clamp(0.0, 1.0), hit));
                    if !labelled.contains(&(record.ts.clone(), row.ticker.clone())) {
                        outcomes.push(OutcomeRow {
                            run_ts: record.ts.clone(),
                            entity: row.ticker.clone(),
                            label: u8::from(hit),
                        });
                    }
                }
            }
            (RecordedInputs::Lottery(inputs), FinalPicks::Lottery(picks), ModelProbs::Lottery(surface)) => {
                let history = match store.load::<DrawRow>(&inputs.entity_id, &inputs.rules) {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(entity = %inputs.entity_id, error = %e, "history unavailable for labels");
                        continue;
                    }
                };
                let Some(next) = history.rows.iter().find(|d| d.draw_date > inputs.as_of) else {
                    continue;
                };
                let y = record.telemetry.combined.unwrap_or_else(|| {
                    surface
                        .top_whites(&inputs.rules, inputs.rules.k_white)
                        .iter()
                        .map(|(_, p)| p)
                        .sum::<f64>()
                        * 100.0
                });
                samples.push((
                    (y / 100.0).clamp(0.0, 1.0),
                    lottery_exact_hit(picks, next, &inputs.rules),
                ));
                if !labelled.contains(&(record.ts.clone(), inputs.entity_id.clone())) {
                    let top = surface.top_whites(&inputs.rules, inputs.rules.k_white);
                    let any_top_hit = top.iter().any(|(v, _)| next.contains(*v));
                    outcomes.push(OutcomeRow {
                        run_ts: record.ts.clone(),
                        entity: inputs.entity_id.clone(),
                        label: u8::from(any_top_hit),
                    });
                }
            }
            _ => warn!(ts = %record.ts, "run record kinds disagree; skipped"),
        }
    }

    let (weights, weights_path) = match &newest_ranked {
        Some((_, path)) => {
            let table = read_ranked(path)?;
            match fit_weights(&table, cfg) {
                Some(w) => {
                    let saved = save_weights(&cal_dir, &w)?;
                    info!(rows = table.ids.len(), l1 = w.l1(), "agent weights fitted");
                    (Some(w), Some(saved))
                }
                None => {
                    warn!(rows = table.ids.len(), "not enough ranked rows to fit weights");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let bins = if samples.is_empty() {
        Vec::new()
    } else {
        let bins = reliability_bins(&samples, "combined", opts.as_of);
        archive::append_csv(&cal_dir.join(BINS_FILE), &bins)?;
        bins
    };
    archive::append_csv(&paths.outcomes_path(), &outcomes)?;

    let cap_high = current_cap(&cal_dir);
    info!(
        runs = records.len(),
        samples = samples.len(),
        outcomes = outcomes.len(),
        cap_high,
        "calibration complete"
    );
    Ok(CalibrationReport {
        runs_scanned: records.len(),
        weights,
        weights_path,
        bins,
        samples: samples.len(),
        cap_high,
        outcomes_written: outcomes.len(),
    })
}
