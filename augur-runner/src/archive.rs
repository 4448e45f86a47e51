//! Run archive: one directory per run under `runs/<entity>/<ts>/`.
//!
//! Files: `inputs.json`, `oracle.json`, `model_probs.json`,
//! `final_picks.json`, `health.json`, `telemetry.json`, `explain.txt`, plus
//! `ranked.csv` for screener runs. Writes are best-effort: a failed file is
//! logged at `warn` and the run result is still returned.
//!
//! Also home of the append-only CSV helpers used for temporal logs,
//! outcomes, calibration bins and cap locks.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use augur_core::agents::{agent_names, Health};
use augur_core::domain::{Pick, ProbabilitySurface};
use augur_core::oracle::OracleSignals;

use crate::bundle::{RankedRow, RunInputs, ScreenInputs, Telemetry};
use crate::orchestrator::Label;

pub const INPUTS: &str = "inputs.json";
pub const ORACLE: &str = "oracle.json";
pub const MODEL_PROBS: &str = "model_probs.json";
pub const FINAL_PICKS: &str = "final_picks.json";
pub const HEALTH: &str = "health.json";
pub const TELEMETRY: &str = "telemetry.json";
pub const EXPLAIN: &str = "explain.txt";
pub const RANKED_CSV: &str = "ranked.csv";

/// Archive timestamp, sortable and path-safe.
pub fn run_ts_now() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedInputs {
    Lottery(RunInputs),
    Screen(ScreenInputs),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelProbs {
    Lottery(ProbabilitySurface),
    /// Ticker → P_up.
    Screen(BTreeMap<String, f64>),
}

/// Flat screener row as stored in `final_picks.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSummary {
    pub ticker: String,
    pub p_up: f64,
    pub combined_base: f64,
    pub combined: f64,
    pub multiplier: f64,
    pub label: Label,
    pub confidence: f64,
}

impl From<&RankedRow> for RankedSummary {
    fn from(r: &RankedRow) -> Self {
        Self {
            ticker: r.row.ticker.clone(),
            p_up: r.row.p_up,
            combined_base: r.fused.base,
            combined: r.fused.combined,
            multiplier: r.fused.multiplier,
            label: r.fused.label,
            confidence: r.fused.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalPicks {
    Lottery(Vec<Pick>),
    Screen(Vec<RankedSummary>),
}

/// Everything a run persisted. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub ts: String,
    pub entity: String,
    pub inputs: RecordedInputs,
    pub oracle: OracleSignals,
    pub probs: ModelProbs,
    pub picks: FinalPicks,
    pub health: Health,
    pub telemetry: Telemetry,
    pub explain: String,
}

impl RunRecord {
    pub fn agent_scores(&self) -> &BTreeMap<String, f64> {
        &self.telemetry.agent_scores
    }

    pub fn as_of(&self) -> chrono::NaiveDate {
        match &self.inputs {
            RecordedInputs::Lottery(i) => i.as_of,
            RecordedInputs::Screen(i) => i.as_of,
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize artifact")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Log and swallow a persistence failure.
fn best_effort(what: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(artifact = what, error = format!("{e:#}"), "archive write failed");
            false
        }
    }
}

/// Write a run directory. Returns the directory when it could be created;
/// individual file failures are logged only.
pub fn write_run(root: &Path, record: &RunRecord, ranked: Option<&[RankedRow]>) -> Option<PathBuf> {
    let dir = root.join(&record.entity).join(&record.ts);
    if let Err(e) = fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), error = %e, "cannot create run directory; run not archived");
        return None;
    }

    let mut ok = true;
    ok &= best_effort(INPUTS, write_json(&dir.join(INPUTS), &record.inputs));
    ok &= best_effort(ORACLE, write_json(&dir.join(ORACLE), &record.oracle));
    ok &= best_effort(MODEL_PROBS, write_json(&dir.join(MODEL_PROBS), &record.probs));
    ok &= best_effort(FINAL_PICKS, write_json(&dir.join(FINAL_PICKS), &record.picks));
    ok &= best_effort(HEALTH, write_json(&dir.join(HEALTH), &record.health));
    ok &= best_effort(TELEMETRY, write_json(&dir.join(TELEMETRY), &record.telemetry));
    ok &= best_effort(
        EXPLAIN,
        fs::write(dir.join(EXPLAIN), &record.explain)
            .with_context(|| format!("Failed to write {EXPLAIN}")),
    );
    if let Some(rows) = ranked {
        ok &= best_effort(RANKED_CSV, write_ranked_csv(&dir.join(RANKED_CSV), rows));
    }
    info!(dir = %dir.display(), complete = ok, "run archived");
    Some(dir)
}

/// Reassemble a RunRecord from its directory.
pub fn load_run(dir: &Path) -> Result<RunRecord> {
    let inputs: RecordedInputs = read_json(&dir.join(INPUTS))?;
    let (probs, picks) = match &inputs {
        RecordedInputs::Lottery(_) => (
            ModelProbs::Lottery(read_json(&dir.join(MODEL_PROBS))?),
            FinalPicks::Lottery(read_json(&dir.join(FINAL_PICKS))?),
        ),
        RecordedInputs::Screen(_) => (
            ModelProbs::Screen(read_json(&dir.join(MODEL_PROBS))?),
            FinalPicks::Screen(read_json(&dir.join(FINAL_PICKS))?),
        ),
    };
    let ts = dir
        .file_name()
        .and_then(|n| n.to_str())
        .context("Run directory has no timestamp component")?
        .to_string();
    let entity = dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .context("Run directory has no entity component")?
        .to_string();
    let explain = fs::read_to_string(dir.join(EXPLAIN)).unwrap_or_default();
    Ok(RunRecord {
        ts,
        entity,
        inputs,
        oracle: read_json(&dir.join(ORACLE))?,
        probs,
        picks,
        health: read_json(&dir.join(HEALTH))?,
        telemetry: read_json(&dir.join(TELEMETRY))?,
        explain,
    })
}

/// Every run directory under `root`, oldest first within each entity.
pub fn list_runs(root: &Path) -> Vec<PathBuf> {
    let mut runs = Vec::new();
    let Ok(entities) = fs::read_dir(root) else {
        return runs;
    };
    for entity in entities.flatten() {
        let Ok(stamps) = fs::read_dir(entity.path()) else {
            continue;
        };
        for stamp in stamps.flatten() {
            let path = stamp.path();
            if path.join(INPUTS).is_file() {
                runs.push(path);
            }
        }
    }
    runs.sort();
    runs
}

/// Most recent run directory for `entity`.
pub fn latest_run(root: &Path, entity: &str) -> Option<PathBuf> {
    list_runs(root)
        .into_iter()
        .filter(|p| {
            p.parent()
                .and_then(|e| e.file_name())
                .is_some_and(|n| n == entity)
        })
        .max_by(|a, b| a.file_name().cmp(&b.file_name()))
}

/// `ranked.csv`: fixed leading columns, then one score column per agent.
pub fn write_ranked_csv(path: &Path, rows: &[RankedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let agents = agent_names();
    let mut header = vec![
        "Ticker",
        "P_up",
        "Combined_base",
        "Combined",
        "Multiplier",
        "Label",
        "Confidence",
    ];
    header.extend(agents.iter().copied());
    writer.write_record(&header)?;

    for r in rows {
        let mut record = vec![
            r.row.ticker.clone(),
            format!("{:.6}", r.row.p_up),
            format!("{:.4}", r.fused.base),
            format!("{:.4}", r.fused.combined),
            format!("{:.6}", r.fused.multiplier),
            r.fused.label.as_str().to_string(),
            format!("{:.4}", r.fused.confidence),
        ];
        for name in &agents {
            let score = r
                .agents
                .iter()
                .find(|a| a.name == *name)
                .map(|a| a.score)
                .unwrap_or(0.0);
            record.push(format!("{score:.4}"));
        }
        writer.write_record(&record)?;
    }
    writer.flush().context("Failed to flush ranked.csv")?;
    Ok(())
}

/// Append rows to a CSV file, writing the header only for a new file.
pub fn append_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to append to {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// All rows of a CSV file; a missing file is empty. Unparsable rows are
/// skipped with a warning.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize() {
        match result {
            Ok(row) => rows.push(row),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "unparsable CSV rows skipped");
    }
    Ok(rows)
}

/// Best-effort append used on the run path.
pub fn append_log<T: Serialize>(path: &Path, rows: &[T]) {
    best_effort("csv log", append_csv(path, rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use augur_core::temporal::{OutcomeRow, TemporalLogRow};

    #[test]
    fn append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("outcomes.csv");
        let row = |ts: &str, label| OutcomeRow {
            run_ts: ts.to_string(),
            entity: "powerball".to_string(),
            label,
        };
        append_csv(&path, &[row("a", 1)]).unwrap();
        append_csv(&path, &[row("b", 0), row("c", 1)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("run_ts")).count(), 1);
        let back: Vec<OutcomeRow> = read_csv(&path).unwrap();
        assert_eq!(back, vec![row("a", 1), row("b", 0), row("c", 1)]);
    }

    #[test]
    fn temporal_log_header_uses_archive_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temporal_logs.csv");
        append_csv(
            &path,
            &[TemporalLogRow {
                run_ts: "t".to_string(),
                entity: "e".to_string(),
                y_base: 0.5,
                y_final: 0.5,
                delta_k: 0.0,
                kappa: 0.0,
                dt: 1.0,
                dt0: 7.0,
                et: 1.0,
                et0: 1.0,
            }],
        )
        .unwrap();
        let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert_eq!(header, "run_ts,entity,y_base,y_final,delta_K,kappa,dt,dt0,Et,Et0");
    }

    #[test]
    fn missing_csv_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<OutcomeRow> = read_csv(&dir.path().join("none.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn list_runs_finds_only_complete_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("powerball").join("20240101T000000000Z");
        let b = dir.path().join("powerball").join("20240102T000000000Z");
        let junk = dir.path().join("powerball").join("scratch");
        for d in [&a, &b, &junk] {
            fs::create_dir_all(d).unwrap();
        }
        fs::write(a.join(INPUTS), "{}").unwrap();
        fs::write(b.join(INPUTS), "{}").unwrap();

        assert_eq!(list_runs(dir.path()), vec![a, b.clone()]);
        assert_eq!(latest_run(dir.path(), "powerball"), Some(b));
        assert_eq!(latest_run(dir.path(), "cash_five"), None);
    }

    #[test]
    fn unwritable_root_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, "x").unwrap();
        let record = RunRecord {
            ts: "t".to_string(),
            entity: "e".to_string(),
            inputs: RecordedInputs::Screen(ScreenInputs::new(
                "e",
                chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                vec![],
            )),
            oracle: OracleSignals::neutral(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            probs: ModelProbs::Screen(BTreeMap::new()),
            picks: FinalPicks::Screen(vec![]),
            health: Health::default(),
            telemetry: Telemetry::default(),
            explain: String::new(),
        };
        assert!(write_run(&file, &record, None).is_none());
    }
}
