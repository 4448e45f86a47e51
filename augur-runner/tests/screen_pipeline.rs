//! Screener runs, calibration and κ autotuning over a temporary data
//! directory with synthetic bars.

use std::fs;

use chrono::{Duration, NaiveDate};

use augur_core::agents::{agent_names, HealthStatus};
use augur_core::domain::Bar;
use augur_core::temporal::{OutcomeRow, TemporalLogRow};
use augur_runner::archive::{self, FinalPicks, RecordedInputs};
use augur_runner::autotune::{self, Metric};
use augur_runner::calibrate::{self, CalibrateOptions};
use augur_runner::orchestrator::MULTIPLIER_FLOOR;
use augur_runner::{AugurConfig, Core, KappaFile, Replay, RunError, ScreenInputs};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn as_of() -> NaiveDate {
    start() + Duration::days(249)
}

fn bars(n: usize, close: impl Fn(usize) -> f64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let c = close(i);
            Bar {
                date: start() + Duration::days(i as i64),
                open: c * 0.995,
                high: c * 1.01,
                low: c * 0.985,
                close: c,
                volume: 1_000_000 + (i as u64 % 7) * 50_000,
            }
        })
        .collect()
}

/// Benchmark plus a rising, a flat and a falling ticker, 300 bars each.
fn seeded_core(dir: &std::path::Path) -> Core {
    let core = Core::new(AugurConfig::offline_at(dir)).unwrap();
    let store = core.store();
    store.append("SPY", &bars(300, |i| 400.0 + 0.1 * i as f64), &()).unwrap();
    store.append("UPUP", &bars(300, |i| 50.0 * 1.01f64.powi(i as i32 % 260)), &()).unwrap();
    store.append("FLAT", &bars(300, |i| 20.0 + 0.2 * ((i % 5) as f64 - 2.0)), &()).unwrap();
    store.append("DOWN", &bars(300, |i| 90.0 * 0.995f64.powi(i as i32)), &()).unwrap();
    core
}

fn inputs() -> ScreenInputs {
    let mut inputs = ScreenInputs::new(
        "test_universe",
        as_of(),
        vec!["DOWN".into(), "FLAT".into(), "UPUP".into()],
    );
    inputs.options.seed = Some(7);
    inputs
}

#[test]
fn rows_are_ranked_by_combined_score() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    let out = core.run_screen(&inputs()).unwrap();

    assert_eq!(out.ranked.len(), 3);
    for pair in out.ranked.windows(2) {
        assert!(pair[0].fused.combined >= pair[1].fused.combined);
    }
    let cap = out.telemetry.cap_high;
    for r in &out.ranked {
        assert!(r.fused.multiplier >= MULTIPLIER_FLOOR && r.fused.multiplier <= cap);
        assert!((0.0..=1.0).contains(&r.row.p_up));
        assert!((r.fused.base - 100.0 * r.row.p_up).abs() < 1e-9);
        let names: Vec<&str> = r.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, agent_names());
    }
    let up = out.ranked.iter().find(|r| r.ticker() == "UPUP").unwrap();
    let down = out.ranked.iter().find(|r| r.ticker() == "DOWN").unwrap();
    assert!(up.row.p_up > down.row.p_up);
    assert!((3..=5).contains(&out.telemetry.why_hints.len()));
}

#[test]
fn screen_archive_has_ranked_csv_and_replays() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    let out = core.run_screen(&inputs()).unwrap();
    let run_dir = out.run_dir.clone().expect("run archived");

    let csv = fs::read_to_string(run_dir.join(archive::RANKED_CSV)).unwrap();
    let header = csv.lines().next().unwrap();
    assert!(header.starts_with("Ticker,P_up,Combined_base,Combined,Multiplier,Label,Confidence"));
    assert_eq!(csv.lines().count(), 4);

    let record = archive::load_run(&run_dir).unwrap();
    let RecordedInputs::Screen(recorded) = &record.inputs else {
        panic!("expected screen inputs");
    };
    assert_eq!(recorded.benchmark.as_deref(), Some("SPY"));
    let FinalPicks::Screen(rows) = &record.picks else {
        panic!("expected screen picks");
    };
    let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
    let expected: Vec<&str> = out.ranked.iter().map(|r| r.ticker()).collect();
    assert_eq!(tickers, expected);

    let Replay::Screen(replayed) = core.replay(&run_dir).unwrap() else {
        panic!("expected screen replay");
    };
    let replayed_tickers: Vec<&str> = replayed.ranked.iter().map(|r| r.ticker()).collect();
    assert_eq!(replayed_tickers, expected);
    for (a, b) in replayed.ranked.iter().zip(&out.ranked) {
        assert_eq!(a.fused, b.fused);
    }

    let logs: Vec<TemporalLogRow> =
        archive::read_csv(&core.config().paths.temporal_logs_path()).unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.run_ts == out.run_ts));
}

#[test]
fn unknown_ticker_degrades_to_red_row() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    let mut inputs = inputs();
    inputs.universe.push("NOPE".into());

    let out = core.run_screen(&inputs).unwrap();
    assert_eq!(out.ranked.len(), 4);
    let nope = out.ranked.iter().find(|r| r.ticker() == "NOPE").unwrap();
    assert_eq!(nope.health.status, HealthStatus::Red);
    assert!((nope.row.p_up - 0.5).abs() < 1e-12);
    assert_eq!(out.health.status, HealthStatus::Red);
}

#[test]
fn invalid_universe_name_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    let mut inputs = inputs();
    inputs.name = "a/b".into();
    assert!(matches!(core.run_screen(&inputs), Err(RunError::Config(_))));
}

#[test]
fn calibration_labels_screen_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    core.run_screen(&inputs()).unwrap();

    let paths = &core.config().paths;
    let opts = CalibrateOptions::new(as_of() + Duration::days(10));
    let report =
        calibrate::run_calibration(paths, &core.config().calibration, core.store(), &opts).unwrap();
    assert_eq!(report.runs_scanned, 1);
    assert_eq!(report.samples, 3);
    assert_eq!(report.outcomes_written, 3);
    assert_eq!(report.bins.iter().map(|b| b.count).sum::<u64>(), 3);
    assert!((calibrate::CAP_MIN..=calibrate::CAP_MAX).contains(&report.cap_high));

    let outcomes: Vec<OutcomeRow> = archive::read_csv(&paths.outcomes_path()).unwrap();
    assert_eq!(outcomes.len(), 3);

    let again =
        calibrate::run_calibration(paths, &core.config().calibration, core.store(), &opts).unwrap();
    assert_eq!(again.outcomes_written, 0);
    let outcomes: Vec<OutcomeRow> = archive::read_csv(&paths.outcomes_path()).unwrap();
    assert_eq!(outcomes.len(), 3);
}

#[test]
fn autotune_ignores_runs_without_coupling() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    core.run_screen(&inputs()).unwrap();

    let paths = &core.config().paths;
    let opts = CalibrateOptions::new(as_of() + Duration::days(10));
    calibrate::run_calibration(paths, &core.config().calibration, core.store(), &opts).unwrap();

    let grid = autotune::linear_grid(-1.0e16, 1.0e16, 21);
    let tuned = autotune::autotune(paths, &grid, Metric::LogLoss).unwrap();
    assert!(tuned.is_none());
    assert!(!paths.kappa_path().exists());
}

#[test]
fn tuned_kappa_feeds_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let core = seeded_core(dir.path());
    KappaFile {
        kappa: 2.5e15,
        ..KappaFile::default()
    }
    .save(&core.config().paths.kappa_path())
    .unwrap();
    assert_eq!(core.kappa(), 2.5e15);

    let out = core.run_screen(&inputs()).unwrap();
    let record = archive::load_run(out.run_dir.as_ref().unwrap()).unwrap();
    let RecordedInputs::Screen(recorded) = &record.inputs else {
        panic!("expected screen inputs");
    };
    assert_eq!(recorded.options.kappa, Some(2.5e15));
}
