//! End-to-end lottery runs against a temporary data directory.

use std::collections::HashSet;
use std::fs;

use chrono::{Duration, NaiveDate};

use augur_core::agents::HealthStatus;
use augur_core::domain::{DrawRow, GameRules};
use augur_core::selector::Mode;
use augur_core::temporal::TemporalLogRow;
use augur_runner::archive::{self, FinalPicks, ModelProbs, RecordedInputs};
use augur_runner::calibrate::{append_cap_lock, CapLock};
use augur_runner::{AugurConfig, Core, Replay, RunError, RunInputs, RunOptions};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn core_in(dir: &std::path::Path) -> Core {
    Core::new(AugurConfig::offline_at(dir)).unwrap()
}

/// Sixty twice-weekly Powerball draws ending a few days before `as_of`.
fn powerball_history(rules: &GameRules) -> Vec<DrawRow> {
    let start = as_of() - Duration::days(3 + 59 * 3);
    (0..60u32)
        .map(|i| {
            let base = i % 13;
            DrawRow::new(
                start + Duration::days(i as i64 * 3),
                vec![base + 1, base + 14, base + 27, base + 40, 60 + (i % 9)],
                rules.clamp_special(i % 26 + 1),
            )
        })
        .collect()
}

fn seeded(game: &str) -> RunInputs {
    let mut inputs = RunInputs::for_game(game, as_of()).unwrap();
    inputs.options.seed = Some(42);
    inputs
}

#[test]
fn empty_history_yields_uniform_surface_and_unique_picks() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());

    let mut inputs = seeded("powerball");
    inputs.options.n_picks = 100;
    inputs.options.mode = Mode::MostLikely;
    assert_eq!(inputs.options.probability, RunOptions::default().probability);

    let out = core.run_lottery(&inputs).unwrap();
    assert_eq!(out.probs.white.len(), 69);
    for p in &out.probs.white {
        assert!((p - 1.0 / 69.0).abs() < 1e-12, "{p}");
    }
    assert_eq!(out.picks.len(), 100);
    assert!(out.picks.iter().all(|p| p.is_legal(&inputs.rules)));
    let keys: HashSet<_> = out.picks.iter().map(|p| p.key()).collect();
    assert_eq!(keys.len(), 100);
    assert_eq!(out.health.status, HealthStatus::Red);
    assert_eq!(out.telemetry.mode, "most_likely");
    assert!((3..=5).contains(&out.telemetry.why_hints.len()), "{:?}", out.telemetry.why_hints);
}

#[test]
fn zero_kappa_leaves_top_mass_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());
    let rules = GameRules::preset("powerball").unwrap();
    core.store()
        .append("powerball", &powerball_history(&rules), &rules)
        .unwrap();

    let mut inputs = seeded("powerball");
    inputs.options.kappa = Some(0.0);
    let out = core.run_lottery(&inputs).unwrap();

    assert_eq!(out.y_base.to_bits(), out.y_final.to_bits());
    let temporal = out.telemetry.temporal.unwrap();
    assert_eq!(temporal.delta, 0.0);
    assert_eq!(temporal.dt_k, 0.0);
    assert!((out.fused.base - 100.0 * out.y_final).abs() < 1e-9);
    out.probs.check(&rules).unwrap();
}

#[test]
fn same_seed_reproduces_picks_and_surface() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());
    let rules = GameRules::preset("powerball").unwrap();
    core.store()
        .append("powerball", &powerball_history(&rules), &rules)
        .unwrap();

    let inputs = seeded("powerball");
    let a = core.run_lottery(&inputs).unwrap();
    core.orchestrator().cache().clear();
    let b = core.run_lottery(&inputs).unwrap();

    assert_eq!(
        serde_json::to_string(&a.picks).unwrap(),
        serde_json::to_string(&b.picks).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&a.probs).unwrap(),
        serde_json::to_string(&b.probs).unwrap()
    );
    assert_eq!(a.agents, b.agents);
    assert_eq!(a.fused, b.fused);
}

#[test]
fn pick3_picks_allow_repeated_digits() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());

    let mut inputs = seeded("pick3");
    inputs.options.n_picks = 20;
    let out = core.run_lottery(&inputs).unwrap();

    assert_eq!(out.picks.len(), 20);
    for p in &out.picks {
        assert!(p.is_legal(&inputs.rules), "{p:?}");
        assert_eq!(p.white.len(), 3);
        assert_eq!(p.meta.get("replacement"), Some(&serde_json::Value::Bool(true)));
    }
}

#[test]
fn archived_run_replays_identically() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());
    let rules = GameRules::preset("powerball").unwrap();
    core.store()
        .append("powerball", &powerball_history(&rules), &rules)
        .unwrap();

    let out = core.run_lottery(&seeded("powerball")).unwrap();
    let run_dir = out.run_dir.clone().expect("run archived");
    for file in [
        archive::INPUTS,
        archive::ORACLE,
        archive::MODEL_PROBS,
        archive::FINAL_PICKS,
        archive::HEALTH,
        archive::TELEMETRY,
        archive::EXPLAIN,
    ] {
        assert!(run_dir.join(file).is_file(), "missing {file}");
    }

    let record = archive::load_run(&run_dir).unwrap();
    let RecordedInputs::Lottery(recorded) = &record.inputs else {
        panic!("expected lottery inputs");
    };
    assert_eq!(recorded.options.seed, Some(42));
    assert_eq!(recorded.options.kappa, Some(0.0));
    assert_eq!(record.picks, FinalPicks::Lottery(out.picks.clone()));
    assert_eq!(record.probs, ModelProbs::Lottery(out.probs.clone()));
    assert_eq!(
        archive::latest_run(&core.config().paths.runs_dir(), "powerball"),
        Some(run_dir.clone())
    );

    let Replay::Lottery(replayed) = core.replay(&run_dir).unwrap() else {
        panic!("expected lottery replay");
    };
    assert_eq!(replayed.picks, out.picks);
    assert_eq!(replayed.probs, out.probs);
    assert!(replayed.run_dir.is_none());
}

#[test]
fn run_appends_temporal_log_row() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());

    let mut inputs = seeded("mega_millions");
    inputs.options.kappa = Some(3.0e16);
    let out = core.run_lottery(&inputs).unwrap();

    let path = core.config().paths.temporal_logs_path();
    let header = fs::read_to_string(&path).unwrap();
    assert!(header.starts_with("run_ts,entity,y_base,y_final,delta_K,kappa,dt,dt0,Et,Et0"));
    let rows: Vec<TemporalLogRow> = archive::read_csv(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_ts, out.run_ts);
    assert_eq!(rows[0].entity, "mega_millions");
    assert_eq!(rows[0].kappa, 3.0e16);
    assert!((rows[0].delta_k - (out.y_final - out.y_base)).abs() < 1e-12);
}

#[test]
fn cap_lock_bounds_the_multiplier() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());
    append_cap_lock(&core.config().paths.calibration_dir(), &CapLock::new(true, 1.16)).unwrap();

    let out = core.run_lottery(&seeded("powerball")).unwrap();
    assert!((out.telemetry.cap_high - 1.16).abs() < 1e-12);
    assert!(out.fused.multiplier <= 1.16 + 1e-12);
    assert!(out.fused.multiplier >= 0.85 - 1e-12);
}

#[test]
fn cancelled_run_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());
    core.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);

    let err = core.run_lottery(&seeded("powerball")).unwrap_err();
    assert!(matches!(err, RunError::Cancelled));
    assert!(archive::list_runs(&core.config().paths.runs_dir()).is_empty());
    assert!(!core.config().paths.temporal_logs_path().exists());
}

#[test]
fn bad_configuration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let core = core_in(dir.path());

    let mut inputs = seeded("powerball");
    inputs.options.diversity_target = 0.95;
    assert!(matches!(core.run_lottery(&inputs), Err(RunError::Config(_))));

    let mut inputs = seeded("powerball");
    inputs.entity_id = "../escape".to_string();
    assert!(matches!(core.run_lottery(&inputs), Err(RunError::Config(_))));

    let mut inputs = seeded("powerball");
    inputs.rules.k_white = 0;
    assert!(matches!(core.run_lottery(&inputs), Err(RunError::Config(_))));
}
