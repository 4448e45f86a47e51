//! Run pipeline: history → features → surface → temporal nudge → agents →
//! selection → fusion → explanation → archive.
//!
//! A run only fails on bad configuration or cancellation. Every data or
//! fetch problem degrades to a neutral value and shows up in `health` and
//! `telemetry.warnings`. A cancelled run writes nothing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use augur_core::agents::{
    oracle_gain, ops_health, resolve_mode, AgentContext, AgentResult, AgentRow, EquityRow, Health,
    HealthStatus, LotteryRow,
};
use augur_core::domain::{renormalize, Bar, ConfigError, DrawRow, GameRules, ProbabilitySurface};
use augur_core::explain::{explain_equity, explain_lottery, narrate, Explanation, LanguageModel};
use augur_core::features::{
    breakout_probability, gap_bonus_shifted, mean_interval_days, Ball, FeatureConfig, FeatureSnapshot,
};
use augur_core::history::{history_hash, HistoryStore, LoadedHistory};
use augur_core::indicators::TechnicalSnapshot;
use augur_core::oracle::{OracleHub, OracleSignals};
use augur_core::probability::{self, BuildInput};
use augur_core::rng::RngHierarchy;
use augur_core::selector::{self, SelectInput};
use augur_core::temporal::{self, finite_difference_vec, TemporalDiagnostics, TemporalLogRow, TemporalParams};

use crate::archive::{self, FinalPicks, ModelProbs, RankedSummary, RecordedInputs, RunRecord};
use crate::bundle::{LotteryOutput, RankedRow, RunInputs, ScreenInputs, ScreenOutput, Telemetry};
use crate::calibrate::{current_cap, WEIGHTS_FILE};
use crate::config::{AugurConfig, KappaFile};
use crate::orchestrator::{fuse, AgentWeights, CacheKey, Cancelled, Orchestrator};

/// Days of price history a relative-strength nudge is spread over.
const REL_STRENGTH_DAYS: f64 = 20.0;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run cancelled")]
    Cancelled,
}

impl From<Cancelled> for RunError {
    fn from(_: Cancelled) -> Self {
        RunError::Cancelled
    }
}

/// Result of re-running an archived record.
#[derive(Debug, Clone)]
pub enum Replay {
    Lottery(LotteryOutput),
    Screen(ScreenOutput),
}

/// Long-lived services shared by every run: history store, oracle hub,
/// agent pool and cache.
pub struct Core {
    config: AugurConfig,
    store: HistoryStore,
    oracle: OracleHub,
    orchestrator: Orchestrator,
    cancel: Arc<AtomicBool>,
    language_model: Option<Arc<dyn LanguageModel>>,
}

impl Core {
    pub fn new(config: AugurConfig) -> Result<Self> {
        let oracle = OracleHub::new(config.oracle.clone());
        Self::with_oracle(config, oracle)
    }

    pub fn with_oracle(config: AugurConfig, oracle: OracleHub) -> Result<Self> {
        let orchestrator = Orchestrator::new(
            config.orchestrator.threads,
            Duration::from_secs(config.orchestrator.cache_ttl_mins.saturating_mul(60)),
        )?;
        info!(
            threads = orchestrator.threads(),
            history = %config.paths.history_dir().display(),
            "core ready"
        );
        Ok(Self {
            store: HistoryStore::new(config.paths.history_dir()),
            config,
            oracle,
            orchestrator,
            cancel: Arc::new(AtomicBool::new(false)),
            language_model: None,
        })
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn config(&self) -> &AugurConfig {
        &self.config
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn oracle(&self) -> &OracleHub {
        &self.oracle
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Setting this flag aborts in-flight runs before anything is persisted.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Coupling strength from `kappa.toml`; 0 when absent or unreadable.
    pub fn kappa(&self) -> f64 {
        let path = self.config.paths.kappa_path();
        match KappaFile::load(&path) {
            Ok(k) if k.kappa.is_finite() => k.kappa,
            Ok(k) => {
                warn!(kappa = k.kappa, "non-finite kappa ignored");
                0.0
            }
            Err(e) => {
                warn!(error = %e, "kappa unreadable; temporal correction disabled");
                0.0
            }
        }
    }

    fn weights(&self) -> AgentWeights {
        AgentWeights::load_or_neutral(&self.config.paths.calibration_dir().join(WEIGHTS_FILE))
    }

    fn narrate(&self, explanation: &mut Explanation) {
        if let Some(model) = &self.language_model {
            narrate(explanation, model.as_ref());
        }
    }

    // ── Lottery ──────────────────────────────────────────────────────

    /// Suggest picks for one game as of `inputs.as_of`.
    pub fn run_lottery(&self, inputs: &RunInputs) -> Result<LotteryOutput, RunError> {
        self.lottery(inputs, None, true)
    }

    fn lottery(
        &self,
        inputs: &RunInputs,
        recorded: Option<&OracleSignals>,
        persist: bool,
    ) -> Result<LotteryOutput, RunError> {
        inputs.rules.validate()?;
        inputs.options.validate()?;
        self.store
            .entity_path(&inputs.entity_id)
            .map_err(|_| ConfigError::InvalidEntity(inputs.entity_id.clone()))?;

        let entity = inputs.entity_id.as_str();
        let as_of = inputs.as_of;
        let seed = inputs.seed();
        let kappa = inputs.options.kappa.unwrap_or_else(|| self.kappa());
        let params = inputs.options.temporal(kappa);
        params.validate()?;
        let rng = RngHierarchy::new(seed);
        let run_ts = archive::run_ts_now();
        info!(entity, %as_of, seed, kappa, "lottery run started");

        let signals = match recorded {
            Some(s) => s.clone(),
            None => self.oracle.signals(as_of),
        };

        let mut health = Health::default();
        let mut warnings = Vec::new();
        let history = self.draw_history(entity, &inputs.rules, &mut health, &mut warnings);
        let rows = history.up_to(as_of);

        let feature_cfg = &self.config.features;
        let features = FeatureSnapshot::build(rows, &inputs.rules, as_of, feature_cfg);
        let options = inputs.options.probability();
        let built = probability::build(&BuildInput {
            entity,
            as_of,
            rules: &inputs.rules,
            rows,
            features: &features,
            signals: &signals,
            priors: &inputs.user_priors,
            options: &options,
            rng: &rng,
        });
        for w in &built.warnings {
            health.flag(HealthStatus::Yellow, w.clone());
        }
        warnings.extend(built.warnings.iter().cloned());

        let (surface, y_base, y_final, diagnostics) = nudge_surface(
            &built.surface,
            rows,
            &inputs.rules,
            &features,
            feature_cfg,
            &params,
            as_of,
        );
        debug!(entity, y_base, y_final, delta = diagnostics.delta, "temporal correction applied");

        let row = LotteryRow {
            game: entity,
            rules: &inputs.rules,
            surface: &surface,
            features: &features,
            chaos: built.chaos,
            n_picks: inputs.options.n_picks,
            jackpot: inputs.jackpot,
            popularity: inputs.options.popularity,
        };
        let ctx = AgentContext {
            entity,
            as_of,
            signals: &signals,
            rng: &rng,
            mode: inputs.options.mode,
            max_staleness_days: self.config.orchestrator.max_staleness_days,
        };
        let key = CacheKey {
            entity: entity.to_string(),
            as_of,
            prior: format!("{}:{kappa}", inputs.prior_key()),
            hist_hash: history_hash(rows),
        };
        let agents = self.orchestrator.score_row(
            &AgentRow::Lottery(row.clone()),
            &ctx,
            Some(&key),
            Some(self.cancel.as_ref()),
        )?;

        let (mode, reason) = resolve_mode(inputs.options.mode, &signals, inputs.jackpot);
        debug!(entity, mode = mode.label(), reason, "mode resolved");
        let selector_opts = inputs.options.selector();
        let selection = selector::select(&SelectInput {
            entity,
            surface: &surface,
            rules: &inputs.rules,
            pmi: Some(&features.pmi),
            options: &selector_opts,
            mode,
            rng: &rng,
        });
        if selection.diversity_fallback {
            warnings.push(format!(
                "diversity target {:.2} not reached; best-effort picks",
                selector_opts.diversity_target
            ));
        }

        let cal_dir = self.config.paths.calibration_dir();
        let cap_high = current_cap(&cal_dir);
        let fused = fuse(100.0 * y_final, &agents, &self.weights(), cap_high);

        let mut explanation = explain_lottery(&row, &signals);
        explanation.add_hint(format!("mode {}", selection.mode.label()));
        self.narrate(&mut explanation);
        health.merge(ops_health::assess_lottery(&row, &ctx));

        let telemetry = Telemetry {
            oracle_gain: oracle_gain(&signals),
            diversity_score: selection.diversity_score,
            ev_score: selection.ev_score,
            why_hints: explanation.why_hints(),
            mode: selection.mode.label().to_string(),
            diversity_fallback: selection.diversity_fallback,
            cap_high,
            combined: Some(fused.combined),
            agent_scores: score_map(&agents),
            temporal: Some(diagnostics),
            warnings,
        };

        if self.cancelled() {
            warn!(entity, "lottery run cancelled before persistence");
            return Err(RunError::Cancelled);
        }

        let mut output = LotteryOutput {
            run_ts,
            entity: entity.to_string(),
            as_of,
            picks: selection.picks,
            probs: surface,
            agents,
            fused,
            y_base,
            y_final,
            telemetry,
            explain: explanation,
            health,
            oracle: signals,
            run_dir: None,
        };

        if persist && self.config.paths.archive {
            let mut recorded_inputs = inputs.clone();
            recorded_inputs.options.seed = Some(seed);
            recorded_inputs.options.kappa = Some(kappa);
            let record = RunRecord {
                ts: output.run_ts.clone(),
                entity: output.entity.clone(),
                inputs: RecordedInputs::Lottery(recorded_inputs),
                oracle: output.oracle.clone(),
                probs: ModelProbs::Lottery(output.probs.clone()),
                picks: FinalPicks::Lottery(output.picks.clone()),
                health: output.health.clone(),
                telemetry: output.telemetry.clone(),
                explain: output.explain.to_text(),
            };
            output.run_dir = archive::write_run(&self.config.paths.runs_dir(), &record, None);
            archive::append_log(
                &self.config.paths.temporal_logs_path(),
                &[log_row(&output.run_ts, entity, y_base, y_final, &params, &diagnostics)],
            );
        }

        info!(
            entity,
            picks = output.picks.len(),
            combined = output.fused.combined,
            health = ?output.health.status,
            "lottery run finished"
        );
        Ok(output)
    }

    fn draw_history(
        &self,
        entity: &str,
        rules: &GameRules,
        health: &mut Health,
        warnings: &mut Vec<String>,
    ) -> LoadedHistory<DrawRow> {
        match self.store.load::<DrawRow>(entity, rules) {
            Ok(h) => {
                if h.dropped > 0 {
                    health.flag(
                        HealthStatus::Yellow,
                        format!("{} history rows dropped", h.dropped),
                    );
                }
                warnings.extend(h.warnings.iter().cloned());
                h
            }
            Err(e) => {
                warn!(entity, error = %e, "draw history unavailable");
                health.flag(HealthStatus::Red, format!("draw history unavailable: {e}"));
                warnings.push(e.to_string());
                LoadedHistory {
                    rows: Arc::new(Vec::new()),
                    dropped: 0,
                    warnings: Vec::new(),
                }
            }
        }
    }

    // ── Screener ─────────────────────────────────────────────────────

    /// Rank a universe of tickers by fused breakout score.
    pub fn run_screen(&self, inputs: &ScreenInputs) -> Result<ScreenOutput, RunError> {
        self.screen(inputs, None, true)
    }

    fn screen(
        &self,
        inputs: &ScreenInputs,
        recorded: Option<&OracleSignals>,
        persist: bool,
    ) -> Result<ScreenOutput, RunError> {
        self.store
            .entity_path(&inputs.name)
            .map_err(|_| ConfigError::InvalidEntity(inputs.name.clone()))?;
        inputs.options.validate()?;

        let as_of = inputs.as_of;
        let seed = inputs.seed();
        let kappa = inputs.options.kappa.unwrap_or_else(|| self.kappa());
        let params = inputs.options.temporal(kappa);
        params.validate()?;
        let rng = RngHierarchy::new(seed);
        let run_ts = archive::run_ts_now();
        info!(name = %inputs.name, %as_of, tickers = inputs.universe.len(), kappa, "screen run started");

        let signals = match recorded {
            Some(s) => s.clone(),
            None => self.oracle.signals(as_of),
        };

        let mut health = Health::default();
        for source in &signals.missing {
            health.flag(HealthStatus::Yellow, format!("oracle source unavailable: {source}"));
        }
        let mut warnings = Vec::new();

        let benchmark_ticker = inputs
            .benchmark
            .clone()
            .unwrap_or_else(|| self.config.orchestrator.benchmark.clone());
        let benchmark = match self.store.load::<Bar>(&benchmark_ticker, &()) {
            Ok(h) => h.up_to(as_of).to_vec(),
            Err(e) => {
                warn!(benchmark = %benchmark_ticker, error = %e, "benchmark bars unavailable");
                warnings.push(format!("benchmark {benchmark_ticker}: {e}"));
                Vec::new()
            }
        };
        // Benchmark bars feed relative strength, so they are part of every
        // row's cache identity.
        let prior = screen_prior(&inputs.prior_key(), kappa, &benchmark_ticker, &benchmark);

        let weights = self.weights();
        let cap_high = current_cap(&self.config.paths.calibration_dir());
        let mut ranked = Vec::with_capacity(inputs.universe.len());

        for ticker in &inputs.universe {
            let mut row_health = Health::default();
            let bars: Vec<Bar> = match self.store.load::<Bar>(ticker, &()) {
                Ok(h) => {
                    if h.dropped > 0 {
                        row_health.flag(
                            HealthStatus::Yellow,
                            format!("{ticker}: {} bars dropped", h.dropped),
                        );
                    }
                    h.up_to(as_of).to_vec()
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "bars unavailable");
                    row_health.flag(HealthStatus::Red, format!("{ticker}: {e}"));
                    Vec::new()
                }
            };

            let snapshot = if bars.is_empty() {
                TechnicalSnapshot::empty()
            } else {
                TechnicalSnapshot::from_bars(&bars, &benchmark)
            };
            let p_base = breakout_probability(&snapshot);
            let dydt = p_up_sensitivity(p_base, snapshot.rel_benchmark);
            let (p_final, diagnostics) = temporal::apply_scalar(p_base, dydt, &params);

            let row = EquityRow {
                ticker: ticker.clone(),
                p_up: p_final,
                snapshot,
            };
            let ctx = AgentContext {
                entity: ticker,
                as_of,
                signals: &signals,
                rng: &rng,
                mode: inputs.options.mode,
                max_staleness_days: self.config.orchestrator.max_staleness_days,
            };
            let key = CacheKey {
                entity: ticker.clone(),
                as_of,
                prior: prior.clone(),
                hist_hash: history_hash(&bars),
            };
            let agents =
                self.orchestrator
                    .score_row(&AgentRow::Equity(&row), &ctx, Some(&key), Some(self.cancel.as_ref()))?;

            let fused = fuse(100.0 * p_final, &agents, &weights, cap_high);
            let mut explanation = explain_equity(&row);
            self.narrate(&mut explanation);
            row_health.merge(ops_health::assess_equity(&row));

            ranked.push(RankedRow {
                row,
                p_base,
                agents,
                fused,
                temporal: diagnostics,
                explain: explanation,
                health: row_health,
            });
        }

        ranked.sort_by(|a, b| {
            b.fused
                .combined
                .total_cmp(&a.fused.combined)
                .then_with(|| a.ticker().cmp(b.ticker()))
        });
        for r in &ranked {
            health.merge(r.health.clone());
        }

        let telemetry = Telemetry {
            oracle_gain: oracle_gain(&signals),
            why_hints: ranked
                .first()
                .map(|r| r.explain.why_hints())
                .unwrap_or_default(),
            mode: inputs.options.mode.label().to_string(),
            cap_high,
            agent_scores: mean_scores(&ranked),
            warnings,
            ..Telemetry::default()
        };

        if self.cancelled() {
            warn!(name = %inputs.name, "screen run cancelled before persistence");
            return Err(RunError::Cancelled);
        }

        let mut output = ScreenOutput {
            run_ts,
            name: inputs.name.clone(),
            as_of,
            ranked,
            telemetry,
            health,
            oracle: signals,
            run_dir: None,
        };

        if persist && self.config.paths.archive {
            let mut recorded_inputs = inputs.clone();
            recorded_inputs.options.seed = Some(seed);
            recorded_inputs.options.kappa = Some(kappa);
            recorded_inputs.benchmark = Some(benchmark_ticker);
            let record = RunRecord {
                ts: output.run_ts.clone(),
                entity: output.name.clone(),
                inputs: RecordedInputs::Screen(recorded_inputs),
                oracle: output.oracle.clone(),
                probs: ModelProbs::Screen(
                    output
                        .ranked
                        .iter()
                        .map(|r| (r.row.ticker.clone(), r.row.p_up))
                        .collect(),
                ),
                picks: FinalPicks::Screen(output.ranked.iter().map(RankedSummary::from).collect()),
                health: output.health.clone(),
                telemetry: output.telemetry.clone(),
                explain: screen_text(&output.ranked),
            };
            output.run_dir =
                archive::write_run(&self.config.paths.runs_dir(), &record, Some(&output.ranked));
            let logs: Vec<TemporalLogRow> = output
                .ranked
                .iter()
                .map(|r| log_row(&output.run_ts, r.ticker(), r.p_base, r.row.p_up, &params, &r.temporal))
                .collect();
            archive::append_log(&self.config.paths.temporal_logs_path(), &logs);
        }

        info!(
            name = %output.name,
            rows = output.ranked.len(),
            top = output.ranked.first().map(|r| r.ticker()).unwrap_or("-"),
            health = ?output.health.status,
            "screen run finished"
        );
        Ok(output)
    }

    // ── Replay ───────────────────────────────────────────────────────

    /// Re-run an archived record with its recorded inputs and oracle
    /// signals. Nothing is persisted.
    pub fn replay(&self, dir: &Path) -> Result<Replay> {
        let record = archive::load_run(dir)
            .with_context(|| format!("Failed to load run {}", dir.display()))?;
        info!(dir = %dir.display(), "replaying run");
        match &record.inputs {
            RecordedInputs::Lottery(inputs) => Ok(Replay::Lottery(
                self.lottery(inputs, Some(&record.oracle), false)
                    .context("Replay failed")?,
            )),
            RecordedInputs::Screen(inputs) => Ok(Replay::Screen(
                self.screen(inputs, Some(&record.oracle), false)
                    .context("Replay failed")?,
            )),
        }
    }
}

/// Apply the temporal correction to the white distribution.
///
/// `y` is the mass of the `k_white` most likely whites before the nudge;
/// `y_final` the mass of the same whites after it. With `κ = 0` the surface
/// is returned unchanged.
fn nudge_surface(
    surface: &ProbabilitySurface,
    rows: &[DrawRow],
    rules: &GameRules,
    features: &FeatureSnapshot,
    cfg: &FeatureConfig,
    params: &TemporalParams,
    as_of: NaiveDate,
) -> (ProbabilitySurface, f64, f64, TemporalDiagnostics) {
    let top: Vec<usize> = surface
        .top_whites(rules, rules.k_white)
        .iter()
        .filter_map(|(v, _)| rules.white_index(*v))
        .collect();
    let mass = |w: &[f64]| top.iter().map(|&i| w[i]).sum::<f64>();
    let y_base = mass(&surface.white);

    let t0 = features.staleness_days(as_of).unwrap_or(0).max(0) as f64;
    let dydt = white_sensitivity(rows, rules, features, cfg, t0, params.epsilon_days);
    let (white, diagnostics) = temporal::apply_vector(&surface.white, &dydt, params);
    let y_final = mass(&white);

    let nudged = ProbabilitySurface {
        white,
        special: surface.special.clone(),
    };
    (nudged, y_base, y_final, diagnostics)
}

/// `d/dt` of the normalized frequency-times-gap shape, with `t` in days
/// since the last draw.
fn white_sensitivity(
    rows: &[DrawRow],
    rules: &GameRules,
    features: &FeatureSnapshot,
    cfg: &FeatureConfig,
    t0: f64,
    eps: f64,
) -> Vec<f64> {
    let interval = mean_interval_days(rows);
    let shape = |t: f64| {
        let gap = gap_bonus_shifted(
            rows,
            rules,
            Ball::White,
            cfg.gap_strength,
            cfg.gap_ceiling,
            t / interval,
        );
        let mut w: Vec<f64> = features
            .white
            .blend
            .iter()
            .zip(&gap)
            .map(|(b, g)| (b + 1.0) * g)
            .collect();
        renormalize(&mut w);
        w
    };
    finite_difference_vec(shape, t0, eps)
}

/// `dP/dt` of the logistic breakout probability, driven by relative
/// strength spread over the lookback.
fn p_up_sensitivity(p: f64, rel_benchmark: f64) -> f64 {
    let rel = if rel_benchmark.is_finite() { rel_benchmark } else { 0.0 };
    p * (1.0 - p) * rel / REL_STRENGTH_DAYS
}

/// Cache `prior` for screener rows: options, κ and the benchmark snapshot.
fn screen_prior(prior_key: &str, kappa: f64, benchmark: &str, bars: &[Bar]) -> String {
    format!("{prior_key}:{kappa}:{benchmark}:{}", history_hash(bars))
}

fn log_row(
    run_ts: &str,
    entity: &str,
    y_base: f64,
    y_final: f64,
    params: &TemporalParams,
    diagnostics: &TemporalDiagnostics,
) -> TemporalLogRow {
    TemporalLogRow {
        run_ts: run_ts.to_string(),
        entity: entity.to_string(),
        y_base,
        y_final,
        delta_k: y_final - y_base,
        kappa: params.kappa,
        dt: params.dt_days,
        dt0: params.dt0_days,
        et: diagnostics.et,
        et0: diagnostics.et0,
    }
}

fn score_map(results: &[AgentResult]) -> BTreeMap<String, f64> {
    results.iter().map(|r| (r.name.clone(), r.score)).collect()
}

fn mean_scores(ranked: &[RankedRow]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for r in ranked {
        for a in &r.agents {
            let e = sums.entry(a.name.clone()).or_insert((0.0, 0));
            e.0 += a.score;
            e.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, n))| (name, sum / n.max(1) as f64))
        .collect()
}

fn screen_text(ranked: &[RankedRow]) -> String {
    ranked
        .iter()
        .map(|r| {
            format!(
                "{} {:.1} {}\n{}",
                r.ticker(),
                r.fused.combined,
                r.fused.label.as_str(),
                r.explain.to_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn p_up_nudge_follows_relative_strength() {
        assert!(p_up_sensitivity(0.5, 0.04) > 0.0);
        assert!(p_up_sensitivity(0.5, -0.04) < 0.0);
        assert_eq!(p_up_sensitivity(0.5, f64::NAN), 0.0);
        assert_eq!(p_up_sensitivity(1.0, 0.5), 0.0);
    }

    #[test]
    fn white_sensitivity_sums_to_zero() {
        let rules = GameRules::simple(1, 10, 2);
        let rows: Vec<DrawRow> = (1..=8)
            .map(|i| DrawRow::new(d(i), vec![1 + (i % 3), 5 + (i % 4)], None))
            .collect();
        let cfg = FeatureConfig::default();
        let features = FeatureSnapshot::build(&rows, &rules, d(8), &cfg);
        let dydt = white_sensitivity(&rows, &rules, &features, &cfg, 1.0, 0.5);
        assert_eq!(dydt.len(), 10);
        assert!(dydt.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn zero_kappa_leaves_surface_untouched() {
        let rules = GameRules::simple(1, 10, 2);
        let rows: Vec<DrawRow> = (1..=8)
            .map(|i| DrawRow::new(d(i), vec![1 + (i % 3), 5 + (i % 4)], None))
            .collect();
        let cfg = FeatureConfig::default();
        let features = FeatureSnapshot::build(&rows, &rules, d(10), &cfg);
        let mut surface = ProbabilitySurface::uniform(&rules);
        surface.white[0] = 0.3;
        renormalize(&mut surface.white);
        let params = TemporalParams {
            kappa: 0.0,
            ..TemporalParams::default()
        };
        let (nudged, y_base, y_final, diag) =
            nudge_surface(&surface, &rows, &rules, &features, &cfg, &params, d(10));
        assert_eq!(nudged, surface);
        assert_eq!(y_base.to_bits(), y_final.to_bits());
        assert_eq!(diag.delta, 0.0);
    }

    #[test]
    fn screen_prior_tracks_benchmark_bars() {
        let bar = |day: u32, close: f64| Bar {
            date: d(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        };
        let before = vec![bar(1, 100.0), bar(2, 101.0)];
        let mut after = before.clone();
        after.push(bar(3, 102.0));

        let a = screen_prior("k", 0.0, "SPY", &before);
        assert_eq!(a, screen_prior("k", 0.0, "SPY", &before));
        assert_ne!(a, screen_prior("k", 0.0, "SPY", &after));
        assert_ne!(a, screen_prior("k", 0.0, "QQQ", &before));
        assert_ne!(a, screen_prior("k", 1.0, "SPY", &before));
    }

    #[test]
    fn log_row_records_the_applied_delta() {
        let params = TemporalParams {
            kappa: 2.0,
            ..TemporalParams::default()
        };
        let diag = TemporalDiagnostics {
            et: 1.0,
            et0: 2.0,
            dt_k: 0.5,
            delta: 0.1,
        };
        let row = log_row("20240301T000000000Z", "powerball", 0.2, 0.25, &params, &diag);
        assert!((row.delta_k - 0.05).abs() < 1e-12);
        assert_eq!(row.kappa, 2.0);
        assert_eq!(row.et0, 2.0);
    }
}
