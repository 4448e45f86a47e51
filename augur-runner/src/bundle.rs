//! Input and output bundles for lottery and screener runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use augur_core::agents::{AgentResult, EquityRow, Health};
use augur_core::domain::{ConfigError, GameRules, Pick, ProbabilitySurface};
use augur_core::explain::Explanation;
use augur_core::oracle::OracleSignals;
use augur_core::probability::{ProbabilityOptions, UserPriors};
use augur_core::selector::{Mode, Popularity, SelectorOptions};
use augur_core::temporal::{TemporalDiagnostics, TemporalParams};

use crate::orchestrator::Fused;

/// Run options shared by both products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub mode: Mode,
    /// Master seed; derived from entity and date when absent.
    pub seed: Option<u64>,
    /// Coupling strength; the latest `kappa.toml` value when absent.
    pub kappa: Option<f64>,
    pub dt_days: f64,
    pub dt0_days: f64,
    pub epsilon_days: f64,
    /// User chaos in [0, 1].
    pub chaos: f64,
    pub diversity_target: f64,
    pub n_picks: usize,
    pub synergy: bool,
    pub ev_dedupe: bool,
    pub popularity: Popularity,
    pub consensus_beta: f64,
    /// Optional probability steps (archetype, ensemble, retro memory, ...).
    pub probability: ProbabilityOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        let temporal = TemporalParams::default();
        let selector = SelectorOptions::default();
        Self {
            mode: Mode::Auto,
            seed: None,
            kappa: None,
            dt_days: temporal.dt_days,
            dt0_days: temporal.dt0_days,
            epsilon_days: temporal.epsilon_days,
            chaos: 0.0,
            diversity_target: selector.diversity_target,
            n_picks: selector.n_picks,
            synergy: selector.synergy,
            ev_dedupe: selector.ev_dedupe,
            popularity: selector.popularity,
            consensus_beta: selector.consensus_beta,
            probability: ProbabilityOptions::default(),
        }
    }
}

impl RunOptions {
    pub fn temporal(&self, kappa: f64) -> TemporalParams {
        TemporalParams {
            enabled: true,
            kappa,
            dt_days: self.dt_days,
            dt0_days: self.dt0_days,
            epsilon_days: self.epsilon_days,
        }
    }

    pub fn selector(&self) -> SelectorOptions {
        SelectorOptions {
            n_picks: self.n_picks,
            diversity_target: self.diversity_target,
            chaos: self.chaos,
            synergy: self.synergy,
            ev_dedupe: self.ev_dedupe,
            popularity: self.popularity,
            consensus_beta: self.consensus_beta,
        }
    }

    /// Probability options with the bundle's chaos applied.
    pub fn probability(&self) -> ProbabilityOptions {
        ProbabilityOptions {
            chaos: self.chaos,
            ..self.probability.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.selector().validate()?;
        self.probability().validate()?;
        self.temporal(self.kappa.unwrap_or(0.0)).validate()
    }
}

/// Seed used when the bundle carries none.
pub fn default_seed(entity: &str, as_of: NaiveDate) -> u64 {
    let hash = blake3::hash(format!("{entity}|{as_of}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Input bundle for one lottery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    pub entity_id: String,
    pub as_of: NaiveDate,
    pub rules: GameRules,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub user_priors: UserPriors,
    /// Advertised jackpot, read by the supervisor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jackpot: Option<f64>,
}

impl RunInputs {
    /// Inputs for a preset game with default options.
    pub fn for_game(game: &str, as_of: NaiveDate) -> Result<Self, ConfigError> {
        Ok(Self {
            entity_id: game.to_string(),
            as_of,
            rules: GameRules::preset(game)?,
            options: RunOptions::default(),
            user_priors: UserPriors::default(),
            jackpot: None,
        })
    }

    pub fn seed(&self) -> u64 {
        self.options
            .seed
            .unwrap_or_else(|| default_seed(&self.entity_id, self.as_of))
    }

    /// Fingerprint of everything except entity and date; the `prior` part of
    /// agent cache keys.
    pub fn prior_key(&self) -> String {
        let json = serde_json::to_string(&(&self.rules, &self.options, &self.user_priors, self.jackpot))
            .unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex()[..16].to_string()
    }
}

/// Input bundle for one screener run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenInputs {
    /// Archive entity for the run, e.g. the universe name.
    pub name: String,
    pub as_of: NaiveDate,
    pub universe: Vec<String>,
    /// Benchmark ticker; the configured one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
}

impl ScreenInputs {
    pub fn new(name: &str, as_of: NaiveDate, universe: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            as_of,
            universe,
            benchmark: None,
            options: RunOptions::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.options
            .seed
            .unwrap_or_else(|| default_seed(&self.name, self.as_of))
    }

    pub fn prior_key(&self) -> String {
        let json = serde_json::to_string(&(&self.benchmark, &self.options)).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex()[..16].to_string()
    }
}

/// `telemetry.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    pub oracle_gain: f64,
    pub diversity_score: f64,
    pub ev_score: f64,
    pub why_hints: Vec<String>,
    pub mode: String,
    pub diversity_fallback: bool,
    pub cap_high: f64,
    /// Fused `Combined` score of a lottery run.
    pub combined: Option<f64>,
    pub agent_scores: BTreeMap<String, f64>,
    pub temporal: Option<TemporalDiagnostics>,
    /// Data-shape and math fallbacks seen during the run.
    pub warnings: Vec<String>,
}

/// Output bundle of a lottery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryOutput {
    pub run_ts: String,
    pub entity: String,
    pub as_of: NaiveDate,
    pub picks: Vec<Pick>,
    pub probs: ProbabilitySurface,
    pub agents: Vec<AgentResult>,
    pub fused: Fused,
    pub y_base: f64,
    pub y_final: f64,
    pub telemetry: Telemetry,
    pub explain: Explanation,
    pub health: Health,
    pub oracle: OracleSignals,
    /// Archive directory, when the run was persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
}

/// One ranked screener row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub row: EquityRow,
    /// Probability before the temporal nudge.
    pub p_base: f64,
    pub agents: Vec<AgentResult>,
    pub fused: Fused,
    pub temporal: TemporalDiagnostics,
    pub explain: Explanation,
    pub health: Health,
}

impl RankedRow {
    pub fn ticker(&self) -> &str {
        &self.row.ticker
    }
}

/// Output bundle of a screener run, sorted by `Combined` descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenOutput {
    pub run_ts: String,
    pub name: String,
    pub as_of: NaiveDate,
    pub ranked: Vec<RankedRow>,
    pub telemetry: Telemetry,
    pub health: Health,
    pub oracle: OracleSignals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
}
