//! Agent registry.
//!
//! Agents are plain functions `(row, context) → AgentResult`, listed in a
//! static table sorted by name. The registry wrapper turns errors and panics
//! into `score=0, detail="error: …"`, so callers never see a failure.
//! An agent that has nothing to say about a row kind returns a neutral
//! `score=0, detail="n/a"`.

pub mod ev_popularity;
pub mod explainer;
pub mod monte_carlo;
pub mod ops_health;
pub mod oracle;
pub mod pattern;
pub mod sentiment;
pub mod supervisor;
pub mod technicals;
pub mod volatility;

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ops_health::{Health, HealthStatus};
pub use oracle::oracle_gain;
pub use supervisor::resolve_mode;

use crate::domain::{GameRules, ProbabilitySurface};
use crate::features::FeatureSnapshot;
use crate::indicators::TechnicalSnapshot;
use crate::oracle::OracleSignals;
use crate::rng::RngHierarchy;
use crate::selector::{Mode, Popularity};

/// Scores are clamped to `[-SCORE_LIMIT, SCORE_LIMIT]`.
pub const SCORE_LIMIT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub name: String,
    pub score: f64,
    pub detail: String,
}

impl AgentResult {
    /// Clamped result; a non-finite score becomes 0.
    pub fn new(name: &str, score: f64, detail: impl Into<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(-SCORE_LIMIT, SCORE_LIMIT)
        } else {
            0.0
        };
        Self {
            name: name.to_string(),
            score,
            detail: detail.into(),
        }
    }

    pub fn not_applicable(name: &str) -> Self {
        Self::new(name, 0.0, "n/a")
    }

    pub fn error(name: &str, message: &str) -> Self {
        Self::new(name, 0.0, format!("error: {message}"))
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Lottery run context scored as a single row.
#[derive(Debug, Clone)]
pub struct LotteryRow<'a> {
    pub game: &'a str,
    pub rules: &'a GameRules,
    pub surface: &'a ProbabilitySurface,
    pub features: &'a FeatureSnapshot,
    pub chaos: f64,
    pub n_picks: usize,
    /// Advertised jackpot, if known.
    pub jackpot: Option<f64>,
    pub popularity: Popularity,
}

impl LotteryRow<'_> {
    /// Probability mass of the `k_white` most likely whites.
    pub fn top_mass(&self) -> f64 {
        self.surface
            .top_whites(self.rules, self.rules.k_white)
            .iter()
            .map(|(_, p)| p)
            .sum()
    }

    /// Top-mass relative to a uniform surface (1 = no information).
    pub fn concentration(&self) -> f64 {
        let k = self.rules.k_white.min(self.rules.white_len()) as f64;
        let uniform = k / self.rules.white_len().max(1) as f64;
        if uniform > 0.0 {
            self.top_mass() / uniform
        } else {
            1.0
        }
    }
}

/// One screener row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityRow {
    pub ticker: String,
    pub p_up: f64,
    pub snapshot: TechnicalSnapshot,
}

#[derive(Debug, Clone)]
pub enum AgentRow<'a> {
    Lottery(LotteryRow<'a>),
    Equity(&'a EquityRow),
}

/// Run-level inputs shared by every agent call.
#[derive(Debug, Clone, Copy)]
pub struct AgentContext<'a> {
    pub entity: &'a str,
    pub as_of: NaiveDate,
    pub signals: &'a OracleSignals,
    pub rng: &'a RngHierarchy,
    /// Requested mode; `Auto` lets the supervisor decide.
    pub mode: Mode,
    /// History older than this is reported stale.
    pub max_staleness_days: i64,
}

pub type AgentFn = fn(&AgentRow<'_>, &AgentContext<'_>) -> Result<AgentResult, AgentError>;

#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub name: &'static str,
    pub run: AgentFn,
}

/// Every agent, sorted by name.
pub static REGISTRY: &[AgentSpec] = &[
    AgentSpec {
        name: ev_popularity::NAME,
        run: ev_popularity::score,
    },
    AgentSpec {
        name: explainer::NAME,
        run: explainer::score,
    },
    AgentSpec {
        name: monte_carlo::NAME,
        run: monte_carlo::score,
    },
    AgentSpec {
        name: ops_health::NAME,
        run: ops_health::score,
    },
    AgentSpec {
        name: oracle::NAME,
        run: oracle::score,
    },
    AgentSpec {
        name: pattern::NAME,
        run: pattern::score,
    },
    AgentSpec {
        name: sentiment::NAME,
        run: sentiment::score,
    },
    AgentSpec {
        name: supervisor::NAME,
        run: supervisor::score,
    },
    AgentSpec {
        name: technicals::NAME,
        run: technicals::score,
    },
    AgentSpec {
        name: volatility::NAME,
        run: volatility::score,
    },
];

pub fn agent_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|a| a.name).collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run one agent; errors and panics become a neutral error result.
pub fn run_agent(spec: &AgentSpec, row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> AgentResult {
    match catch_unwind(AssertUnwindSafe(|| (spec.run)(row, ctx))) {
        Ok(Ok(mut result)) => {
            result.name = spec.name.to_string();
            result
        }
        Ok(Err(e)) => AgentResult::error(spec.name, &e.to_string()),
        Err(payload) => AgentResult::error(spec.name, &panic_message(payload.as_ref())),
    }
}

/// Run every registered agent in order.
pub fn run_all(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Vec<AgentResult> {
    REGISTRY.iter().map(|spec| run_agent(spec, row, ctx)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::DrawRow;
    use crate::features::FeatureConfig;

    pub fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    pub fn powerball() -> GameRules {
        GameRules::preset("powerball").unwrap()
    }

    pub fn features(rules: &GameRules, n: usize) -> FeatureSnapshot {
        let rows: Vec<DrawRow> = (0..n)
            .map(|i| {
                DrawRow::new(
                    date() - chrono::Duration::days(3 * (n - i) as i64),
                    vec![1, 2, 3, 4, 5 + (i % 10) as u32],
                    Some(1),
                )
            })
            .collect();
        FeatureSnapshot::build(&rows, rules, date(), &FeatureConfig::default())
    }

    pub fn lottery_row<'a>(
        rules: &'a GameRules,
        surface: &'a ProbabilitySurface,
        features: &'a FeatureSnapshot,
    ) -> LotteryRow<'a> {
        LotteryRow {
            game: "powerball",
            rules,
            surface,
            features,
            chaos: 0.0,
            n_picks: 5,
            jackpot: None,
            popularity: Popularity::Off,
        }
    }

    pub fn context<'a>(signals: &'a OracleSignals, rng: &'a RngHierarchy) -> AgentContext<'a> {
        AgentContext {
            entity: "powerball",
            as_of: date(),
            signals,
            rng,
            mode: Mode::Auto,
            max_staleness_days: 14,
        }
    }
}
