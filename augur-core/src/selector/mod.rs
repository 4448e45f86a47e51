//! Selector: turns a probability surface into `n_picks` diverse tickets.
//!
//! A candidate pool is drawn from the tempered surface (pool size and
//! temperature depend on the run mode), ranked by likelihood under the
//! untempered surface, optionally thinned by popularity, and then
//! diversified. The result always holds exactly `n_picks` legal tickets.

pub mod diversity;
pub mod ev;
pub mod wrs;

use std::collections::HashSet;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use diversity::{diversify, jaccard_distance, mean_pairwise_distance, tokens, Diversified, Tokens};
pub use ev::{drop_top_decile, heuristic_popularity, Popularity};
pub use wrs::{categorical, es_key, perturb, sequential_draw, temper, wrs_indices};

use crate::domain::{renormalize, ConfigError, GameRules, Pick, ProbabilitySurface};
use crate::features::PairPmi;
use crate::rng::{stream, RngHierarchy};

/// Largest share of weights a chaos pass may bump.
pub const MAX_SELECTOR_CHAOS: f64 = 0.05;
pub const SYNERGY_GAIN: f64 = 0.2;
pub const DIVERSITY_RANGE: (f64, f64) = (0.5, 0.8);
pub const MAX_CONSENSUS_BETA: f64 = 0.5;
const ATTEMPTS_PER_SET: usize = 20;

/// Run mode chosen by the supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Auto,
    MostLikely,
    Rainbow,
    OracleForward,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::MostLikely => "most_likely",
            Mode::Rainbow => "rainbow",
            Mode::OracleForward => "oracle_forward",
        }
    }

    /// `(pool multiplier, temperature)`. An unresolved `Auto` samples like
    /// `most_likely`.
    pub fn sampling(self) -> (usize, f64) {
        match self {
            Mode::Auto | Mode::MostLikely => (2, 0.8),
            Mode::Rainbow => (5, 1.4),
            Mode::OracleForward => (3, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorOptions {
    pub n_picks: usize,
    pub diversity_target: f64,
    /// User chaos in [0, 1]; scaled to at most `MAX_SELECTOR_CHAOS`.
    pub chaos: f64,
    pub synergy: bool,
    pub ev_dedupe: bool,
    pub popularity: Popularity,
    /// Consensus smoothing weight; 0 disables.
    pub consensus_beta: f64,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            n_picks: 5,
            diversity_target: 0.5,
            chaos: 0.0,
            synergy: true,
            ev_dedupe: false,
            popularity: Popularity::Off,
            consensus_beta: 0.0,
        }
    }
}

impl SelectorOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_picks == 0 {
            return Err(ConfigError::NoPicks);
        }
        let ranges = [
            ("diversity_target", self.diversity_target, DIVERSITY_RANGE.0, DIVERSITY_RANGE.1),
            ("chaos", self.chaos, 0.0, 1.0),
            ("consensus_beta", self.consensus_beta, 0.0, MAX_CONSENSUS_BETA),
        ];
        for (name, value, min, max) in ranges {
            if !(value.is_finite() && (min..=max).contains(&value)) {
                return Err(ConfigError::OptionOutOfRange {
                    name,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// What a pool draw needs.
pub struct SamplePlan<'a> {
    pub rules: &'a GameRules,
    pub white: &'a [f64],
    pub special: Option<&'a [f64]>,
    pub pmi: Option<&'a PairPmi>,
    /// Fraction of weights bumped before each draw.
    pub chaos: f64,
}

impl SamplePlan<'_> {
    fn draw_whites(&self, rng: &mut StdRng) -> Vec<u32> {
        let rules = self.rules;
        if rules.replacement {
            // Digits keep draw order.
            return (0..rules.k_white)
                .map(|_| rules.white_value(categorical(self.white, rng)))
                .collect();
        }
        let idx = match self.pmi.filter(|p| !p.is_empty()) {
            Some(pmi) => {
                let factor = |a: usize, b: usize| {
                    1.0 + SYNERGY_GAIN * pmi.get(rules.white_value(a), rules.white_value(b))
                };
                sequential_draw(self.white, rules.k_white, self.chaos, Some(factor), rng)
            }
            None if self.chaos > 0.0 => sequential_draw::<_, fn(usize, usize) -> f64>(
                self.white,
                rules.k_white,
                self.chaos,
                None,
                rng,
            ),
            None => wrs_indices(self.white, rules.k_white, rng),
        };
        let mut values: Vec<u32> = idx.into_iter().map(|i| rules.white_value(i)).collect();
        values.sort_unstable();
        values
    }

    fn draw_specials(&self, rng: &mut StdRng) -> Vec<u32> {
        let Some(weights) = self.special else {
            return Vec::new();
        };
        let k = self.rules.k_special.unwrap_or(1).max(1);
        wrs_indices(weights, k, rng)
            .into_iter()
            .filter_map(|i| self.rules.special_value(i))
            .filter_map(|v| self.rules.clamp_special(v))
            .collect()
    }

    fn draw_one(&self, rng_w: &mut StdRng, rng_s: &mut StdRng) -> Pick {
        let white = self.draw_whites(rng_w);
        let specials = self.draw_specials(rng_s);
        let mut pick = Pick::new(white, specials.first().copied(), self.rules);
        if specials.len() > 1 {
            pick.meta.insert("specials".to_string(), serde_json::json!(specials));
        }
        pick
    }
}

/// Draw `count` tickets, rejecting duplicates. When the domain is too small
/// to supply `count` distinct tickets the remainder is filled with repeats
/// marked `duplicate=true`.
pub fn sample_sets(plan: &SamplePlan<'_>, count: usize, rng_w: &mut StdRng, rng_s: &mut StdRng) -> Vec<Pick> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(count);
    let mut attempts = 0usize;
    let max_attempts = count.saturating_mul(ATTEMPTS_PER_SET).max(ATTEMPTS_PER_SET);
    while out.len() < count && attempts < max_attempts {
        attempts += 1;
        let pick = plan.draw_one(rng_w, rng_s);
        if seen.insert(pick.key()) {
            out.push(pick);
        }
    }
    while out.len() < count {
        let mut pick = plan.draw_one(rng_w, rng_s);
        pick.meta.insert("duplicate".to_string(), serde_json::Value::Bool(true));
        out.push(pick);
    }
    out
}

/// Log-likelihood of a ticket under the surface.
pub fn log_likelihood(pick: &Pick, surface: &ProbabilitySurface, rules: &GameRules) -> f64 {
    let whites: f64 = pick
        .white
        .iter()
        .filter_map(|w| rules.white_index(*w))
        .map(|i| surface.white[i].ln())
        .sum();
    let special = match (&surface.special, pick.special) {
        (Some(s), Some(v)) => rules.special_index(v).map(|i| s[i].ln()).unwrap_or(0.0),
        _ => 0.0,
    };
    whites + special
}

/// `(1−β)·W + β·freq(pool)`, renormalized.
pub fn consensus_smooth(weights: &[f64], pool: &[Pick], rules: &GameRules, beta: f64) -> Vec<f64> {
    let beta = beta.clamp(0.0, MAX_CONSENSUS_BETA);
    let mut freq = vec![0.0; weights.len()];
    for pick in pool {
        for i in pick.white.iter().filter_map(|w| rules.white_index(*w)) {
            freq[i] += 1.0;
        }
    }
    renormalize(&mut freq);
    let mut out: Vec<f64> = weights
        .iter()
        .zip(&freq)
        .map(|(w, f)| (1.0 - beta) * w + beta * f)
        .collect();
    renormalize(&mut out);
    out
}

/// Final tickets and selection telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub picks: Vec<Pick>,
    pub mode: Mode,
    pub pool_size: usize,
    /// Mean pairwise Jaccard distance of the final picks.
    pub diversity_score: f64,
    pub diversity_fallback: bool,
    /// Mean `1 − popularity` of the final picks.
    pub ev_score: f64,
}

pub struct SelectInput<'a> {
    pub entity: &'a str,
    pub surface: &'a ProbabilitySurface,
    pub rules: &'a GameRules,
    pub pmi: Option<&'a PairPmi>,
    pub options: &'a SelectorOptions,
    /// Resolved mode (never `Auto` in practice).
    pub mode: Mode,
    pub rng: &'a RngHierarchy,
}

pub fn select(input: &SelectInput<'_>) -> Selection {
    let opts = input.options;
    let rules = input.rules;
    let n = opts.n_picks.max(1);
    let (multiplier, temperature) = input.mode.sampling();
    let pool_size = n.saturating_mul(multiplier).max(n);

    let white = temper(&input.surface.white, temperature);
    let special = input.surface.special.as_ref().map(|s| temper(s, temperature));
    let pmi = if opts.synergy && !rules.replacement {
        input.pmi
    } else {
        None
    };
    let chaos = MAX_SELECTOR_CHAOS * opts.chaos.clamp(0.0, 1.0);

    let mut rng_w = input.rng.rng_for(input.entity, stream::SELECTOR, 0);
    let mut rng_s = input.rng.rng_for(input.entity, stream::SPECIAL, 0);
    let plan = SamplePlan {
        rules,
        white: &white,
        special: special.as_deref(),
        pmi,
        chaos,
    };
    let mut pool = sample_sets(&plan, pool_size, &mut rng_w, &mut rng_s);

    if opts.consensus_beta > 0.0 {
        let smoothed = consensus_smooth(&white, &pool, rules, opts.consensus_beta);
        let mut rng_w = input.rng.rng_for(input.entity, stream::SELECTOR, 1);
        let mut rng_s = input.rng.rng_for(input.entity, stream::SPECIAL, 1);
        let plan = SamplePlan {
            white: &smoothed,
            ..plan
        };
        pool = sample_sets(&plan, pool_size, &mut rng_w, &mut rng_s);
    }

    // Rank by likelihood, ties broken lexicographically on the ticket.
    let mut ranked: Vec<(f64, Pick)> = pool
        .into_iter()
        .map(|p| (log_likelihood(&p, input.surface, rules), p))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.key().cmp(&b.1.key())));
    let mut ranked: Vec<Pick> = ranked.into_iter().map(|(_, p)| p).collect();

    if opts.ev_dedupe {
        let scores: Vec<f64> = ranked.iter().map(|p| opts.popularity.score(p)).collect();
        let keep = drop_top_decile(&scores, n);
        ranked = ranked
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    let token_sets: Vec<Tokens> = ranked.iter().map(|p| tokens(p, rules.ordered)).collect();
    let diversified = diversify(&token_sets, n, opts.diversity_target);
    let picks: Vec<Pick> = diversified.chosen.iter().map(|&i| ranked[i].clone()).collect();
    let chosen_tokens: Vec<Tokens> = diversified.chosen.iter().map(|&i| token_sets[i].clone()).collect();

    let ev_score = if picks.is_empty() {
        0.0
    } else {
        picks
            .iter()
            .map(|p| 1.0 - opts.popularity.score(p))
            .sum::<f64>()
            / picks.len() as f64
    };

    Selection {
        diversity_score: mean_pairwise_distance(&chosen_tokens),
        diversity_fallback: diversified.fallback,
        ev_score,
        pool_size,
        mode: input.mode,
        picks,
    }
}
