//! Probability builder: composes the per-candidate surface from frequency
//! features, archetype priors, the oracle bundle and user priors.
//!
//! The nine steps run in a fixed order and each one renormalizes (with the
//! `PROB_FLOOR` floor) before the next. A step that produces non-finite
//! weights resets that vector to uniform and leaves a warning.

pub mod ensemble;
pub mod priors;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use priors::Archetype;

use crate::domain::{renormalize, uniform, ConfigError, DrawRow, GameRules, ProbabilitySurface};
use crate::features::{BallFeatures, FeatureSnapshot};
use crate::oracle::OracleSignals;
use crate::rng::{stream, RngHierarchy};

pub const MAX_STRUCTURAL_PRIOR: f64 = 0.05;
pub const MAX_CHAOS: f64 = 0.5;
pub const MAX_OBSERVER_BIAS: f64 = 0.2;
pub const MAX_INTENTION_STRENGTH: f64 = 0.01;
pub const MAX_INTENTION_BUMPS: usize = 4;
pub const RETRO_MEMORY_RANGE: (f64, f64) = (0.15, 0.65);
/// Documented memory for callers that enable the retro step without a value.
pub const DEFAULT_RETRO_MEMORY: f64 = 0.35;

/// User-supplied priors from the input bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPriors {
    pub lucky_whites: Vec<u32>,
    pub lucky_specials: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intention: Option<String>,
}

/// Knobs for the optional and bounded steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityOptions {
    pub archetype: Archetype,
    /// Structural (prime/Fibonacci) prior strength; 0 disables.
    pub structural_prior: f64,
    /// User half of the chaos mix, in [0, 1].
    pub chaos: f64,
    pub observer_bias: f64,
    pub observer_confidence: f64,
    /// Dirichlet ensemble draws; 0 disables.
    pub ensemble_draws: usize,
    /// Multiverse posterior samples; 0 disables.
    pub multiverse_samples: usize,
    pub multiverse_strength: f64,
    /// Retrocausal memory; `None` leaves the step a no-op.
    pub retro_memory: Option<f64>,
    pub intention_strength: f64,
}

impl Default for ProbabilityOptions {
    fn default() -> Self {
        Self {
            archetype: Archetype::Uniform,
            structural_prior: 0.0,
            chaos: 0.0,
            observer_bias: 0.1,
            observer_confidence: 1.0,
            ensemble_draws: 0,
            multiverse_samples: 0,
            multiverse_strength: 5.0,
            retro_memory: None,
            intention_strength: MAX_INTENTION_STRENGTH,
        }
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OptionOutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

impl ProbabilityOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("structural_prior", self.structural_prior, 0.0, MAX_STRUCTURAL_PRIOR)?;
        check_range("chaos", self.chaos, 0.0, 1.0)?;
        check_range("observer_bias", self.observer_bias, 0.0, MAX_OBSERVER_BIAS)?;
        check_range("observer_confidence", self.observer_confidence, 0.0, 1.0)?;
        check_range("multiverse_strength", self.multiverse_strength, 1e-6, 1e6)?;
        check_range("intention_strength", self.intention_strength, 0.0, MAX_INTENTION_STRENGTH)?;
        if let Some(m) = self.retro_memory {
            check_range("retro_memory", m, RETRO_MEMORY_RANGE.0, RETRO_MEMORY_RANGE.1)?;
        }
        Ok(())
    }
}

/// Oracle-driven chaos in [0, 1] from Kp and recent M/X flares.
pub fn oracle_chaos(signals: &OracleSignals) -> f64 {
    let kp = signals.kp_or_quiet() / 9.0;
    let flares = signals.flare_mx_72h.min(5) as f64 / 5.0;
    (0.5 * kp + 0.5 * flares).clamp(0.0, 1.0)
}

/// Total chaos weight: half oracle, half user, at most `MAX_CHAOS`.
pub fn chaos_weight(signals: &OracleSignals, user_chaos: f64) -> f64 {
    (0.5 * MAX_CHAOS * oracle_chaos(signals) + 0.5 * MAX_CHAOS * user_chaos.clamp(0.0, 1.0))
        .clamp(0.0, MAX_CHAOS)
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityBuild {
    pub surface: ProbabilitySurface,
    pub chaos: f64,
    /// Non-fatal problems (uniform fallbacks).
    pub warnings: Vec<String>,
}

/// Everything the builder reads.
pub struct BuildInput<'a> {
    pub entity: &'a str,
    pub as_of: NaiveDate,
    pub rules: &'a GameRules,
    pub rows: &'a [DrawRow],
    pub features: &'a FeatureSnapshot,
    pub signals: &'a OracleSignals,
    pub priors: &'a UserPriors,
    pub options: &'a ProbabilityOptions,
    pub rng: &'a RngHierarchy,
}

/// Build `W` (and `S` when the game has a special ball).
pub fn build(input: &BuildInput<'_>) -> ProbabilityBuild {
    let chaos = chaos_weight(input.signals, input.options.chaos);
    let mut warnings = Vec::new();

    let white_values: Vec<u32> = (0..input.rules.white_len())
        .map(|i| input.rules.white_value(i))
        .collect();
    let white = build_ball(
        input,
        BallSpec {
            label: "white",
            iteration: 0,
            values: &white_values,
            features: &input.features.white,
            lucky: &input.priors.lucky_whites,
            intention_key: input.priors.intention.clone(),
            hits: |row: &DrawRow, v: u32| row.contains(v),
        },
        chaos,
        &mut warnings,
    );

    let special = match (&input.features.special, input.rules.special_len()) {
        (Some(features), Some(len)) if input.rules.has_special() => {
            let values: Vec<u32> = (0..len)
                .filter_map(|i| input.rules.special_value(i))
                .collect();
            Some(build_ball(
                input,
                BallSpec {
                    label: "special",
                    iteration: 1,
                    values: &values,
                    features,
                    lucky: &input.priors.lucky_specials,
                    intention_key: input.priors.intention.as_ref().map(|i| format!("{i}#special")),
                    hits: |row: &DrawRow, v: u32| row.special == Some(v),
                },
                chaos,
                &mut warnings,
            ))
        }
        _ => None,
    };

    ProbabilityBuild {
        surface: ProbabilitySurface { white, special },
        chaos,
        warnings,
    }
}

struct BallSpec<'a, F: Fn(&DrawRow, u32) -> bool> {
    label: &'static str,
    iteration: u64,
    values: &'a [u32],
    features: &'a BallFeatures,
    lucky: &'a [u32],
    intention_key: Option<String>,
    hits: F,
}

fn step(v: &mut [f64], label: &str, name: &str, warnings: &mut Vec<String>) {
    if !renormalize(v) {
        warnings.push(format!("{label}: {name} produced invalid weights; reset to uniform"));
    }
}

fn build_ball<F: Fn(&DrawRow, u32) -> bool>(
    input: &BuildInput<'_>,
    spec: BallSpec<'_, F>,
    chaos: f64,
    warnings: &mut Vec<String>,
) -> Vec<f64> {
    let opts = input.options;
    let n = spec.values.len();
    if n == 0 {
        return Vec::new();
    }
    let label = spec.label;

    // 1. blend × gap, Laplace +1
    let mut v: Vec<f64> = (0..n)
        .map(|i| {
            let blend = spec.features.blend.get(i).copied().unwrap_or(0.0);
            let gap = spec.features.gap.get(i).copied().unwrap_or(1.0);
            blend * gap + 1.0
        })
        .collect();
    step(&mut v, label, "base", warnings);

    // 2. archetype
    for (x, value) in v.iter_mut().zip(spec.values) {
        *x *= opts.archetype.weight(*value, input.as_of);
    }
    step(&mut v, label, "archetype", warnings);

    // 3. structural prior
    let strength = opts.structural_prior.clamp(0.0, MAX_STRUCTURAL_PRIOR);
    if strength > 0.0 {
        for (x, value) in v.iter_mut().zip(spec.values) {
            *x *= priors::structural_weight(*value, strength);
        }
    }
    step(&mut v, label, "structural", warnings);

    // 4. chaos mix with uniform
    let u = 1.0 / n as f64;
    for x in v.iter_mut() {
        *x = (1.0 - chaos) * *x + chaos * u;
    }
    step(&mut v, label, "chaos", warnings);

    // 5. observer bias
    let bias = opts.observer_bias.clamp(0.0, MAX_OBSERVER_BIAS);
    let bump = 1.0 + bias * opts.observer_confidence.clamp(0.0, 1.0);
    for (x, value) in v.iter_mut().zip(spec.values) {
        if spec.lucky.contains(value) {
            *x *= bump;
        }
    }
    step(&mut v, label, "observer", warnings);

    // 6. Dirichlet ensemble
    if opts.ensemble_draws > 0 {
        let mut rng = input.rng.rng_for(input.entity, stream::ENSEMBLE, spec.iteration);
        v = ensemble::dirichlet_mean(&ensemble::ensemble_alphas(&v), opts.ensemble_draws, &mut rng);
    }
    step(&mut v, label, "ensemble", warnings);

    // 7. multiverse posterior averaging
    if opts.multiverse_samples > 0 {
        let mut rng = input.rng.rng_for(input.entity, stream::MULTIVERSE, spec.iteration);
        let alphas = ensemble::posterior_alphas(&v, &spec.features.blend, opts.multiverse_strength);
        v = ensemble::dirichlet_mean(&alphas, opts.multiverse_samples, &mut rng);
    }
    step(&mut v, label, "multiverse", warnings);

    // 8. retrocausal memory
    if let Some(memory) = opts.retro_memory {
        let memory = memory.clamp(RETRO_MEMORY_RANGE.0, RETRO_MEMORY_RANGE.1);
        if let Some(perf) = decayed_performance(input.rows, spec.values, memory, &spec.hits) {
            for (x, p) in v.iter_mut().zip(perf) {
                *x *= (1.0 + memory * (p - 1.0)).max(0.0);
            }
        }
    }
    step(&mut v, label, "retro", warnings);

    // 9. intention hash bias
    if let Some(key) = &spec.intention_key {
        let factor = 1.0 + opts.intention_strength.clamp(0.0, MAX_INTENTION_STRENGTH);
        for idx in priors::intention_indices(key, n, MAX_INTENTION_BUMPS) {
            v[idx] *= factor;
        }
    }
    step(&mut v, label, "intention", warnings);

    v
}

/// `perf_k = Σ memoryᵃᵍᵉ · hit`, scaled to mean 1. `None` without history.
fn decayed_performance<F: Fn(&DrawRow, u32) -> bool>(
    rows: &[DrawRow],
    values: &[u32],
    memory: f64,
    hits: &F,
) -> Option<Vec<f64>> {
    if rows.is_empty() {
        return None;
    }
    let last = rows.len() - 1;
    let perf: Vec<f64> = values
        .iter()
        .map(|v| {
            rows.iter()
                .enumerate()
                .filter(|(_, row)| hits(row, *v))
                .map(|(i, _)| memory.powi((last - i) as i32))
                .sum()
        })
        .collect();
    let mean = perf.iter().sum::<f64>() / perf.len().max(1) as f64;
    (mean > 0.0).then(|| perf.iter().map(|p| p / mean).collect())
}

/// Uniform surface for a game; the fallback when nothing else is available.
pub fn uniform_surface(rules: &GameRules) -> ProbabilitySurface {
    ProbabilitySurface {
        white: uniform(rules.white_len()),
        special: rules.has_special().then(|| uniform(rules.special_len().unwrap_or(0))),
    }
}
