//! Orchestrator: runs every registered agent for a row on a fixed-size
//! Rayon pool, caches the results, and fuses them into a bounded multiplier.
//!
//! - Results are sorted by agent name before anything reads them
//! - Missing weights are zero, which leaves `m = 1`
//! - `m = clamp(1 + 0.015·Σ wᵢ·scoreᵢ, 0.85, cap_high)`
//! - Cancellation is checked before each agent starts

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use augur_core::agents::{run_agent, AgentContext, AgentResult, AgentRow, REGISTRY};

use crate::calibrate::CAP_MIN;

pub const MULTIPLIER_FLOOR: f64 = 0.85;
pub const MULTIPLIER_GAIN: f64 = 0.015;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Learned or hand-set agent weights (`agent_weights.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentWeights {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl AgentWeights {
    /// All-zero weights: every row gets `m = 1`.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn get(&self, agent: &str) -> f64 {
        self.weights
            .get(agent)
            .copied()
            .filter(|w| w.is_finite())
            .unwrap_or(0.0)
    }

    pub fn l1(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    /// `Σ wᵢ·scoreᵢ` over the agents present in both.
    pub fn weighted_sum(&self, results: &[AgentResult]) -> f64 {
        results.iter().map(|r| self.get(&r.name) * r.score).sum()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read weights {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse weights {}", path.display()))
    }

    /// Weights at `path`, neutral when the file is missing or unreadable.
    pub fn load_or_neutral(path: &Path) -> Self {
        if !path.exists() {
            return Self::neutral();
        }
        match Self::load(path) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "agent weights unreadable; using neutral weights");
                Self::neutral()
            }
        }
    }
}

/// Bounded agent multiplier.
pub fn multiplier(results: &[AgentResult], weights: &AgentWeights, cap_high: f64) -> f64 {
    let cap = if cap_high.is_finite() {
        cap_high.max(CAP_MIN)
    } else {
        CAP_MIN
    };
    let raw = 1.0 + MULTIPLIER_GAIN * weights.weighted_sum(results);
    if raw.is_finite() {
        raw.clamp(MULTIPLIER_FLOOR, cap)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Strong,
    Buy,
    Watch,
    Avoid,
}

impl Label {
    /// Label for a `Combined` score on the 0–100 scale.
    pub fn from_combined(combined: f64) -> Self {
        if combined >= 70.0 {
            Label::Strong
        } else if combined >= 55.0 {
            Label::Buy
        } else if combined >= 45.0 {
            Label::Watch
        } else {
            Label::Avoid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Strong => "strong",
            Label::Buy => "buy",
            Label::Watch => "watch",
            Label::Avoid => "avoid",
        }
    }
}

/// Fraction of opinionated agents whose sign matches the fused direction.
///
/// The direction is the sign of the weighted sum, or of the plain score sum
/// under neutral weights. Returns 0 when no agent has an opinion.
pub fn confidence(results: &[AgentResult], weights: &AgentWeights) -> f64 {
    let weighted = weights.weighted_sum(results);
    let direction = if weighted != 0.0 {
        weighted.signum()
    } else {
        let plain: f64 = results.iter().map(|r| r.score).sum();
        if plain == 0.0 {
            return 0.0;
        }
        plain.signum()
    };
    let voting: Vec<f64> = results
        .iter()
        .map(|r| r.score)
        .filter(|s| *s != 0.0)
        .collect();
    if voting.is_empty() {
        return 0.0;
    }
    let agree = voting.iter().filter(|s| s.signum() == direction).count();
    agree as f64 / voting.len() as f64
}

/// `Combined = base · m` with its label and agreement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fused {
    pub base: f64,
    pub multiplier: f64,
    pub combined: f64,
    pub label: Label,
    pub confidence: f64,
}

pub fn fuse(base: f64, results: &[AgentResult], weights: &AgentWeights, cap_high: f64) -> Fused {
    let m = multiplier(results, weights, cap_high);
    let combined = base * m;
    Fused {
        base,
        multiplier: m,
        combined,
        label: Label::from_combined(combined),
        confidence: confidence(results, weights),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: String,
    pub as_of: NaiveDate,
    pub prior: String,
    pub hist_hash: String,
}

/// Single-writer, many-reader agent result cache with a TTL.
pub struct AgentCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, (Instant, Vec<AgentResult>)>>,
}

impl AgentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<AgentResult>> {
        let entries = self.entries.read().ok()?;
        let (at, results) = entries.get(key)?;
        (at.elapsed() < self.ttl).then(|| results.clone())
    }

    pub fn insert(&self, key: CacheKey, results: Vec<AgentResult>) {
        if let Ok(mut entries) = self.entries.write() {
            let ttl = self.ttl;
            entries.retain(|_, (at, _)| at.elapsed() < ttl);
            entries.insert(key, (Instant::now(), results));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

pub struct Orchestrator {
    pool: rayon::ThreadPool,
    cache: AgentCache,
}

impl Orchestrator {
    /// `threads = 0` sizes the pool to the number of cores.
    pub fn new(threads: usize, cache_ttl: Duration) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("augur-agent-{i}"))
            .build()
            .context("Failed to build agent thread pool")?;
        Ok(Self {
            pool,
            cache: AgentCache::new(cache_ttl),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn cache(&self) -> &AgentCache {
        &self.cache
    }

    /// Every registered agent for `row`, sorted by name. A cache hit under
    /// `key` skips the agents entirely.
    pub fn score_row(
        &self,
        row: &AgentRow<'_>,
        ctx: &AgentContext<'_>,
        key: Option<&CacheKey>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<AgentResult>, Cancelled> {
        let is_cancelled = || cancel.is_some_and(|f| f.load(Ordering::Relaxed));
        if is_cancelled() {
            return Err(Cancelled);
        }
        if let Some(hit) = key.and_then(|k| self.cache.get(k)) {
            debug!(entity = ctx.entity, "agent cache hit");
            return Ok(hit);
        }

        let results: Vec<Option<AgentResult>> = self.pool.install(|| {
            REGISTRY
                .par_iter()
                .map(|spec| (!is_cancelled()).then(|| run_agent(spec, row, ctx)))
                .collect()
        });
        let mut results: Vec<AgentResult> = results.into_iter().collect::<Option<_>>().ok_or(Cancelled)?;
        results.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(k) = key {
            self.cache.insert(k.clone(), results.clone());
        }
        Ok(results)
    }
}
