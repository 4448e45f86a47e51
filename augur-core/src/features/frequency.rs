//! Recency-weighted frequency, long/short blend and gap bonus.

use chrono::NaiveDate;

use crate::domain::{DrawRow, GameRules};

/// `w_i = exp(-ln2 · age_i / half_life)` with age in days before `as_of`,
/// normalized to sum 1. Rows dated after `as_of` get age 0.
pub fn recency_weights(dates: &[NaiveDate], as_of: NaiveDate, half_life_days: f64) -> Vec<f64> {
    if dates.is_empty() {
        return Vec::new();
    }
    let half_life = half_life_days.max(1e-9);
    let mut w: Vec<f64> = dates
        .iter()
        .map(|d| {
            let age = (as_of - *d).num_days().max(0) as f64;
            (-std::f64::consts::LN_2 * age / half_life).exp()
        })
        .collect();
    let sum: f64 = w.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        w.iter_mut().for_each(|x| *x /= sum);
    } else {
        let u = 1.0 / w.len() as f64;
        w.iter_mut().for_each(|x| *x = u);
    }
    w
}

/// Which ball a frequency vector is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ball {
    White,
    Special,
}

impl Ball {
    pub fn domain_len(self, rules: &GameRules) -> usize {
        match self {
            Ball::White => rules.white_len(),
            Ball::Special => rules.special_len().unwrap_or(0),
        }
    }

    /// Domain indices that appear in a row (repeats counted once).
    fn indices(self, row: &DrawRow, rules: &GameRules) -> Vec<usize> {
        let mut idx: Vec<usize> = match self {
            Ball::White => row.whites.iter().filter_map(|w| rules.white_index(*w)).collect(),
            Ball::Special => row
                .special
                .and_then(|s| rules.special_index(s))
                .into_iter()
                .collect(),
        };
        idx.sort_unstable();
        idx.dedup();
        idx
    }
}

/// `score(k) = Σ w_i · [k appears in row i]`.
pub fn weighted_counts(rows: &[DrawRow], weights: &[f64], rules: &GameRules, ball: Ball) -> Vec<f64> {
    let mut out = vec![0.0; ball.domain_len(rules)];
    for (row, w) in rows.iter().zip(weights) {
        for i in ball.indices(row, rules) {
            out[i] += w;
        }
    }
    out
}

/// Plain appearance counts over the last `window` rows.
pub fn window_counts(rows: &[DrawRow], window: usize, rules: &GameRules, ball: Ball) -> Vec<f64> {
    let mut out = vec![0.0; ball.domain_len(rules)];
    let start = rows.len().saturating_sub(window);
    for row in &rows[start..] {
        for i in ball.indices(row, rules) {
            out[i] += 1.0;
        }
    }
    out
}

/// `(1-α)·long + α·short`, both expressed as expected appearances over the
/// full history so that Laplace smoothing acts on a count scale.
///
/// `long` is the recency-weighted count (weights sum to 1) scaled by N; `short`
/// is the raw count over the last `window` rows scaled by `N / window_len`.
pub fn long_short_blend(
    rows: &[DrawRow],
    weights: &[f64],
    rules: &GameRules,
    ball: Ball,
    alpha: f64,
    window: usize,
) -> Vec<f64> {
    let n = rows.len() as f64;
    let alpha = alpha.clamp(0.0, 1.0);
    let long = weighted_counts(rows, weights, rules, ball);
    let short = window_counts(rows, window, rules, ball);
    let short_len = rows.len().min(window).max(1) as f64;
    long.iter()
        .zip(&short)
        .map(|(l, s)| (1.0 - alpha) * l * n + alpha * s * n / short_len)
        .collect()
}

/// Mean days between consecutive rows (1 when undefined).
pub fn mean_interval_days(rows: &[DrawRow]) -> f64 {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if rows.len() > 1 => {
            let span = (last.draw_date - first.draw_date).num_days() as f64;
            (span / (rows.len() - 1) as f64).max(1.0)
        }
        _ => 1.0,
    }
}

/// Gap/overdue factor per candidate:
/// `1 + strength·(gap_k/expected_gap - 1)`, at least 1 and at most
/// `ceiling` when one is given.
///
/// `gap_k` counts rows since the candidate last appeared (N when never seen);
/// `expected_gap = domain / picks_per_row`, at least 1. An empty history has
/// no information and yields all ones.
pub fn gap_bonus(
    rows: &[DrawRow],
    rules: &GameRules,
    ball: Ball,
    strength: f64,
    ceiling: Option<f64>,
) -> Vec<f64> {
    gap_bonus_shifted(rows, rules, ball, strength, ceiling, 0.0)
}

/// `gap_bonus` with every gap lengthened by `extra_rows` (fractional rows
/// elapsed since the last draw). Used for time sensitivity.
pub fn gap_bonus_shifted(
    rows: &[DrawRow],
    rules: &GameRules,
    ball: Ball,
    strength: f64,
    ceiling: Option<f64>,
    extra_rows: f64,
) -> Vec<f64> {
    let len = ball.domain_len(rules);
    if rows.is_empty() || len == 0 {
        return vec![1.0; len];
    }
    let per_row = match ball {
        Ball::White => rules.k_white,
        Ball::Special => rules.k_special.unwrap_or(1),
    }
    .max(1);
    let expected_gap = (len as f64 / per_row as f64).max(1.0);

    let mut last_seen: Vec<Option<usize>> = vec![None; len];
    for (r, row) in rows.iter().enumerate() {
        for i in ball.indices(row, rules) {
            last_seen[i] = Some(r);
        }
    }
    let n = rows.len();
    last_seen
        .iter()
        .map(|seen| {
            let gap = match seen {
                Some(r) => (n - 1 - r) as f64,
                None => n as f64,
            } + extra_rows;
            let factor = (1.0 + strength * (gap / expected_gap - 1.0)).max(1.0);
            match ceiling {
                Some(c) => factor.min(c.max(1.0)),
                None => factor,
            }
        })
        .collect()
}
