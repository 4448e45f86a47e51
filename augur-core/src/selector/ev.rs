//! Ticket popularity and EV de-duplication.
//!
//! Popular patterns (birthdays, runs, arithmetic sequences) are shared with
//! many other players, so a hit on them is worth less. The scorer is opt-in;
//! `Popularity::Off` scores everything 0 and leaves the pool untouched.

use serde::{Deserialize, Serialize};

use crate::domain::Pick;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Popularity {
    #[default]
    Off,
    Heuristic,
}

impl Popularity {
    /// Popularity in [0, 1].
    pub fn score(self, pick: &Pick) -> f64 {
        match self {
            Popularity::Off => 0.0,
            Popularity::Heuristic => heuristic_popularity(&pick.white),
        }
    }
}

/// Weighted mix of calendar numbers, the longest consecutive run, a shared
/// decade and constant spacing.
pub fn heuristic_popularity(whites: &[u32]) -> f64 {
    if whites.is_empty() {
        return 0.0;
    }
    let k = whites.len() as f64;
    let mut sorted = whites.to_vec();
    sorted.sort_unstable();

    let calendar = sorted.iter().filter(|v| (1..=31).contains(*v)).count() as f64 / k;

    let mut longest = 1usize;
    let mut run = 1usize;
    for w in sorted.windows(2) {
        if w[1] == w[0] + 1 {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 1;
        }
    }
    let run_term = if sorted.len() > 1 {
        (longest - 1) as f64 / (sorted.len() - 1) as f64
    } else {
        0.0
    };

    let same_decade = sorted.first().map(|f| f / 10) == sorted.last().map(|l| l / 10);
    let progression = sorted.len() > 2
        && sorted
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect::<Vec<_>>()
            .windows(2)
            .all(|d| d[0] == d[1]);

    (0.4 * calendar
        + 0.3 * run_term
        + if same_decade { 0.1 } else { 0.0 }
        + if progression { 0.2 } else { 0.0 })
    .clamp(0.0, 1.0)
}

/// Keep-mask that drops the most popular decile (at least one set) while
/// leaving `keep_min` sets. All-equal scores drop nothing.
pub fn drop_top_decile(scores: &[f64], keep_min: usize) -> Vec<bool> {
    let mut keep = vec![true; scores.len()];
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    if scores.is_empty() || max <= min {
        return keep;
    }
    let decile = scores.len().div_ceil(10);
    let drop = decile.min(scores.len().saturating_sub(keep_min));
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b)));
    for &i in order.iter().take(drop) {
        keep[i] = false;
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_run_scores_high() {
        let popular = heuristic_popularity(&[1, 2, 3, 4, 5]);
        let spread = heuristic_popularity(&[33, 41, 48, 57, 66]);
        assert!(popular > 0.9);
        assert!(spread < 0.1);
    }

    #[test]
    fn off_is_zero() {
        let rules = crate::domain::GameRules::preset("cash_five").unwrap();
        let pick = Pick::new(vec![1, 2, 3, 4, 5], None, &rules);
        assert_eq!(Popularity::Off.score(&pick), 0.0);
    }

    #[test]
    fn decile_drop() {
        let scores: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let keep = drop_top_decile(&scores, 5);
        assert_eq!(keep.iter().filter(|k| !**k).count(), 2);
        assert!(!keep[19] && !keep[18]);
        assert!(drop_top_decile(&[0.0; 10], 1).iter().all(|k| *k));
        // Never drops below keep_min.
        assert_eq!(drop_top_decile(&[1.0, 2.0], 2), vec![true, true]);
    }
}
