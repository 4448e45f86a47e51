//! ConnorsRSI: mean of RSI(3) of close, RSI(2) of the up/down streak length,
//! and the 100-bar percentile rank of the one-bar return.
//! Lookback: percent-rank period + 1.

use super::rsi::rsi_series;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct ConnorsRsi {
    price_period: usize,
    streak_period: usize,
    rank_period: usize,
    name: String,
}

impl ConnorsRsi {
    pub fn new(price_period: usize, streak_period: usize, rank_period: usize) -> Self {
        assert!(
            price_period >= 1 && streak_period >= 1 && rank_period >= 1,
            "ConnorsRSI periods must be >= 1"
        );
        Self {
            price_period,
            streak_period,
            rank_period,
            name: format!("crsi_{price_period}_{streak_period}_{rank_period}"),
        }
    }
}

impl Default for ConnorsRsi {
    fn default() -> Self {
        Self::new(3, 2, 100)
    }
}

impl Indicator for ConnorsRsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.rank_period.max(self.price_period).max(self.streak_period) + 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let price_rsi = rsi_series(&closes, self.price_period);
        let streak_rsi = rsi_series(&streaks(&closes), self.streak_period);
        let rank = percent_rank(&one_bar_returns(&closes), self.rank_period);

        (0..closes.len())
            .map(|i| {
                let (a, b, c) = (price_rsi[i], streak_rsi[i], rank[i]);
                if a.is_nan() || b.is_nan() || c.is_nan() {
                    f64::NAN
                } else {
                    (a + b + c) / 3.0
                }
            })
            .collect()
    }
}

/// Signed run length of consecutive up (positive) or down (negative) closes.
/// An unchanged close resets the streak to zero.
pub fn streaks(closes: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let prev = out[i - 1];
        out[i] = if closes[i] > closes[i - 1] {
            if prev > 0.0 {
                prev + 1.0
            } else {
                1.0
            }
        } else if closes[i] < closes[i - 1] {
            if prev < 0.0 {
                prev - 1.0
            } else {
                -1.0
            }
        } else {
            0.0
        };
    }
    out
}

fn one_bar_returns(closes: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in 1..closes.len() {
        if closes[i - 1] > 0.0 {
            out[i] = closes[i] / closes[i - 1] - 1.0;
        }
    }
    out
}

/// Percentage (0..100) of the previous `period` values strictly below the
/// current one.
pub fn percent_rank(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    for i in period..n {
        let current = values[i];
        let window = &values[i - period..i];
        if current.is_nan() || window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let below = window.iter().filter(|v| **v < current).count();
        out[i] = 100.0 * below as f64 / period as f64;
    }
    out
}
