//! Trend-position indicators: distance from a long SMA and relative strength
//! against a benchmark.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::sma::rolling_mean;
use super::Indicator;
use crate::domain::Bar;

/// `close / SMA(period) - 1` as a fraction. Lookback: period - 1.
#[derive(Debug, Clone)]
pub struct SmaDistance {
    period: usize,
    name: String,
}

impl SmaDistance {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA distance period must be >= 1");
        Self {
            period,
            name: format!("dist_{period}d"),
        }
    }
}

impl Indicator for SmaDistance {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
            .iter()
            .zip(&closes)
            .map(|(sma, close)| {
                if sma.is_nan() || *sma <= 0.0 {
                    f64::NAN
                } else {
                    close / sma - 1.0
                }
            })
            .collect()
    }
}

/// Relative volume: volume / SMA(volume, period), window ending on the bar.
#[derive(Debug, Clone)]
pub struct Rvol {
    period: usize,
    name: String,
}

impl Rvol {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RVOL period must be >= 1");
        Self {
            period,
            name: format!("rvol_{period}"),
        }
    }
}

impl Indicator for Rvol {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        rolling_mean(&volumes, self.period)
            .iter()
            .zip(&volumes)
            .map(|(avg, v)| if *avg > 0.0 { v / avg } else { f64::NAN })
            .collect()
    }
}

/// N-bar return of `bars` minus the benchmark's N-bar return over the same
/// dates (fraction). Bars without a matching benchmark date are NaN.
pub fn relative_strength(bars: &[Bar], benchmark: &[Bar], lookback: usize) -> Vec<f64> {
    let bench: HashMap<NaiveDate, f64> = benchmark.iter().map(|b| (b.date, b.close)).collect();
    let mut out = vec![f64::NAN; bars.len()];
    for i in lookback..bars.len() {
        let (then, now) = (&bars[i - lookback], &bars[i]);
        let (Some(b_then), Some(b_now)) = (bench.get(&then.date), bench.get(&now.date)) else {
            continue;
        };
        if then.close > 0.0 && *b_then > 0.0 {
            out[i] = (now.close / then.close - 1.0) - (b_now / b_then - 1.0);
        }
    }
    out
}
