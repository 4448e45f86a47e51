//! Per-bar technical indicators for the equities screener.
//!
//! Indicators are pure functions: bar history in, numeric series out, the
//! same length as the input with `f64::NAN` for warmup. They are computed
//! top-down from immutable bars and never written back into the history.
//!
//! `TechnicalSnapshot` bundles the latest value of every indicator an agent
//! reads.

pub mod atr;
pub mod connors;
pub mod rsi;
pub mod sma;
pub mod snapshot;
pub mod squeeze;
pub mod trend;

pub use atr::Atr;
pub use connors::ConnorsRsi;
pub use rsi::Rsi;
pub use sma::Sma;
pub use snapshot::TechnicalSnapshot;
pub use squeeze::SqueezeZ;
pub use trend::{relative_strength, Rvol, SmaDistance};

use crate::domain::Bar;

/// Trait for indicators.
///
/// No indicator value at bar t may depend on data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "rsi_2", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;

    /// Value on the last bar (NaN during warmup or on empty input).
    fn latest(&self, bars: &[Bar]) -> f64 {
        self.compute(bars).last().copied().unwrap_or(f64::NAN)
    }
}

/// Which bar field a series indicator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Close,
    Volume,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Close => "close",
            Source::Volume => "volume",
        }
    }

    pub fn series(self, bars: &[Bar]) -> Vec<f64> {
        match self {
            Source::Close => bars.iter().map(|b| b.close).collect(),
            Source::Volume => bars.iter().map(|b| b.volume as f64).collect(),
        }
    }
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

/// Bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            date: base_date + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
