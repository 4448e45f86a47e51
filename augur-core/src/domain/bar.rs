//! Bar — one trading day of OHLCV for an equities entity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar. The entity (ticker) is the history-store key, not a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Widen high/low so they bracket open and close.
    pub fn clamp_range(mut self) -> Self {
        let top = self.open.max(self.close);
        let bottom = self.open.min(self.close);
        if self.high.is_nan() || self.high < top {
            self.high = top;
        }
        if self.low.is_nan() || self.low > bottom {
            self.low = bottom;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn clamp_range_brackets_body() {
        let mut bar = sample_bar();
        bar.high = 101.0; // below close
        bar.low = 99.0;
        let fixed = bar.clamp_range();
        assert_eq!(fixed.high, 103.0);
        assert_eq!(fixed.low, 99.0);
        assert!(fixed.is_sane());
    }
}
