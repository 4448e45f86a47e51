//! Volatility squeeze.
//!
//! z = (std20 - mean(std20 over 120)) / std(std20 over 120), where std20 is
//! the rolling standard deviation of closes. A squeeze is z below
//! `SQUEEZE_Z_THRESHOLD`.
//! Lookback: short + long - 2.

use super::sma::rolling_std;
use super::Indicator;
use crate::domain::Bar;

pub const SQUEEZE_Z_THRESHOLD: f64 = -0.5;

#[derive(Debug, Clone)]
pub struct SqueezeZ {
    short: usize,
    long: usize,
    name: String,
}

impl SqueezeZ {
    pub fn new(short: usize, long: usize) -> Self {
        assert!(short >= 2 && long >= 2, "squeeze windows must be >= 2");
        Self {
            short,
            long,
            name: format!("squeeze_z_{short}_{long}"),
        }
    }
}

impl Default for SqueezeZ {
    fn default() -> Self {
        Self::new(20, 120)
    }
}

impl Indicator for SqueezeZ {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.short + self.long - 2
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let short_std = rolling_std(&closes, self.short);
        let n = short_std.len();
        let mut out = vec![f64::NAN; n];
        if n < self.long {
            return out;
        }
        for i in (self.long - 1)..n {
            let window = &short_std[i + 1 - self.long..=i];
            if window.iter().any(|v| v.is_nan()) {
                continue;
            }
            let mean = window.iter().sum::<f64>() / self.long as f64;
            let sd = (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.long as f64)
                .sqrt();
            out[i] = if sd > 0.0 {
                (short_std[i] - mean) / sd
            } else {
                0.0
            };
        }
        out
    }
}

/// True when the latest z-score indicates a squeeze.
pub fn is_squeeze(z: f64) -> bool {
    !z.is_nan() && z < SQUEEZE_Z_THRESHOLD
}
