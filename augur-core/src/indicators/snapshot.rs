//! Latest-bar technical snapshot for one ticker.

use serde::Serialize;

use super::squeeze::is_squeeze;
use super::{relative_strength, Atr, ConnorsRsi, Indicator, Rsi, Rvol, SmaDistance, SqueezeZ};
use crate::domain::Bar;

/// Bars used for relative strength.
pub const REL_STRENGTH_LOOKBACK: usize = 20;

/// Latest indicator values for a ticker. NaN means "not enough history".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalSnapshot {
    pub close: f64,
    pub rsi2: f64,
    pub rsi4: f64,
    pub crsi: f64,
    pub atr14: f64,
    pub rvol: f64,
    /// Return vs benchmark over `REL_STRENGTH_LOOKBACK` bars (fraction).
    pub rel_benchmark: f64,
    /// Distance from the 200-bar SMA (fraction).
    pub dist_200d: f64,
    pub squeeze_z: f64,
    pub squeeze: bool,
    /// Last bar's close-to-close change, percent.
    pub change_pct: f64,
    /// Last bar's high-low range as a percent of close.
    pub range_pct: f64,
    /// Where the close sits in the bar's range, 0 = low, 1 = high.
    pub close_position: f64,
}

impl TechnicalSnapshot {
    /// Snapshot of the last bar. `benchmark` may be empty.
    pub fn from_bars(bars: &[Bar], benchmark: &[Bar]) -> Self {
        let Some(last) = bars.last() else {
            return Self::empty();
        };
        let change_pct = match bars.len() {
            n if n >= 2 && bars[n - 2].close > 0.0 => (last.close / bars[n - 2].close - 1.0) * 100.0,
            _ => f64::NAN,
        };
        let range = last.high - last.low;
        let squeeze_z = SqueezeZ::default().latest(bars);

        Self {
            close: last.close,
            rsi2: Rsi::new(2).latest(bars),
            rsi4: Rsi::new(4).latest(bars),
            crsi: ConnorsRsi::default().latest(bars),
            atr14: Atr::new(14).latest(bars),
            rvol: Rvol::new(20).latest(bars),
            rel_benchmark: relative_strength(bars, benchmark, REL_STRENGTH_LOOKBACK)
                .last()
                .copied()
                .unwrap_or(f64::NAN),
            dist_200d: SmaDistance::new(200).latest(bars),
            squeeze_z,
            squeeze: is_squeeze(squeeze_z),
            change_pct,
            range_pct: if last.close > 0.0 {
                range / last.close * 100.0
            } else {
                f64::NAN
            },
            close_position: if range > 0.0 {
                ((last.close - last.low) / range).clamp(0.0, 1.0)
            } else {
                0.5
            },
        }
    }

    /// All-NaN snapshot for a ticker without bars.
    pub fn empty() -> Self {
        Self {
            close: f64::NAN,
            rsi2: f64::NAN,
            rsi4: f64::NAN,
            crsi: f64::NAN,
            atr14: f64::NAN,
            rvol: f64::NAN,
            rel_benchmark: f64::NAN,
            dist_200d: f64::NAN,
            squeeze_z: f64::NAN,
            squeeze: false,
            change_pct: f64::NAN,
            range_pct: f64::NAN,
            close_position: f64::NAN,
        }
    }

    /// Snapshot carrying only relative strength and RVOL (everything else NaN).
    /// Used when a caller supplies precomputed rows instead of bars.
    pub fn with_core(rel_benchmark: f64, rvol: f64) -> Self {
        Self {
            rel_benchmark,
            rvol,
            ..Self::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn empty_bars_give_nan_snapshot() {
        let s = TechnicalSnapshot::from_bars(&[], &[]);
        assert!(s.close.is_nan());
        assert!(!s.squeeze);
    }

    #[test]
    fn long_history_fills_every_field() {
        let closes: Vec<f64> = (0..260)
            .map(|i| 100.0 + (i as f64 * 0.2).sin() * 3.0 + i as f64 * 0.2)
            .collect();
        let bars = make_bars(&closes);
        let bench = make_bars(&vec![400.0; 260]);
        let s = TechnicalSnapshot::from_bars(&bars, &bench);
        for (name, v) in [
            ("rsi2", s.rsi2),
            ("rsi4", s.rsi4),
            ("crsi", s.crsi),
            ("atr14", s.atr14),
            ("rvol", s.rvol),
            ("rel", s.rel_benchmark),
            ("dist", s.dist_200d),
            ("sqz", s.squeeze_z),
            ("chg", s.change_pct),
            ("range", s.range_pct),
        ] {
            assert!(v.is_finite(), "{name} not finite");
        }
        assert!(s.dist_200d > 0.0, "uptrend should sit above the 200d average");
        assert!((0.0..=1.0).contains(&s.close_position));
        assert!((s.rvol - 1.0).abs() < 1e-12);
    }
}
