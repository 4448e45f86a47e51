//! Breakout probability for the equities screener.

use crate::indicators::TechnicalSnapshot;

/// Bounds on the predicted probability.
pub const P_UP_MIN: f64 = 0.05;
pub const P_UP_MAX: f64 = 0.95;

fn or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Logistic `P_up` from the technical snapshot. Missing inputs contribute
/// nothing, so an empty snapshot yields 0.5.
pub fn breakout_probability(s: &TechnicalSnapshot) -> f64 {
    let mut z = 0.0;
    if s.rsi2.is_finite() {
        if s.rsi2 < 10.0 {
            z += 0.4;
        } else if s.rsi2 > 90.0 {
            z -= 0.3;
        }
    }
    let dist = or_zero(s.dist_200d);
    if dist > 0.0 {
        z += 0.3;
    } else if dist < 0.0 {
        z -= 0.3;
    }
    z += 0.5 * (or_zero(s.rel_benchmark) * 10.0).clamp(-1.0, 1.0);
    if s.rvol.is_finite() {
        z += 0.3 * (s.rvol - 1.0).clamp(-1.0, 1.0);
    }
    if s.squeeze {
        z += 0.2;
    }
    (1.0 / (1.0 + (-z).exp())).clamp(P_UP_MIN, P_UP_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_coin_flip() {
        assert!((breakout_probability(&TechnicalSnapshot::empty()) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn strength_raises_probability() {
        let strong = TechnicalSnapshot::with_core(0.05, 1.8);
        let weak = TechnicalSnapshot::with_core(-0.05, 0.5);
        assert!(breakout_probability(&strong) > 0.5);
        assert!(breakout_probability(&weak) < 0.5);
    }
}
