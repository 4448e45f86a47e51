//! Oracle agent: reads the signal bundle and proposes a global gain.

use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::oracle::lunar::illumination;
use crate::oracle::{MarketRegime, OracleSignals};

pub const NAME: &str = "oracle";
pub const GAIN_RANGE: (f64, f64) = (1.0, 2.5);

/// Gain in [1.0, 2.5]. NaN inputs contribute nothing.
pub fn oracle_gain(s: &OracleSignals) -> f64 {
    let kp = s.kp_or_quiet() / 9.0;
    let flares = s.flare_mx_72h.min(5) as f64 / 5.0;
    let align = if s.alignment_index.is_finite() {
        s.alignment_z().clamp(0.0, 2.0) / 2.0
    } else {
        0.0
    };
    let moon = if s.lunar_phase.is_finite() {
        illumination(s.lunar_phase)
    } else {
        0.0
    };
    let retro = if s.mercury_retro { 0.1 } else { 0.0 };
    (1.0 + 0.5 * kp + 0.4 * flares + 0.4 * align + 0.2 * moon + retro).clamp(GAIN_RANGE.0, GAIN_RANGE.1)
}

pub fn score(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    let s = ctx.signals;
    let gain = oracle_gain(s);
    let detail = format!(
        "gain={gain:.3} kp={:.1} flares={} align_z={:.2} regime={:?}",
        s.kp_or_quiet(),
        s.flare_mx_72h,
        s.alignment_z(),
        s.regime()
    );
    let score = match row {
        AgentRow::Lottery(_) => 4.0 * (gain - 1.0),
        AgentRow::Equity(_) => {
            let regime = match s.regime() {
                MarketRegime::Calm => 1.0,
                MarketRegime::Normal | MarketRegime::Unknown => 0.0,
                MarketRegime::Stressed => -2.0,
            };
            regime - (gain - 1.0)
        }
    };
    Ok(AgentResult::new(NAME, score, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::date;

    #[test]
    fn gain_is_bounded() {
        let mut s = OracleSignals::neutral(date());
        s.lunar_phase = 0.0;
        assert!((oracle_gain(&s) - 1.0).abs() < 1e-9);

        s.kp_3h_max = 9.0;
        s.flare_mx_72h = 10;
        s.alignment_index = 1.0;
        s.lunar_phase = 0.5;
        s.mercury_retro = true;
        assert_eq!(oracle_gain(&s), 2.5);
    }

    #[test]
    fn nan_inputs_are_neutral() {
        let mut s = OracleSignals::neutral(date());
        s.lunar_phase = f64::NAN;
        s.alignment_index = f64::NAN;
        assert_eq!(oracle_gain(&s), 1.0);
    }
}
