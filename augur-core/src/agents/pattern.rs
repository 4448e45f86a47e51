//! Pattern agent: candle shape for screener rows, surface concentration
//! for lottery runs.

use super::{AgentContext, AgentError, AgentResult, AgentRow};

pub const NAME: &str = "pattern";

pub fn score(row: &AgentRow<'_>, _ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    match row {
        AgentRow::Equity(equity) => {
            let s = &equity.snapshot;
            let mut score = 0.0;
            let mut notes = Vec::new();
            if s.close_position >= 0.8 {
                score += 2.0;
                notes.push("closed near high");
            } else if s.close_position <= 0.2 {
                score -= 2.0;
                notes.push("closed near low");
            }
            if s.range_pct < 1.0 && s.squeeze {
                score += 1.0;
                notes.push("narrow range inside squeeze");
            } else if s.range_pct > 6.0 {
                score -= 1.0;
                notes.push("wide range bar");
            }
            let detail = if notes.is_empty() {
                "no pattern".to_string()
            } else {
                notes.join(", ")
            };
            Ok(AgentResult::new(NAME, score, detail))
        }
        AgentRow::Lottery(lottery) => {
            let c = lottery.concentration();
            Ok(AgentResult::new(
                NAME,
                10.0 * (c - 1.0),
                format!("top-mass {:.4}, concentration {c:.3}", lottery.top_mass()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::*;
    use crate::agents::EquityRow;
    use crate::domain::ProbabilitySurface;
    use crate::indicators::TechnicalSnapshot;
    use crate::oracle::OracleSignals;
    use crate::rng::RngHierarchy;

    #[test]
    fn uniform_surface_scores_zero() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 0);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let r = score(&AgentRow::Lottery(lottery_row(&rules, &surface, &f)), &context(&signals, &rng)).unwrap();
        assert!(r.score.abs() < 1e-9);
    }

    #[test]
    fn strong_close_scores_positive() {
        let row = EquityRow {
            ticker: "T".to_string(),
            p_up: 0.5,
            snapshot: TechnicalSnapshot {
                close_position: 0.9,
                range_pct: 2.0,
                ..TechnicalSnapshot::empty()
            },
        };
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let r = score(&AgentRow::Equity(&row), &context(&signals, &rng)).unwrap();
        assert_eq!(r.score, 2.0);
    }
}
