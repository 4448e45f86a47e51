//! Volatility agent: penalizes wide ranges, high ATR and low RVOL, and the
//! chaos mix on lottery runs.

use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::probability::MAX_CHAOS;

pub const NAME: &str = "volatility";

pub fn score(row: &AgentRow<'_>, _ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    match row {
        AgentRow::Equity(equity) => {
            let s = &equity.snapshot;
            let mut score = 0.0;
            if s.range_pct > 5.0 {
                score -= 2.0;
            } else if s.range_pct > 3.0 {
                score -= 1.0;
            }
            if s.rvol < 0.8 {
                score -= 1.5;
            }
            let atr_pct = s.atr14 / s.close;
            if atr_pct > 0.05 {
                score -= 1.0;
            }
            if s.squeeze {
                score += 1.0;
            }
            Ok(AgentResult::new(
                NAME,
                score,
                format!("range={:.2}% atr={:.2}% rvol={:.2}", s.range_pct, atr_pct * 100.0, s.rvol),
            ))
        }
        AgentRow::Lottery(lottery) => Ok(AgentResult::new(
            NAME,
            -4.0 * lottery.chaos / MAX_CHAOS,
            format!("chaos={:.3}", lottery.chaos),
        )),
    }
}
