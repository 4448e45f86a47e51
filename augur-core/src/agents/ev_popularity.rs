//! EV / popularity agent. Popular tickets split the prize, so popularity is
//! a penalty. The popularity scorer is off unless the run asks for it.

use super::monte_carlo::modal_pick;
use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::selector::Popularity;

pub const NAME: &str = "ev_popularity";

pub fn score(row: &AgentRow<'_>, _ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    match row {
        AgentRow::Lottery(lottery) => {
            if lottery.popularity == Popularity::Off {
                return Ok(AgentResult::new(NAME, 0.0, "popularity off"));
            }
            let pick = modal_pick(lottery);
            let popularity = lottery.popularity.score(&pick);
            Ok(AgentResult::new(
                NAME,
                -10.0 * popularity,
                format!("modal {:?} popularity={popularity:.2}", pick.white),
            ))
        }
        AgentRow::Equity(equity) => {
            if !equity.p_up.is_finite() {
                return Err(AgentError::MissingInput("p_up"));
            }
            let edge = 2.0 * equity.p_up - 1.0;
            Ok(AgentResult::new(NAME, 10.0 * edge, format!("edge={edge:+.3}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::*;
    use crate::domain::ProbabilitySurface;
    use crate::oracle::OracleSignals;
    use crate::rng::RngHierarchy;

    #[test]
    fn off_by_default() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 0);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let r = score(&AgentRow::Lottery(lottery_row(&rules, &surface, &f)), &context(&signals, &rng)).unwrap();
        assert_eq!(r.score, 0.0);
        assert_eq!(r.detail, "popularity off");
    }

    #[test]
    fn heuristic_penalizes_calendar_numbers() {
        let rules = powerball();
        // Uniform ties resolve to the lowest values: 1..=5, a popular ticket.
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 0);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let mut row = lottery_row(&rules, &surface, &f);
        row.popularity = Popularity::Heuristic;
        let r = score(&AgentRow::Lottery(row), &context(&signals, &rng)).unwrap();
        assert!(r.score < -5.0);
    }
}
