//! Sentiment agent. No news or social feed is wired in, so it always scores
//! neutral; it stays registered so weight files and `ranked.csv` keep a
//! stable column for it.

use super::{AgentContext, AgentError, AgentResult, AgentRow};

pub const NAME: &str = "sentiment";

pub const NO_SOURCE: &str = "no source";

pub fn score(_row: &AgentRow<'_>, _ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    Ok(AgentResult::new(NAME, 0.0, NO_SOURCE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::*;
    use crate::agents::{run_all, EquityRow};
    use crate::domain::ProbabilitySurface;
    use crate::indicators::TechnicalSnapshot;
    use crate::oracle::OracleSignals;
    use crate::rng::RngHierarchy;

    #[test]
    fn registered_and_neutral_for_both_row_kinds() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 10);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(3);
        let ctx = context(&signals, &rng);
        let equity = EquityRow {
            ticker: "ABC".to_string(),
            p_up: 0.7,
            snapshot: TechnicalSnapshot::with_core(0.02, 1.5),
        };

        for results in [
            run_all(&AgentRow::Lottery(lottery_row(&rules, &surface, &f)), &ctx),
            run_all(&AgentRow::Equity(&equity), &ctx),
        ] {
            let r = results.iter().find(|r| r.name == NAME).expect("sentiment registered");
            assert_eq!(r.score, 0.0);
            assert_eq!(r.detail, NO_SOURCE);
        }
    }
}
