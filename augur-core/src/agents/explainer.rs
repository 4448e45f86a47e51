//! Explainer agent: wraps the explainer contract; the rating becomes a
//! score around the neutral 3.0.

use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::explain::{explain_equity, explain_lottery, NEUTRAL_RATING};

pub const NAME: &str = "explainer";

pub fn score(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    let explanation = match row {
        AgentRow::Lottery(lottery) => explain_lottery(lottery, ctx.signals),
        AgentRow::Equity(equity) => explain_equity(equity),
    };
    Ok(AgentResult::new(
        NAME,
        2.0 * (explanation.rating - NEUTRAL_RATING),
        explanation.headline,
    ))
}
