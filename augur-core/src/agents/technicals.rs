//! Technicals agent: RSI, ConnorsRSI, RVOL, relative strength, day change
//! and squeeze state.

use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::indicators::TechnicalSnapshot;

pub const NAME: &str = "technicals";

/// Score and the contributing terms. NaN indicators contribute nothing.
pub fn technical_score(s: &TechnicalSnapshot) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut terms = Vec::new();
    let mut add = |delta: f64, label: String| {
        score += delta;
        terms.push(format!("{label} {delta:+.1}"));
    };

    if s.rsi2 < 10.0 {
        add(3.0, format!("rsi2={:.0}", s.rsi2));
    } else if s.rsi2 > 90.0 {
        add(-2.0, format!("rsi2={:.0}", s.rsi2));
    }
    if s.crsi < 15.0 {
        add(2.0, format!("crsi={:.0}", s.crsi));
    } else if s.crsi > 85.0 {
        add(-1.5, format!("crsi={:.0}", s.crsi));
    }
    if s.rvol >= 1.5 {
        add(2.0, format!("rvol={:.2}", s.rvol));
    } else if s.rvol < 0.7 {
        add(-1.0, format!("rvol={:.2}", s.rvol));
    }
    if s.rel_benchmark.is_finite() {
        add((s.rel_benchmark * 100.0).clamp(-3.0, 3.0), format!("rel={:+.3}", s.rel_benchmark));
    }
    if s.change_pct > 3.0 {
        add(-1.0, format!("chg={:+.1}%", s.change_pct));
    } else if s.change_pct < -3.0 {
        add(1.0, format!("chg={:+.1}%", s.change_pct));
    }
    if s.squeeze {
        add(1.5, "squeeze".to_string());
    }
    (score, terms)
}

pub fn score(row: &AgentRow<'_>, _ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    let AgentRow::Equity(equity) = row else {
        return Ok(AgentResult::not_applicable(NAME));
    };
    let (score, terms) = technical_score(&equity.snapshot);
    let detail = if terms.is_empty() {
        "no signal".to_string()
    } else {
        terms.join(", ")
    };
    Ok(AgentResult::new(NAME, score, detail))
}
