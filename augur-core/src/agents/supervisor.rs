//! Supervisor: picks the run mode from space weather, alignment, jackpot
//! size and the market regime.

use super::{AgentContext, AgentError, AgentResult, AgentRow};
use crate::oracle::{MarketRegime, OracleSignals};
use crate::selector::Mode;

pub const NAME: &str = "supervisor";

pub const STORM_KP: f64 = 5.0;
pub const STORM_FLARES: u32 = 3;
pub const ALIGNMENT_Z: f64 = 1.0;
/// Jackpots at or above this draw a crowd; spread the tickets out.
pub const HIGH_JACKPOT: f64 = 500_000_000.0;

/// Resolve `requested` to a concrete mode, with the reason.
pub fn resolve_mode(requested: Mode, signals: &OracleSignals, jackpot: Option<f64>) -> (Mode, &'static str) {
    if requested != Mode::Auto {
        return (requested, "requested");
    }
    if signals.kp_or_quiet() >= STORM_KP || signals.flare_mx_72h >= STORM_FLARES {
        return (Mode::Rainbow, "geomagnetic or flare activity");
    }
    if signals.alignment_z() >= ALIGNMENT_Z {
        return (Mode::OracleForward, "strong alignment");
    }
    if jackpot.is_some_and(|j| j >= HIGH_JACKPOT) {
        return (Mode::Rainbow, "high jackpot");
    }
    if signals.regime() == MarketRegime::Stressed {
        return (Mode::Rainbow, "stressed regime");
    }
    (Mode::MostLikely, "baseline")
}

pub fn score(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    let AgentRow::Lottery(lottery) = row else {
        return Ok(AgentResult::not_applicable(NAME));
    };
    let (mode, reason) = resolve_mode(ctx.mode, ctx.signals, lottery.jackpot);
    Ok(AgentResult::new(NAME, 0.0, format!("mode={} ({reason})", mode.label())))
}
