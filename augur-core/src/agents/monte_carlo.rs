//! Monte-Carlo sampler: draws candidate sets from the tempered surface and
//! scores how tightly they cluster around the most likely ticket.

use rand::Rng;

use super::{resolve_mode, AgentContext, AgentError, AgentResult, AgentRow, LotteryRow};
use crate::domain::Pick;
use crate::rng::stream;
use crate::selector::{jaccard_distance, sample_sets, temper, tokens, Mode, SamplePlan};

pub const NAME: &str = "monte_carlo";
pub const MAX_SETS: usize = 500;
/// Bernoulli trials for screener rows.
pub const EQUITY_TRIALS: usize = 400;

/// The single most likely ticket under the surface.
pub fn modal_pick(row: &LotteryRow<'_>) -> Pick {
    let rules = row.rules;
    let mut white: Vec<u32> = if rules.replacement {
        let top = row
            .surface
            .top_whites(rules, 1)
            .first()
            .map(|(v, _)| *v)
            .unwrap_or(rules.white_min);
        vec![top; rules.k_white]
    } else {
        row.surface
            .top_whites(rules, rules.k_white)
            .into_iter()
            .map(|(v, _)| v)
            .collect()
    };
    if !rules.replacement {
        white.sort_unstable();
    }
    let special = row.surface.special.as_ref().and_then(|s| {
        let best = s
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)?;
        rules.special_value(best)
    });
    Pick::new(white, special, rules)
}

/// Candidate sets for the resolved mode.
pub fn sample_candidates(row: &LotteryRow<'_>, ctx: &AgentContext<'_>) -> (Mode, Vec<Pick>) {
    let (mode, _) = resolve_mode(ctx.mode, ctx.signals, row.jackpot);
    let (multiplier, temperature) = mode.sampling();
    let count = row.n_picks.max(1).saturating_mul(multiplier).min(MAX_SETS);
    let white = temper(&row.surface.white, temperature);
    let special = row.surface.special.as_ref().map(|s| temper(s, temperature));
    let plan = SamplePlan {
        rules: row.rules,
        white: &white,
        special: special.as_deref(),
        pmi: Some(&row.features.pmi),
        chaos: 0.0,
    };
    let mut rng_w = ctx.rng.rng_for(ctx.entity, stream::MONTE_CARLO, 0);
    let mut rng_s = ctx.rng.rng_for(ctx.entity, stream::MONTE_CARLO, 1);
    (mode, sample_sets(&plan, count, &mut rng_w, &mut rng_s))
}

pub fn score(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    match row {
        AgentRow::Lottery(lottery) => {
            let (mode, sets) = sample_candidates(lottery, ctx);
            if sets.is_empty() {
                return Err(AgentError::Failed("no candidate sets".to_string()));
            }
            let ordered = lottery.rules.ordered;
            let modal = tokens(&modal_pick(lottery), ordered);
            let consensus = sets
                .iter()
                .map(|p| 1.0 - jaccard_distance(&tokens(p, ordered), &modal))
                .sum::<f64>()
                / sets.len() as f64;
            Ok(AgentResult::new(
                NAME,
                10.0 * consensus,
                format!("sets={} mode={} consensus={consensus:.3}", sets.len(), mode.label()),
            ))
        }
        AgentRow::Equity(equity) => {
            if !equity.p_up.is_finite() {
                return Err(AgentError::MissingInput("p_up"));
            }
            let p = equity.p_up.clamp(0.0, 1.0);
            let mut rng = ctx.rng.rng_for(&equity.ticker, stream::MONTE_CARLO, 0);
            let hits = (0..EQUITY_TRIALS).filter(|_| rng.gen_bool(p)).count();
            let rate = hits as f64 / EQUITY_TRIALS as f64;
            Ok(AgentResult::new(
                NAME,
                (rate - 0.5) * 20.0,
                format!("trials={EQUITY_TRIALS} hit_rate={rate:.3}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::*;
    use crate::domain::{GameRules, ProbabilitySurface};
    use crate::oracle::OracleSignals;
    use crate::rng::RngHierarchy;

    #[test]
    fn pool_size_follows_mode() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 10);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(4);
        let mut ctx = context(&signals, &rng);
        let row = lottery_row(&rules, &surface, &f);

        ctx.mode = Mode::Rainbow;
        let (mode, sets) = sample_candidates(&row, &ctx);
        assert_eq!(mode, Mode::Rainbow);
        assert_eq!(sets.len(), 25);

        ctx.mode = Mode::MostLikely;
        assert_eq!(sample_candidates(&row, &ctx).1.len(), 10);
    }

    #[test]
    fn modal_pick_for_digits_repeats_top_digit() {
        let rules = GameRules::preset("pick3").unwrap();
        let mut white = vec![0.05; 10];
        white[4] = 0.55;
        let surface = ProbabilitySurface {
            white,
            special: None,
        };
        let f = features(&powerball(), 0);
        let row = LotteryRow {
            game: "pick3",
            rules: &rules,
            ..lottery_row(&rules, &surface, &f)
        };
        assert_eq!(modal_pick(&row).white, vec![4, 4, 4]);
    }

    #[test]
    fn same_seed_same_score() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 10);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(4);
        let ctx = context(&signals, &rng);
        let row = AgentRow::Lottery(lottery_row(&rules, &surface, &f));
        assert_eq!(score(&row, &ctx).unwrap(), score(&row, &ctx).unwrap());
    }
}
