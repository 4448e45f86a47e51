//! Ops health: staleness and availability of the data a row depends on.

use serde::{Deserialize, Serialize};

use super::{AgentContext, AgentError, AgentResult, AgentRow, EquityRow, LotteryRow};
use crate::oracle::OracleSignals;

pub const NAME: &str = "ops_health";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

impl Health {
    /// Record an issue; the status only ever gets worse.
    pub fn flag(&mut self, status: HealthStatus, issue: impl Into<String>) {
        self.status = self.status.max(status);
        self.issues.push(issue.into());
    }

    pub fn merge(&mut self, other: Health) {
        self.status = self.status.max(other.status);
        self.issues.extend(other.issues);
    }
}

fn oracle_issues(health: &mut Health, signals: &OracleSignals) {
    for source in &signals.missing {
        health.flag(HealthStatus::Yellow, format!("oracle source unavailable: {source}"));
    }
}

pub fn assess_lottery(row: &LotteryRow<'_>, ctx: &AgentContext<'_>) -> Health {
    let mut health = Health::default();
    if row.features.n_rows == 0 {
        health.flag(HealthStatus::Red, "no draw history");
    } else if let Some(days) = row.features.staleness_days(ctx.as_of) {
        if days > ctx.max_staleness_days {
            health.flag(HealthStatus::Yellow, format!("draw history is {days} days old"));
        }
    }
    oracle_issues(&mut health, ctx.signals);
    health
}

pub fn assess_equity(row: &EquityRow) -> Health {
    let mut health = Health::default();
    let s = &row.snapshot;
    if !s.close.is_finite() {
        health.flag(HealthStatus::Red, format!("{}: no bars", row.ticker));
    } else if !s.dist_200d.is_finite() || !s.crsi.is_finite() {
        health.flag(HealthStatus::Yellow, format!("{}: short bar history", row.ticker));
    }
    if !s.rel_benchmark.is_finite() {
        health.flag(HealthStatus::Yellow, format!("{}: no benchmark overlap", row.ticker));
    }
    health
}

pub fn score(row: &AgentRow<'_>, ctx: &AgentContext<'_>) -> Result<AgentResult, AgentError> {
    let health = match row {
        AgentRow::Lottery(lottery) => assess_lottery(lottery, ctx),
        AgentRow::Equity(equity) => assess_equity(equity),
    };
    let score = match health.status {
        HealthStatus::Green => 0.0,
        HealthStatus::Yellow => -2.0,
        HealthStatus::Red => -5.0,
    };
    let detail = if health.issues.is_empty() {
        "ok".to_string()
    } else {
        health.issues.join("; ")
    };
    Ok(AgentResult::new(NAME, score, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::*;
    use crate::domain::ProbabilitySurface;
    use crate::indicators::TechnicalSnapshot;
    use crate::rng::RngHierarchy;

    #[test]
    fn empty_history_is_red() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 0);
        let signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let h = assess_lottery(&lottery_row(&rules, &surface, &f), &context(&signals, &rng));
        assert_eq!(h.status, HealthStatus::Red);
    }

    #[test]
    fn fresh_history_is_green_and_missing_oracle_is_yellow() {
        let rules = powerball();
        let surface = ProbabilitySurface::uniform(&rules);
        let f = features(&rules, 10);
        let mut signals = OracleSignals::neutral(date());
        let rng = RngHierarchy::new(1);
        let row = lottery_row(&rules, &surface, &f);
        assert_eq!(assess_lottery(&row, &context(&signals, &rng)).status, HealthStatus::Green);

        signals.missing.push("kp".to_string());
        let h = assess_lottery(&row, &context(&signals, &rng));
        assert_eq!(h.status, HealthStatus::Yellow);
        assert_eq!(h.issues.len(), 1);
    }

    #[test]
    fn status_never_improves() {
        let mut h = Health::default();
        h.flag(HealthStatus::Red, "a");
        h.flag(HealthStatus::Yellow, "b");
        assert_eq!(h.status, HealthStatus::Red);
        let equity = EquityRow {
            ticker: "X".to_string(),
            p_up: 0.5,
            snapshot: TechnicalSnapshot::empty(),
        };
        assert_eq!(assess_equity(&equity).status, HealthStatus::Red);
    }
}
