//! Explainer contract: a structured "why" for a row.
//!
//! Ratings start at a neutral 3.0 and each rule nudges them by 0.25 or 0.5.
//! The result is clamped to [1, 5] and rounded to half steps. A language
//! model can add free text, but only under `context["narrative"]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::{EquityRow, LotteryRow};
use crate::oracle::OracleSignals;

pub const NEUTRAL_RATING: f64 = 3.0;
pub const MAX_REASONS: usize = 5;
pub const MIN_HINTS: usize = 3;

/// Context key holding short run-context hints (mode, staleness, chaos).
pub const HINTS_KEY: &str = "hints";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub headline: String,
    pub rating: f64,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl Explanation {
    /// Three to five short hints, pros first. With fewer than three
    /// reasons the headline leads and context hints fill the rest, then
    /// the rating.
    pub fn why_hints(&self) -> Vec<String> {
        let mut hints: Vec<String> = self
            .pros
            .iter()
            .chain(&self.cons)
            .take(MAX_REASONS)
            .cloned()
            .collect();
        if hints.len() < MIN_HINTS {
            hints.insert(0, self.headline.clone());
            let filler = self
                .context_hints()
                .into_iter()
                .chain(std::iter::once(format!("rating {:.1}/5", self.rating)));
            for hint in filler {
                if hints.len() >= MIN_HINTS {
                    break;
                }
                if !hints.contains(&hint) {
                    hints.push(hint);
                }
            }
        }
        hints
    }

    /// Append a run-context hint under `context["hints"]`.
    pub fn add_hint(&mut self, hint: impl Into<String>) {
        let entry = self
            .context
            .entry(HINTS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(hint.into()));
        }
    }

    pub fn context_hints(&self) -> Vec<String> {
        match self.context.get(HINTS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Plain-text rendering used for `explain.txt`.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\nrating: {:.1}/5\n", self.headline, self.rating);
        for p in &self.pros {
            out.push_str(&format!("+ {p}\n"));
        }
        for c in &self.cons {
            out.push_str(&format!("- {c}\n"));
        }
        if let Some(Value::String(n)) = self.context.get("narrative") {
            out.push('\n');
            out.push_str(n);
            out.push('\n');
        }
        out
    }
}

/// Opaque text generator. Returning `None` is the normal case.
pub trait LanguageModel: Send + Sync {
    fn infer(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Option<String>;
}

/// Attach a narrative from `model`; the structured fields are never touched.
pub fn narrate(explanation: &mut Explanation, model: &dyn LanguageModel) {
    let prompt = format!(
        "Summarize in two sentences.\nHeadline: {}\nPros: {}\nCons: {}",
        explanation.headline,
        explanation.pros.join("; "),
        explanation.cons.join("; "),
    );
    if let Some(text) = model.infer(&prompt, 120, 0.2) {
        let text = text.trim();
        if !text.is_empty() {
            explanation
                .context
                .insert("narrative".to_string(), Value::String(text.to_string()));
        }
    }
}

struct Tally {
    adjust: f64,
    pros: Vec<String>,
    cons: Vec<String>,
}

impl Tally {
    fn new() -> Self {
        Self {
            adjust: 0.0,
            pros: Vec::new(),
            cons: Vec::new(),
        }
    }

    fn pro(&mut self, delta: f64, text: String) {
        self.adjust += delta;
        self.pros.push(text);
    }

    fn con(&mut self, delta: f64, text: String) {
        self.adjust -= delta;
        self.cons.push(text);
    }

    fn rating(&self) -> f64 {
        let r = (NEUTRAL_RATING + self.adjust).clamp(1.0, 5.0);
        (r * 2.0).round() / 2.0
    }

    fn finish(mut self, headline: String, context: BTreeMap<String, Value>) -> Explanation {
        let rating = self.rating();
        self.pros.truncate(MAX_REASONS);
        self.cons.truncate(MAX_REASONS);
        Explanation {
            headline,
            rating,
            pros: self.pros,
            cons: self.cons,
            context,
        }
    }
}

fn tone(rating: f64) -> &'static str {
    if rating >= 4.0 {
        "constructive"
    } else if rating >= 3.0 {
        "mixed"
    } else {
        "weak"
    }
}

/// Screener row explanation.
pub fn explain_equity(row: &EquityRow) -> Explanation {
    let s = &row.snapshot;
    let mut t = Tally::new();

    if s.rsi2 < 10.0 {
        t.pro(0.5, format!("RSI(2) deeply oversold at {:.1}", s.rsi2));
    } else if s.rsi2 > 90.0 {
        t.con(0.5, format!("RSI(2) overbought at {:.1}", s.rsi2));
    }
    if s.rsi4 < 20.0 {
        t.pro(0.25, format!("RSI(4) oversold at {:.1}", s.rsi4));
    } else if s.rsi4 > 80.0 {
        t.con(0.25, format!("RSI(4) stretched at {:.1}", s.rsi4));
    }
    if s.crsi < 15.0 {
        t.pro(0.5, format!("ConnorsRSI washed out at {:.1}", s.crsi));
    } else if s.crsi > 85.0 {
        t.con(0.25, format!("ConnorsRSI elevated at {:.1}", s.crsi));
    }
    if s.rel_benchmark > 0.01 {
        t.pro(0.5, format!("outperforming benchmark by {:+.1}%", s.rel_benchmark * 100.0));
    } else if s.rel_benchmark < -0.01 {
        t.con(0.5, format!("lagging benchmark by {:+.1}%", s.rel_benchmark * 100.0));
    }
    if s.rvol >= 2.0 {
        t.pro(0.5, format!("heavy volume, RVOL {:.2}", s.rvol));
    } else if s.rvol >= 1.5 {
        t.pro(0.25, format!("volume expanding, RVOL {:.2}", s.rvol));
    } else if s.rvol < 0.7 {
        t.con(0.25, format!("thin volume, RVOL {:.2}", s.rvol));
    }
    if s.squeeze {
        t.pro(0.5, format!("volatility squeeze (z {:.2})", s.squeeze_z));
    }
    if s.change_pct > 5.0 {
        t.con(0.25, format!("extended after a {:+.1}% day", s.change_pct));
    } else if s.change_pct < -5.0 {
        t.con(0.5, format!("heavy selling, {:+.1}% on the day", s.change_pct));
    }
    if s.dist_200d > 0.0 {
        t.pro(0.25, format!("{:.1}% above the 200-day average", s.dist_200d * 100.0));
    } else if s.dist_200d < 0.0 {
        t.con(0.5, format!("{:.1}% below the 200-day average", -s.dist_200d * 100.0));
    }
    if row.p_up >= 0.6 {
        t.pro(0.25, format!("breakout odds {:.0}%", row.p_up * 100.0));
    } else if row.p_up <= 0.4 {
        t.con(0.25, format!("breakout odds only {:.0}%", row.p_up * 100.0));
    }

    let rating = t.rating();
    let headline = format!(
        "{}: {} setup, P_up {:.2}",
        row.ticker,
        tone(rating),
        row.p_up
    );
    let mut context = BTreeMap::new();
    context.insert("ticker".to_string(), json!(row.ticker));
    context.insert("p_up".to_string(), json!(row.p_up));
    let mut e = t.finish(headline, context);
    e.add_hint(format!("P_up {:.2}", row.p_up));
    if s.rsi2.is_finite() && s.rvol.is_finite() {
        e.add_hint(format!("RSI(2) {:.1}, RVOL {:.2}", s.rsi2, s.rvol));
    } else {
        e.add_hint("no price history");
    }
    e
}

/// Lottery run explanation over the probability surface, history depth and
/// the oracle state.
pub fn explain_lottery(row: &LotteryRow<'_>, signals: &OracleSignals) -> Explanation {
    let mut t = Tally::new();
    let rules = row.rules;
    let k = rules.k_white.min(rules.white_len());
    let uniform_mass = k as f64 / rules.white_len().max(1) as f64;
    let mass = row.top_mass();
    let ratio = if uniform_mass > 0.0 { mass / uniform_mass } else { 1.0 };

    if ratio >= 1.25 {
        t.pro(
            0.5,
            format!("top {k} carry {:.1}% of the mass vs {:.1}% uniform", mass * 100.0, uniform_mass * 100.0),
        );
    } else if ratio <= 1.02 {
        t.con(0.25, "surface is close to uniform".to_string());
    }

    let n = row.features.n_rows;
    if n == 0 {
        t.con(0.5, "no draw history; surface is uniform".to_string());
    } else if n < 20 {
        t.con(0.5, format!("short history ({n} draws)"));
    } else if n >= 100 {
        t.pro(0.25, format!("deep history ({n} draws)"));
    }
    if let Some(days) = row.features.staleness_days(signals.date) {
        if days > 14 {
            t.con(0.25, format!("history is {days} days old"));
        }
    }

    if signals.kp_or_quiet() >= 5.0 {
        t.con(0.25, format!("geomagnetic storm (Kp {:.1}); chaos raised", signals.kp_3h_max));
    }
    if signals.alignment_z() >= 1.0 {
        t.pro(0.25, format!("strong alignment (index {:.2})", signals.alignment_index));
    }
    if signals.mercury_retro {
        t.con(0.25, "Mercury retrograde".to_string());
    }
    if row.chaos > 0.25 {
        t.con(0.25, format!("high chaos mix ({:.2})", row.chaos));
    }
    if !signals.missing.is_empty() {
        t.con(0.25, format!("oracle sources missing: {}", signals.missing.join(", ")));
    }

    let rating = t.rating();
    let top: Vec<u32> = row
        .surface
        .top_whites(rules, k)
        .into_iter()
        .map(|(v, _)| v)
        .collect();
    let headline = format!("{} numbers: {} signal, leaning {:?}", row.game, tone(rating), top);
    let mut context = BTreeMap::new();
    context.insert("top_whites".to_string(), json!(top));
    context.insert("concentration".to_string(), json!(ratio));
    context.insert("history_rows".to_string(), json!(n));
    let mut e = t.finish(headline, context);
    e.add_hint(format!("chaos mix {:.2}", row.chaos));
    match row.features.staleness_days(signals.date) {
        Some(days) => e.add_hint(format!("{n} draws, last {days} days ago")),
        None => e.add_hint("no draw history"),
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::TechnicalSnapshot;

    fn equity(p_up: f64, snapshot: TechnicalSnapshot) -> EquityRow {
        EquityRow {
            ticker: "ABC".to_string(),
            p_up,
            snapshot,
        }
    }

    #[test]
    fn empty_snapshot_is_neutral() {
        let e = explain_equity(&equity(0.5, TechnicalSnapshot::empty()));
        assert_eq!(e.rating, 3.0);
        assert!(e.pros.is_empty() && e.cons.is_empty());
        assert!(e.headline.starts_with("ABC"));
    }

    #[test]
    fn bullish_rules_raise_rating() {
        let snap = TechnicalSnapshot {
            rsi2: 5.0,
            crsi: 10.0,
            squeeze: true,
            squeeze_z: -1.0,
            dist_200d: 0.05,
            ..TechnicalSnapshot::with_core(0.03, 2.5)
        };
        let e = explain_equity(&equity(0.7, snap));
        assert!(e.rating >= 4.5);
        assert!(e.pros.len() <= MAX_REASONS);
        assert_eq!((e.rating * 2.0).fract(), 0.0);
    }

    #[test]
    fn bearish_rules_floor_at_one() {
        let snap = TechnicalSnapshot {
            rsi2: 99.0,
            rsi4: 95.0,
            crsi: 95.0,
            change_pct: -8.0,
            dist_200d: -0.2,
            ..TechnicalSnapshot::with_core(-0.05, 0.3)
        };
        let e = explain_equity(&equity(0.2, snap));
        assert!(e.rating >= 1.0 && e.rating <= 2.0);
        assert!(e.cons.len() <= MAX_REASONS);
    }

    struct Echo;
    impl LanguageModel for Echo {
        fn infer(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> Option<String> {
            Some("  steady  ".to_string())
        }
    }

    struct Silent;
    impl LanguageModel for Silent {
        fn infer(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> Option<String> {
            None
        }
    }

    #[test]
    fn narrative_only_touches_context() {
        let base = explain_equity(&equity(0.5, TechnicalSnapshot::empty()));
        let mut with = base.clone();
        narrate(&mut with, &Echo);
        assert_eq!(with.context.get("narrative"), Some(&json!("steady")));
        assert_eq!((with.rating, &with.pros, &with.cons), (base.rating, &base.pros, &base.cons));

        let mut none = base.clone();
        narrate(&mut none, &Silent);
        assert_eq!(none, base);
    }

    #[test]
    fn hints_are_padded_to_three() {
        let e = explain_equity(&equity(0.5, TechnicalSnapshot::empty()));
        let hints = e.why_hints();
        assert_eq!(hints.len(), MIN_HINTS);
        assert_eq!(hints[0], e.headline);
        assert_eq!(hints[1], "P_up 0.50");
        assert_eq!(hints[2], "no price history");
    }

    #[test]
    fn rating_fills_when_context_is_thin() {
        let mut e = explain_equity(&equity(0.5, TechnicalSnapshot::empty()));
        e.context.remove(HINTS_KEY);
        assert_eq!(e.why_hints(), vec![e.headline.clone(), "rating 3.0/5".to_string()]);
        e.add_hint("mode most_likely");
        let hints = e.why_hints();
        assert_eq!(hints.len(), 3);
        assert_eq!(hints[1], "mode most_likely");
    }

    #[test]
    fn many_reasons_are_capped_at_five() {
        let snap = TechnicalSnapshot {
            rsi2: 99.0,
            rsi4: 95.0,
            crsi: 95.0,
            change_pct: -8.0,
            dist_200d: -0.2,
            ..TechnicalSnapshot::with_core(-0.05, 0.3)
        };
        let hints = explain_equity(&equity(0.2, snap)).why_hints();
        assert!((MIN_HINTS..=MAX_REASONS).contains(&hints.len()));
    }
}
