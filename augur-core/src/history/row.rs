//! The `HistoryRow` trait and its two implementations: lottery draws and
//! OHLCV bars.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use super::normalize::{self, DATE, NUMBERS, SPECIAL};
use crate::domain::{Bar, DrawRow, GameRules};

/// A normalized CSV record: canonical column key → raw cell.
pub type Record = BTreeMap<String, String>;

/// Why a raw record was dropped during normalization.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("missing or unparsable date: '{0}'")]
    BadDate(String),

    #[error("only {found} legal whites, need {required}")]
    TooFewWhites { found: usize, required: usize },

    #[error("missing or invalid close price")]
    BadClose,
}

/// A date-keyed history row that the store can parse, clamp and persist.
pub trait HistoryRow: Clone + Send + Sync + Serialize + 'static {
    /// Legal-range context used for clamping (game rules for draws).
    type Bounds: Clone + PartialEq + Send + Sync + 'static;

    fn date(&self) -> NaiveDate;

    /// Header written by the store.
    fn header(bounds: &Self::Bounds) -> Vec<String>;

    /// Build a row from a normalized record, clamping to `bounds`.
    fn parse(record: &Record, bounds: &Self::Bounds) -> Result<Self, RowError>;

    /// Cells matching `header`.
    fn to_fields(&self, bounds: &Self::Bounds) -> Vec<String>;
}

fn parse_row_date(record: &Record) -> Result<NaiveDate, RowError> {
    let raw = record.get(DATE).map(String::as_str).unwrap_or("");
    normalize::parse_date(raw).ok_or_else(|| RowError::BadDate(raw.to_string()))
}

impl HistoryRow for DrawRow {
    type Bounds = GameRules;

    fn date(&self) -> NaiveDate {
        self.draw_date
    }

    fn header(rules: &GameRules) -> Vec<String> {
        let mut header = vec!["draw_date".to_string()];
        header.extend((1..=rules.k_white).map(|i| format!("w{i}")));
        if rules.has_special() {
            header.push(SPECIAL.to_string());
        }
        header
    }

    fn parse(record: &Record, rules: &GameRules) -> Result<Self, RowError> {
        let draw_date = parse_row_date(record)?;

        let mut raw_whites: Vec<u32> = Vec::new();
        let mut special_cell = record.get(SPECIAL).and_then(|s| normalize::parse_int(s));

        if let Some(cell) = record.get(NUMBERS) {
            raw_whites = normalize::split_numbers(cell);
            // "01 02 03 04 05 26": a trailing extra number is the special when
            // the file has no separate special column.
            if special_cell.is_none()
                && !record.contains_key(SPECIAL)
                && rules.has_special()
                && raw_whites.len() == rules.k_white + 1
            {
                special_cell = raw_whites.pop();
            }
        }
        if raw_whites.is_empty() {
            let mut positioned: Vec<(usize, u32)> = record
                .iter()
                .filter_map(|(k, v)| {
                    let pos = normalize::white_position(k)?;
                    Some((pos, normalize::parse_int(v)?))
                })
                .collect();
            positioned.sort_by_key(|(pos, _)| *pos);
            raw_whites = positioned.into_iter().map(|(_, v)| v).collect();
        }

        let mut whites: Vec<u32> = raw_whites
            .into_iter()
            .filter(|w| rules.white_index(*w).is_some())
            .collect();
        if !rules.replacement {
            whites.sort_unstable();
            whites.dedup();
        }
        if whites.len() < rules.k_white {
            return Err(RowError::TooFewWhites {
                found: whites.len(),
                required: rules.k_white,
            });
        }
        whites.truncate(rules.k_white);

        let special = if rules.has_special() {
            special_cell.filter(|s| rules.special_index(*s).is_some())
        } else {
            None
        };

        Ok(DrawRow::new(draw_date, whites, special))
    }

    fn to_fields(&self, rules: &GameRules) -> Vec<String> {
        let mut fields = vec![self.draw_date.format("%Y-%m-%d").to_string()];
        fields.extend(self.whites.iter().map(|w| w.to_string()));
        if rules.has_special() {
            fields.push(self.special.map(|s| s.to_string()).unwrap_or_default());
        }
        fields
    }
}

impl HistoryRow for Bar {
    type Bounds = ();

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn header(_: &()) -> Vec<String> {
        ["date", "open", "high", "low", "close", "volume"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn parse(record: &Record, _: &()) -> Result<Self, RowError> {
        let date = parse_row_date(record)?;
        let num = |key: &str| record.get(key).and_then(|s| normalize::parse_float(s));

        let close = num("close")
            .or_else(|| num("adj_close"))
            .filter(|c| *c > 0.0)
            .ok_or(RowError::BadClose)?;
        let open = num("open").filter(|o| *o > 0.0).unwrap_or(close);
        let high = num("high").unwrap_or(f64::NAN);
        let low = num("low").filter(|l| *l > 0.0).unwrap_or(f64::NAN);
        let volume = num("volume").map(|v| v.max(0.0).round() as u64).unwrap_or(0);

        Ok(Bar {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
        .clamp_range())
    }

    fn to_fields(&self, _: &()) -> Vec<String> {
        vec![
            self.date.format("%Y-%m-%d").to_string(),
            format!("{:.6}", self.open),
            format!("{:.6}", self.high),
            format!("{:.6}", self.low),
            format!("{:.6}", self.close),
            self.volume.to_string(),
        ]
    }
}
