//! Pick — one suggested ticket.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::rules::GameRules;

/// A suggested ticket.
///
/// Whites are sorted and unique for ordinary games. Games drawn with
/// replacement keep draw order and carry `ordered=true, replacement=true`
/// in `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub white: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<u32>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Pick {
    pub fn new(white: Vec<u32>, special: Option<u32>, rules: &GameRules) -> Self {
        let mut meta = BTreeMap::new();
        if rules.replacement {
            meta.insert("ordered".to_string(), serde_json::Value::Bool(rules.ordered));
            meta.insert("replacement".to_string(), serde_json::Value::Bool(true));
        }
        Self {
            white,
            special,
            meta,
        }
    }

    /// Canonical sorted key used for duplicate detection and tie-breaking.
    pub fn key(&self) -> (Vec<u32>, Option<u32>) {
        (self.white.clone(), self.special)
    }

    /// Check the pick against the game rules.
    pub fn is_legal(&self, rules: &GameRules) -> bool {
        if self.white.len() != rules.k_white {
            return false;
        }
        if self.white.iter().any(|w| rules.white_index(*w).is_none()) {
            return false;
        }
        if !rules.replacement {
            let sorted = self.white.windows(2).all(|w| w[0] < w[1]);
            if !sorted {
                return false;
            }
        }
        match (self.special, rules.has_special()) {
            (Some(s), true) => rules.special_index(s).is_some(),
            (None, false) => true,
            _ => false,
        }
    }
}
