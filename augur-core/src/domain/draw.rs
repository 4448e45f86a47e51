//! DrawRow — one historical lottery draw.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A normalized draw. Whites keep their source order for ordered games and
/// are sorted ascending otherwise; a missing special is `None`, never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRow {
    pub draw_date: NaiveDate,
    pub whites: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<u32>,
}

impl DrawRow {
    pub fn new(draw_date: NaiveDate, whites: Vec<u32>, special: Option<u32>) -> Self {
        Self {
            draw_date,
            whites,
            special,
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.whites.contains(&value)
    }
}
