//! Pairwise pointwise mutual information over draw co-occurrence.

use std::collections::BTreeMap;

use crate::domain::{DrawRow, GameRules};

/// Sparse `(a, b) → log(p(a,b) / (p(a)·p(b)))` with `a < b`, keyed by white
/// value. Pairs that never co-occurred are absent and read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairPmi {
    pairs: BTreeMap<(u32, u32), f64>,
}

impl PairPmi {
    pub fn from_rows(rows: &[DrawRow], rules: &GameRules) -> Self {
        let n = rows.len();
        if n == 0 {
            return Self::default();
        }
        let mut single: BTreeMap<u32, usize> = BTreeMap::new();
        let mut joint: BTreeMap<(u32, u32), usize> = BTreeMap::new();

        for row in rows {
            let mut whites: Vec<u32> = row
                .whites
                .iter()
                .copied()
                .filter(|w| rules.white_index(*w).is_some())
                .collect();
            whites.sort_unstable();
            whites.dedup();
            for (i, &a) in whites.iter().enumerate() {
                *single.entry(a).or_default() += 1;
                for &b in &whites[i + 1..] {
                    *joint.entry((a, b)).or_default() += 1;
                }
            }
        }

        let n = n as f64;
        let pairs = joint
            .into_iter()
            .filter_map(|((a, b), c)| {
                let pa = *single.get(&a)? as f64 / n;
                let pb = *single.get(&b)? as f64 / n;
                let pab = c as f64 / n;
                Some(((a, b), (pab / (pa * pb)).ln()))
            })
            .collect();
        Self { pairs }
    }

    /// PMI for an unordered pair; 0 when unseen or `a == b`.
    pub fn get(&self, a: u32, b: u32) -> f64 {
        let key = if a < b { (a, b) } else { (b, a) };
        self.pairs.get(&key).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
