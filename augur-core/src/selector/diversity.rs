//! Coverage diversification by pairwise Jaccard distance.

use std::collections::BTreeSet;

use crate::domain::Pick;

/// Token set used for distance. Ordered games compare `(position, digit)`
/// so that 1-2-3 and 3-2-1 count as different tickets.
pub type Tokens = BTreeSet<(u32, u32)>;

pub fn tokens(pick: &Pick, ordered: bool) -> Tokens {
    pick.white
        .iter()
        .enumerate()
        .map(|(i, v)| if ordered { (i as u32, *v) } else { (0, *v) })
        .collect()
}

/// `1 − |A∩B| / |A∪B|`; two empty sets are at distance 0.
pub fn jaccard_distance(a: &Tokens, b: &Tokens) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    1.0 - a.intersection(b).count() as f64 / union as f64
}

/// Average pairwise distance; 0 for fewer than two sets.
pub fn mean_pairwise_distance(sets: &[Tokens]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            total += jaccard_distance(a, b);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Indices chosen from a ranked candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diversified {
    pub chosen: Vec<usize>,
    /// True when the target could not be met and `chosen` is the ranked prefix.
    pub fallback: bool,
}

/// Greedy pass over `ranked` (best first): keep a set only if it is at least
/// `target` away from everything already kept. If fewer than `m` survive,
/// return the first `m` ranked sets and raise the flag.
pub fn diversify(ranked: &[Tokens], m: usize, target: f64) -> Diversified {
    let mut chosen: Vec<usize> = Vec::with_capacity(m);
    for (i, set) in ranked.iter().enumerate() {
        if chosen.len() == m {
            break;
        }
        if chosen
            .iter()
            .all(|&c| jaccard_distance(&ranked[c], set) >= target)
        {
            chosen.push(i);
        }
    }
    if chosen.len() < m {
        return Diversified {
            chosen: (0..m.min(ranked.len())).collect(),
            fallback: true,
        };
    }
    Diversified {
        chosen,
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: &[u32]) -> Tokens {
        v.iter().map(|x| (0, *x)).collect()
    }

    #[test]
    fn distance_basics() {
        assert_eq!(jaccard_distance(&set(&[1, 2]), &set(&[1, 2])), 0.0);
        assert_eq!(jaccard_distance(&set(&[1, 2]), &set(&[3, 4])), 1.0);
        assert!((jaccard_distance(&set(&[1, 2, 3]), &set(&[2, 3, 4])) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ordered_tokens_distinguish_permutations() {
        let rules = crate::domain::GameRules::preset("pick3").unwrap();
        let a = Pick::new(vec![1, 2, 3], None, &rules);
        let b = Pick::new(vec![3, 2, 1], None, &rules);
        assert!(jaccard_distance(&tokens(&a, true), &tokens(&b, true)) > 0.0);
        assert_eq!(jaccard_distance(&tokens(&a, false), &tokens(&b, false)), 0.0);
    }

    #[test]
    fn greedy_skips_near_duplicates() {
        let ranked = vec![set(&[1, 2, 3]), set(&[1, 2, 4]), set(&[5, 6, 7]), set(&[8, 9, 10])];
        let d = diversify(&ranked, 3, 0.8);
        assert!(!d.fallback);
        assert_eq!(d.chosen, vec![0, 2, 3]);
    }

    #[test]
    fn unreachable_target_returns_prefix() {
        let ranked = vec![set(&[1, 2]), set(&[1, 3]), set(&[1, 4])];
        let d = diversify(&ranked, 2, 0.8);
        assert!(d.fallback);
        assert_eq!(d.chosen, vec![0, 1]);
    }

    #[test]
    fn mean_distance() {
        assert_eq!(mean_pairwise_distance(&[set(&[1])]), 0.0);
        assert_eq!(mean_pairwise_distance(&[set(&[1]), set(&[2])]), 1.0);
    }
}
