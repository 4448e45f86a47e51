//! Deterministic multiplicative priors: archetypes, the structural prior,
//! observer bias and the intention hash bump.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic archetype bias over candidate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Archetype {
    #[default]
    Uniform,
    /// Favours calendar numbers (1..=31) and the birthday's day and month.
    Birthday { date: NaiveDate },
    /// Favours candidates sharing the name's numerological root.
    Name { text: String },
    /// Favours the as-of day and month and the date's digit root.
    DrawDate,
}

/// Repeated digit sum down to 1..=9 (0 stays 0).
pub fn digit_root(mut n: u64) -> u64 {
    while n >= 10 {
        n = std::iter::successors(Some(n), |x| (*x >= 10).then_some(x / 10))
            .map(|x| x % 10)
            .sum();
    }
    n
}

/// Pythagorean letter values: a=1 .. i=9, j=1 .. r=9, s=1 .. z=8.
fn name_number(text: &str) -> u64 {
    text.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| (c.to_ascii_lowercase() as u64 - 'a' as u64) % 9 + 1)
        .sum()
}

fn date_number(date: NaiveDate) -> u64 {
    digit_root(date.year().unsigned_abs() as u64 + date.month() as u64 + date.day() as u64)
}

impl Archetype {
    /// Weight for one candidate value. Always in [1, 1.5].
    pub fn weight(&self, value: u32, as_of: NaiveDate) -> f64 {
        match self {
            Archetype::Uniform => 1.0,
            Archetype::Birthday { date } => {
                let mut w: f64 = 1.0;
                if (1..=31).contains(&value) {
                    w *= 1.15;
                }
                if value == date.day() || value == date.month() {
                    w *= 1.3;
                }
                w.min(1.5)
            }
            Archetype::Name { text } => {
                let root = digit_root(name_number(text));
                if root > 0 && digit_root(value as u64) == root {
                    1.25
                } else {
                    1.0
                }
            }
            Archetype::DrawDate => {
                let mut w: f64 = 1.0;
                if value == as_of.day() || value == as_of.month() {
                    w *= 1.2;
                }
                if value > 0 && digit_root(value as u64) == date_number(as_of) {
                    w *= 1.1;
                }
                w
            }
        }
    }
}

pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

pub fn is_fibonacci(n: u32) -> bool {
    let (mut a, mut b) = (0u64, 1u64);
    while a < n as u64 {
        (a, b) = (b, a + b);
    }
    a == n as u64
}

/// `1 + strength` for primes and Fibonacci numbers, 1 elsewhere.
pub fn structural_weight(value: u32, strength: f64) -> f64 {
    if is_prime(value) || is_fibonacci(value) {
        1.0 + strength
    } else {
        1.0
    }
}

/// Up to `max_bumps` distinct indices in `0..len` derived from SHA-256 of
/// the intention string.
pub fn intention_indices(intention: &str, len: usize, max_bumps: usize) -> Vec<usize> {
    if len == 0 || intention.is_empty() {
        return Vec::new();
    }
    let digest = Sha256::digest(intention.as_bytes());
    let mut out = Vec::with_capacity(max_bumps);
    for chunk in digest.chunks(4) {
        if out.len() >= max_bumps.min(len) {
            break;
        }
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        let idx = u32::from_le_bytes(bytes) as usize % len;
        if !out.contains(&idx) {
            out.push(idx);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn digit_roots() {
        assert_eq!(digit_root(0), 0);
        assert_eq!(digit_root(9), 9);
        assert_eq!(digit_root(38), 2);
        assert_eq!(digit_root(2024), 8);
    }

    #[test]
    fn primes_and_fibonacci() {
        let primes: Vec<u32> = (0..20).filter(|n| is_prime(*n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19]);
        let fibs: Vec<u32> = (0..60).filter(|n| is_fibonacci(*n)).collect();
        assert_eq!(fibs, vec![0, 1, 2, 3, 5, 8, 13, 21, 34, 55]);
        assert_eq!(structural_weight(4, 0.05), 1.0);
        assert_eq!(structural_weight(13, 0.05), 1.05);
    }

    #[test]
    fn birthday_weights_are_bounded() {
        let a = Archetype::Birthday { date: d(1990, 7, 14) };
        let as_of = d(2024, 1, 1);
        assert!((a.weight(14, as_of) - 1.495).abs() < 1e-12);
        assert!((a.weight(20, as_of) - 1.15).abs() < 1e-12);
        assert_eq!(a.weight(45, as_of), 1.0);
        for v in 0..100 {
            assert!((1.0..=1.5).contains(&a.weight(v, as_of)));
        }
    }

    #[test]
    fn name_archetype_matches_root() {
        // "abc" = 1+2+3 = 6
        let a = Archetype::Name { text: "abc".into() };
        let as_of = d(2024, 1, 1);
        assert_eq!(a.weight(15, as_of), 1.25);
        assert_eq!(a.weight(16, as_of), 1.0);
    }

    #[test]
    fn archetype_serde_is_tagged() {
        let a: Archetype = serde_json::from_str(r#"{"kind":"birthday","date":"1990-07-14"}"#).unwrap();
        assert_eq!(a, Archetype::Birthday { date: d(1990, 7, 14) });
        let u: Archetype = serde_json::from_str(r#"{"kind":"uniform"}"#).unwrap();
        assert_eq!(u, Archetype::Uniform);
    }

    #[test]
    fn intention_is_deterministic_and_bounded() {
        let a = intention_indices("good fortune", 69, 4);
        let b = intention_indices("good fortune", 69, 4);
        assert_eq!(a, b);
        assert!(!a.is_empty() && a.len() <= 4);
        assert!(a.iter().all(|i| *i < 69));
        let mut dedup = a.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), a.len());
        assert!(intention_indices("", 69, 4).is_empty());
        assert!(intention_indices("x", 1, 4).len() <= 1);
    }
}
