//! Probability surface over white (and optional special) candidates.

use serde::{Deserialize, Serialize};

use super::rules::GameRules;

/// Smallest probability any candidate may carry after renormalization.
pub const PROB_FLOOR: f64 = 1e-12;

/// `(W, S?)` with `∑W = 1` and every entry in (0, 1); `S` likewise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilitySurface {
    pub white: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<Vec<f64>>,
}

impl ProbabilitySurface {
    /// Uniform surface for a game.
    pub fn uniform(rules: &GameRules) -> Self {
        Self {
            white: uniform(rules.white_len()),
            special: if rules.has_special() {
                rules.special_len().map(uniform)
            } else {
                None
            },
        }
    }

    /// Check the surface invariants against the rules. Returns a description of
    /// the first violation.
    pub fn check(&self, rules: &GameRules) -> Result<(), String> {
        if self.white.len() != rules.white_len() {
            return Err(format!(
                "white surface has {} entries, domain has {}",
                self.white.len(),
                rules.white_len()
            ));
        }
        check_distribution("white", &self.white)?;
        if let Some(s) = &self.special {
            if Some(s.len()) != rules.special_len() {
                return Err("special surface length does not match domain".into());
            }
            check_distribution("special", s)?;
        }
        Ok(())
    }

    /// Whites ranked by probability (descending, ties by value).
    pub fn top_whites(&self, rules: &GameRules, n: usize) -> Vec<(u32, f64)> {
        let mut ranked: Vec<(u32, f64)> = self
            .white
            .iter()
            .enumerate()
            .map(|(i, &p)| (rules.white_value(i), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

fn check_distribution(label: &str, v: &[f64]) -> Result<(), String> {
    let sum: f64 = v.iter().sum();
    if (sum - 1.0).abs() > 1e-9 {
        return Err(format!("{label} surface sums to {sum}"));
    }
    let single = v.len() == 1;
    let bad = v
        .iter()
        .enumerate()
        .find(|(_, p)| !(**p > 0.0 && (**p < 1.0 || single)));
    if let Some((i, p)) = bad {
        return Err(format!("{label} surface entry {i} out of (0,1): {p}"));
    }
    Ok(())
}

/// Uniform distribution of length `n`.
pub fn uniform(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Renormalize in place so the vector sums to one, flooring every entry at
/// `PROB_FLOOR`. Non-finite or all-zero input falls back to uniform.
///
/// Returns `false` when the uniform fallback was taken.
pub fn renormalize(v: &mut [f64]) -> bool {
    if v.is_empty() {
        return true;
    }
    let finite = v.iter().all(|x| x.is_finite() && *x >= 0.0);
    let sum: f64 = v.iter().sum();
    if !finite || !(sum > 0.0) {
        let u = 1.0 / v.len() as f64;
        v.iter_mut().for_each(|x| *x = u);
        return false;
    }
    for x in v.iter_mut() {
        *x = (*x / sum).max(PROB_FLOOR);
    }
    let sum: f64 = v.iter().sum();
    for x in v.iter_mut() {
        *x /= sum;
    }
    true
}

/// Shannon entropy in nats.
pub fn entropy(v: &[f64]) -> f64 {
    v.iter()
        .filter(|p| **p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_surface_matches_domain() {
        let rules = GameRules::preset("powerball").unwrap();
        let s = ProbabilitySurface::uniform(&rules);
        assert_eq!(s.white.len(), 69);
        assert_eq!(s.special.as_ref().map(|v| v.len()), Some(26));
        assert!(s.check(&rules).is_ok());
    }

    #[test]
    fn renormalize_floors_zeros() {
        let mut v = vec![0.0, 2.0, 2.0];
        assert!(renormalize(&mut v));
        assert!(v.iter().all(|p| *p > 0.0));
        assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn renormalize_nan_falls_back_to_uniform() {
        let mut v = vec![f64::NAN, 1.0, 1.0, 1.0];
        assert!(!renormalize(&mut v));
        assert!(v.iter().all(|p| (*p - 0.25).abs() < 1e-15));
    }

    #[test]
    fn check_reports_bad_sum() {
        let rules = GameRules::simple(1, 3, 1);
        let s = ProbabilitySurface {
            white: vec![0.5, 0.5, 0.5],
            special: None,
        };
        assert!(s.check(&rules).is_err());
    }

    #[test]
    fn top_whites_breaks_ties_by_value() {
        let rules = GameRules::simple(1, 4, 2);
        let s = ProbabilitySurface {
            white: vec![0.25, 0.25, 0.25, 0.25],
            special: None,
        };
        let top = s.top_whites(&rules, 2);
        assert_eq!(top.iter().map(|t| t.0).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn entropy_of_uniform_is_ln_n() {
        let u = uniform(8);
        assert!((entropy(&u) - (8.0_f64).ln()).abs() < 1e-12);
    }
}
