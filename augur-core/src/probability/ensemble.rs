//! Dirichlet smoothing operators: ensemble consensus and multiverse
//! posterior averaging.

use rand::Rng;
use rand_distr::{Distribution, Gamma};

const EPSILON: f64 = 1e-300;

/// One Dirichlet(α) draw via independent Gamma(αᵢ, 1) samples.
pub fn dirichlet_sample<R: Rng>(alphas: &[f64], rng: &mut R) -> Vec<f64> {
    let mut draws: Vec<f64> = alphas
        .iter()
        .map(|&a| match Gamma::new(a.max(1e-9), 1.0) {
            Ok(g) => g.sample(rng).max(EPSILON),
            Err(_) => EPSILON,
        })
        .collect();
    let sum: f64 = draws.iter().sum();
    if sum.is_finite() && sum > 0.0 {
        draws.iter_mut().for_each(|x| *x /= sum);
    } else {
        let u = 1.0 / draws.len().max(1) as f64;
        draws.iter_mut().for_each(|x| *x = u);
    }
    draws
}

/// Mean of `n` Dirichlet draws.
pub fn dirichlet_mean<R: Rng>(alphas: &[f64], n: usize, rng: &mut R) -> Vec<f64> {
    let mut acc = vec![0.0; alphas.len()];
    if n == 0 {
        return acc;
    }
    for _ in 0..n {
        for (a, x) in acc.iter_mut().zip(dirichlet_sample(alphas, rng)) {
            *a += x;
        }
    }
    acc.iter_mut().for_each(|a| *a /= n as f64);
    acc
}

/// Ensemble consensus: concentration `W·50·len(W)`.
pub fn ensemble_alphas(w: &[f64]) -> Vec<f64> {
    let scale = 50.0 * w.len() as f64;
    w.iter().map(|p| p * scale).collect()
}

/// Multiverse posterior: prior mass `W·strength·len(W)` plus observed
/// evidence counts.
pub fn posterior_alphas(w: &[f64], evidence: &[f64], strength: f64) -> Vec<f64> {
    let scale = strength * w.len() as f64;
    w.iter()
        .zip(evidence.iter().chain(std::iter::repeat(&0.0)))
        .map(|(p, e)| p * scale + e.max(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sample_is_a_distribution() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = dirichlet_sample(&[1.0, 2.0, 3.0], &mut rng);
        assert!((s.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(s.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn high_concentration_mean_tracks_weights() {
        let w = [0.1, 0.2, 0.7];
        let mut rng = StdRng::seed_from_u64(7);
        let m = dirichlet_mean(&ensemble_alphas(&w), 200, &mut rng);
        for (a, b) in m.iter().zip(&w) {
            assert!((a - b).abs() < 0.02, "{a} vs {b}");
        }
    }

    #[test]
    fn posterior_adds_evidence() {
        let a = posterior_alphas(&[0.5, 0.5], &[3.0, 1.0], 2.0);
        assert_eq!(a, vec![5.0, 3.0]);
    }
}
