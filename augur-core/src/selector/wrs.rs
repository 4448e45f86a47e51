//! Weighted sampling primitives.

use rand::seq::index;
use rand::Rng;

use crate::domain::renormalize;

/// Efraimidis–Spirakis key in log space: `ln(u) / w`, which orders the same
/// as `u^(1/w)` without underflow. Zero weights never win.
pub fn es_key<R: Rng>(weight: f64, rng: &mut R) -> f64 {
    // (0, 1]
    let u: f64 = 1.0 - rng.gen::<f64>();
    if weight > 0.0 && weight.is_finite() {
        u.ln() / weight
    } else {
        f64::NEG_INFINITY
    }
}

/// Weighted random sample of `k` distinct indices without replacement.
///
/// Every weight consumes exactly one draw so the stream position does not
/// depend on the weights. Equal keys fall back to the lower index.
pub fn wrs_indices<R: Rng>(weights: &[f64], k: usize, rng: &mut R) -> Vec<usize> {
    let mut keyed: Vec<(f64, usize)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| (es_key(*w, rng), i))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    keyed.into_iter().take(k).map(|(_, i)| i).collect()
}

/// One categorical draw (with replacement).
pub fn categorical<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if weights.is_empty() {
        return 0;
    }
    if total <= 0.0 || !total.is_finite() {
        return rng.gen_range(0..weights.len());
    }
    let mut target = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        if !(w.is_finite() && *w > 0.0) {
            continue;
        }
        if target < *w {
            return i;
        }
        target -= w;
    }
    weights.len() - 1
}

/// Temperature scaling `w^(1/T)`, renormalized. `T > 1` flattens.
pub fn temper(weights: &[f64], temperature: f64) -> Vec<f64> {
    let mut out: Vec<f64> = if temperature > 0.0 && (temperature - 1.0).abs() > f64::EPSILON {
        weights.iter().map(|w| w.max(0.0).powf(1.0 / temperature)).collect()
    } else {
        weights.to_vec()
    };
    renormalize(&mut out);
    out
}

/// Bump `ceil(fraction·len)` random weights by a factor in [1.05, 1.3].
pub fn perturb<R: Rng>(weights: &mut [f64], fraction: f64, rng: &mut R) {
    if fraction <= 0.0 || weights.is_empty() {
        return;
    }
    let count = ((fraction * weights.len() as f64).ceil() as usize).clamp(1, weights.len());
    for i in index::sample(rng, weights.len(), count) {
        weights[i] *= rng.gen_range(1.05..=1.3);
    }
}

/// Sequential weighted draw of `k` distinct indices.
///
/// Before each draw the live weights are optionally perturbed; after each
/// draw every remaining weight is multiplied by `factor(picked, j)`.
pub fn sequential_draw<R, F>(
    weights: &[f64],
    k: usize,
    chaos: f64,
    factor: Option<F>,
    rng: &mut R,
) -> Vec<usize>
where
    R: Rng,
    F: Fn(usize, usize) -> f64,
{
    let mut live = weights.to_vec();
    let mut taken = vec![false; live.len()];
    let mut out = Vec::with_capacity(k);
    for _ in 0..k.min(live.len()) {
        let mut view = live.clone();
        perturb(&mut view, chaos, rng);
        for (w, t) in view.iter_mut().zip(&taken) {
            if *t {
                *w = 0.0;
            }
        }
        let Some(mut next) = wrs_indices(&view, 1, rng).first().copied() else {
            break;
        };
        if view[next] <= 0.0 {
            // Everything left has zero weight: take the lowest free index.
            match taken.iter().position(|t| !t) {
                Some(free) => next = free,
                None => break,
            }
        }
        taken[next] = true;
        out.push(next);
        if let Some(f) = &factor {
            for (j, w) in live.iter_mut().enumerate() {
                if !taken[j] {
                    *w *= f(next, j).max(0.0);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn wrs_returns_distinct_indices() {
        let mut rng = StdRng::seed_from_u64(3);
        let idx = wrs_indices(&[0.1, 0.2, 0.3, 0.4], 3, &mut rng);
        assert_eq!(idx.len(), 3);
        let mut sorted = idx.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn zero_weight_is_never_chosen_first() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            assert_ne!(wrs_indices(&[0.0, 1.0, 1.0], 1, &mut rng)[0], 0);
        }
    }

    #[test]
    fn single_draw_frequency_tracks_weights() {
        let w = [0.1, 0.2, 0.3, 0.4];
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let mut hits = [0usize; 4];
        for _ in 0..n {
            hits[wrs_indices(&w, 1, &mut rng)[0]] += 1;
        }
        for (h, p) in hits.iter().zip(&w) {
            let freq = *h as f64 / n as f64;
            let band = 3.0 * (p * (1.0 - p) / n as f64).sqrt();
            assert!((freq - p).abs() < band, "{freq} vs {p}");
        }
    }

    #[test]
    fn categorical_respects_weights() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 10_000;
        let ones = (0..n)
            .filter(|_| categorical(&[0.25, 0.75], &mut rng) == 1)
            .count();
        assert!((ones as f64 / n as f64 - 0.75).abs() < 0.03);
    }

    #[test]
    fn temper_flattens_and_sharpens() {
        let w = [0.2, 0.8];
        assert!(temper(&w, 2.0)[1] < 0.8);
        assert!(temper(&w, 0.5)[1] > 0.8);
        assert_eq!(temper(&w, 1.0), w.to_vec());
    }

    #[test]
    fn sequential_draw_applies_factor() {
        let mut rng = StdRng::seed_from_u64(9);
        // Picking 0 zeroes out 1, so {0, 1} never appear together.
        let factor = |a: usize, b: usize| if (a, b) == (0, 1) || (a, b) == (1, 0) { 0.0 } else { 1.0 };
        for _ in 0..100 {
            let drawn = sequential_draw(&[1.0, 1.0, 1.0], 2, 0.0, Some(factor), &mut rng);
            assert!(!(drawn.contains(&0) && drawn.contains(&1)));
        }
    }
}
