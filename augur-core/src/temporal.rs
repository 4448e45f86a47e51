//! Temporal correction: a bounded first-order nudge
//! `y_final = y_base + (∂y/∂t)·Δt_K` with `Δt_K = κ·h·(1/Δt − 1/Δt₀)`.
//!
//! With `κ = 0` (or the helper disabled) the base is returned untouched and
//! every diagnostic except `Et`/`Et0` is zero.

use serde::{Deserialize, Serialize};

use crate::domain::{renormalize, ConfigError};

/// Planck constant (J·s).
pub const PLANCK_H: f64 = 6.62607015e-34;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalParams {
    pub enabled: bool,
    pub kappa: f64,
    /// Forecast window Δt (days).
    pub dt_days: f64,
    /// Reference window Δt₀ (days).
    pub dt0_days: f64,
    /// Finite-difference step ε (days).
    pub epsilon_days: f64,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            enabled: true,
            kappa: 0.0,
            dt_days: 1.0,
            dt0_days: 7.0,
            epsilon_days: 0.5,
        }
    }
}

impl TemporalParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dt_days", self.dt_days),
            ("dt0_days", self.dt0_days),
            ("epsilon_days", self.epsilon_days),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::OptionOutOfRange {
                    name,
                    value,
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                });
            }
        }
        if !self.kappa.is_finite() {
            return Err(ConfigError::OptionOutOfRange {
                name: "kappa",
                value: self.kappa,
                min: f64::MIN,
                max: f64::MAX,
            });
        }
        Ok(())
    }

    fn active(&self) -> bool {
        self.enabled && self.kappa != 0.0
    }

    /// `Δt_K = κ·h·(1/Δt − 1/Δt₀)`; exactly 0 when inactive.
    pub fn dt_k(&self) -> f64 {
        if !self.active() {
            return 0.0;
        }
        self.kappa * PLANCK_H * (1.0 / self.dt_days - 1.0 / self.dt0_days)
    }
}

/// Always emitted, even when the correction is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalDiagnostics {
    /// `h / Δt`
    pub et: f64,
    /// `h / Δt₀`
    pub et0: f64,
    pub dt_k: f64,
    /// Applied nudge: `y_final − y_base` (scalar), or the largest absolute
    /// per-entry change (vector).
    pub delta: f64,
}

impl TemporalDiagnostics {
    fn new(params: &TemporalParams, dt_k: f64, delta: f64) -> Self {
        Self {
            et: PLANCK_H / params.dt_days,
            et0: PLANCK_H / params.dt0_days,
            dt_k,
            delta,
        }
    }
}

/// Scalar correction, clipped to [0, 1].
pub fn apply_scalar(y_base: f64, dydt: f64, params: &TemporalParams) -> (f64, TemporalDiagnostics) {
    let dt_k = params.dt_k();
    if dt_k == 0.0 || !dydt.is_finite() {
        return (y_base, TemporalDiagnostics::new(params, dt_k, 0.0));
    }
    let y_final = (y_base + dydt * dt_k).clamp(0.0, 1.0);
    (y_final, TemporalDiagnostics::new(params, dt_k, y_final - y_base))
}

/// Vector correction, renormalized to a distribution.
pub fn apply_vector(
    y_base: &[f64],
    dydt: &[f64],
    params: &TemporalParams,
) -> (Vec<f64>, TemporalDiagnostics) {
    let dt_k = params.dt_k();
    if dt_k == 0.0 || dydt.len() != y_base.len() || dydt.iter().any(|d| !d.is_finite()) {
        return (y_base.to_vec(), TemporalDiagnostics::new(params, dt_k, 0.0));
    }
    let mut y: Vec<f64> = y_base
        .iter()
        .zip(dydt)
        .map(|(y, d)| (y + d * dt_k).max(0.0))
        .collect();
    renormalize(&mut y);
    let delta = y
        .iter()
        .zip(y_base)
        .map(|(a, b)| a - b)
        .fold(0.0_f64, |m, d| if d.abs() > m.abs() { d } else { m });
    (y, TemporalDiagnostics::new(params, dt_k, delta))
}

/// Symmetric finite difference `(y(t+ε) − y(t−ε)) / 2ε`.
pub fn finite_difference(f: impl Fn(f64) -> f64, t: f64, eps: f64) -> f64 {
    (f(t + eps) - f(t - eps)) / (2.0 * eps)
}

/// Element-wise symmetric finite difference of a vector-valued function.
pub fn finite_difference_vec(f: impl Fn(f64) -> Vec<f64>, t: f64, eps: f64) -> Vec<f64> {
    let (up, down) = (f(t + eps), f(t - eps));
    up.iter()
        .zip(&down)
        .map(|(a, b)| (a - b) / (2.0 * eps))
        .collect()
}

/// One row of the append-only `temporal_logs.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalLogRow {
    pub run_ts: String,
    pub entity: String,
    pub y_base: f64,
    pub y_final: f64,
    /// The applied nudge `y_final − y_base`.
    #[serde(rename = "delta_K")]
    pub delta_k: f64,
    pub kappa: f64,
    pub dt: f64,
    pub dt0: f64,
    #[serde(rename = "Et")]
    pub et: f64,
    #[serde(rename = "Et0")]
    pub et0: f64,
}

/// One row of the append-only `outcomes.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRow {
    pub run_ts: String,
    pub entity: String,
    pub label: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kappa: f64) -> TemporalParams {
        TemporalParams {
            kappa,
            ..TemporalParams::default()
        }
    }

    #[test]
    fn zero_kappa_is_bit_identical() {
        let (y, d) = apply_scalar(0.123456789, 5.0, &params(0.0));
        assert_eq!(y.to_bits(), 0.123456789_f64.to_bits());
        assert_eq!(d.delta, 0.0);
        assert_eq!(d.dt_k, 0.0);
        assert!(d.et > 0.0 && d.et0 > 0.0);

        let base = vec![0.2, 0.3, 0.5];
        let (v, d) = apply_vector(&base, &[1.0, -1.0, 0.0], &params(0.0));
        assert_eq!(v, base);
        assert_eq!(d.delta, 0.0);
    }

    #[test]
    fn disabled_is_identity() {
        let p = TemporalParams {
            enabled: false,
            kappa: 1e30,
            ..TemporalParams::default()
        };
        let (y, d) = apply_scalar(0.4, 1.0, &p);
        assert_eq!(y, 0.4);
        assert_eq!(d.delta, 0.0);
    }

    #[test]
    fn dt_k_formula() {
        let p = TemporalParams {
            kappa: 2.0,
            dt_days: 1.0,
            dt0_days: 4.0,
            ..TemporalParams::default()
        };
        assert!((p.dt_k() - 2.0 * PLANCK_H * 0.75).abs() < 1e-45);
    }

    #[test]
    fn scalar_nudge_is_clipped() {
        // κ large enough that Δt_K ≈ 1.
        let kappa = 1.0 / (PLANCK_H * (1.0 - 1.0 / 7.0));
        let (y, d) = apply_scalar(0.9, 0.5, &params(kappa));
        assert_eq!(y, 1.0);
        assert!((d.delta - 0.1).abs() < 1e-9);
    }

    #[test]
    fn vector_nudge_renormalizes() {
        let kappa = 1.0 / (PLANCK_H * (1.0 - 1.0 / 7.0));
        let (v, d) = apply_vector(&[0.25; 4], &[0.1, 0.0, 0.0, -0.1], &params(kappa));
        assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(v[0] > v[3]);
        assert!(d.delta.abs() > 0.0);
    }

    #[test]
    fn finite_difference_of_square() {
        let d = finite_difference(|t| t * t, 3.0, 0.5);
        assert!((d - 6.0).abs() < 1e-12);
        let v = finite_difference_vec(|t| vec![t, 2.0 * t], 0.0, 0.25);
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn rejects_zero_window() {
        let p = TemporalParams {
            dt_days: 0.0,
            ..TemporalParams::default()
        };
        assert!(p.validate().is_err());
    }
}
