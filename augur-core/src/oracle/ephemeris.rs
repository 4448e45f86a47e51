//! Planetary positions, alignment index and Mercury retrograde.
//!
//! The built-in ephemeris uses circular heliocentric orbits with J2000 mean
//! longitudes. It is accurate to a few degrees, which is all the alignment
//! index needs. An external ephemeris can be plugged in through the
//! `Ephemeris` trait.

use std::f64::consts::{PI, TAU};

use chrono::NaiveDate;

/// Bodies the alignment index is computed over.
pub const ALIGNMENT_BODIES: [Body; 5] = [
    Body::Mercury,
    Body::Venus,
    Body::Mars,
    Body::Jupiter,
    Body::Saturn,
];

/// Pairs closer than this (degrees) count as a conjunction.
pub const CONJUNCTION_DEG: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Body {
    Mercury,
    Venus,
    Earth,
    Mars,
    Jupiter,
    Saturn,
}

/// Heliocentric ecliptic positions.
pub trait Ephemeris: Send + Sync {
    /// Ecliptic `(x, y)` in AU at `t` days since J2000 (2000-01-01 12:00 TT).
    /// `None` when the body or epoch is not covered.
    fn position(&self, body: Body, t: f64) -> Option<(f64, f64)>;
}

/// Mean-elements ephemeris: `(L0 at J2000 in degrees, degrees per day, a in AU)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanElementsEphemeris;

impl MeanElementsEphemeris {
    fn elements(body: Body) -> (f64, f64, f64) {
        match body {
            Body::Mercury => (252.250_84, 4.092_334_45, 0.387_099),
            Body::Venus => (181.979_73, 1.602_130_34, 0.723_332),
            Body::Earth => (100.464_35, 0.985_609_10, 1.000_000),
            Body::Mars => (355.453_32, 0.524_033_04, 1.523_662),
            Body::Jupiter => (34.404_38, 0.083_085_29, 5.203_363),
            Body::Saturn => (49.944_32, 0.033_460_63, 9.537_070),
        }
    }
}

impl Ephemeris for MeanElementsEphemeris {
    fn position(&self, body: Body, t: f64) -> Option<(f64, f64)> {
        let (l0, rate, a) = Self::elements(body);
        let lon = (l0 + rate * t).to_radians();
        Some((a * lon.cos(), a * lon.sin()))
    }
}

/// Ephemeris that covers nothing; forces the seasonal fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEphemeris;

impl Ephemeris for NoEphemeris {
    fn position(&self, _: Body, _: f64) -> Option<(f64, f64)> {
        None
    }
}

/// Days since J2000 at noon UTC of `date`.
pub fn days_since_j2000(date: NaiveDate) -> f64 {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .map(|epoch| (date - epoch).num_days() as f64)
        .unwrap_or(0.0)
}

fn longitude((x, y): (f64, f64)) -> f64 {
    y.atan2(x).rem_euclid(TAU)
}

/// Smallest angle between two longitudes (radians, 0..=π).
fn separation(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    if d > PI {
        TAU - d
    } else {
        d
    }
}

/// `0.5 + 0.5·sin(2π·doy/365.25)`.
pub fn seasonal_proxy(date: NaiveDate) -> f64 {
    use chrono::Datelike;
    let doy = date.ordinal() as f64;
    0.5 + 0.5 * (TAU * doy / 365.25).sin()
}

/// `0.7·R + 0.3·conjunction_rate`, where R is the resultant length of the
/// bodies' heliocentric longitudes and the conjunction rate is the fraction
/// of pairs within `CONJUNCTION_DEG`. Falls back to the seasonal proxy when
/// any position is unavailable. Returns `(index, used_fallback)`.
pub fn alignment_index(eph: &dyn Ephemeris, date: NaiveDate) -> (f64, bool) {
    let t = days_since_j2000(date);
    let lons: Option<Vec<f64>> = ALIGNMENT_BODIES
        .iter()
        .map(|b| eph.position(*b, t).map(longitude))
        .collect();
    let Some(lons) = lons else {
        return (seasonal_proxy(date), true);
    };

    let n = lons.len() as f64;
    let (sx, sy) = lons
        .iter()
        .fold((0.0, 0.0), |(sx, sy), l| (sx + l.cos(), sy + l.sin()));
    let resultant = (sx * sx + sy * sy).sqrt() / n;

    let mut pairs = 0usize;
    let mut close = 0usize;
    for i in 0..lons.len() {
        for j in i + 1..lons.len() {
            pairs += 1;
            if separation(lons[i], lons[j]) <= CONJUNCTION_DEG.to_radians() {
                close += 1;
            }
        }
    }
    let rate = if pairs > 0 {
        close as f64 / pairs as f64
    } else {
        0.0
    };
    ((0.7 * resultant + 0.3 * rate).clamp(0.0, 1.0), false)
}

/// Geocentric ecliptic longitude of `body` (radians).
pub fn geocentric_longitude(eph: &dyn Ephemeris, body: Body, t: f64) -> Option<f64> {
    let (px, py) = eph.position(body, t)?;
    let (ex, ey) = eph.position(Body::Earth, t)?;
    Some(longitude((px - ex, py - ey)))
}

/// Mercury is retrograde when its geocentric longitude decreases across
/// `(t-1d, t+1d)`. `None` without an ephemeris.
pub fn mercury_retrograde(eph: &dyn Ephemeris, date: NaiveDate) -> Option<bool> {
    let t = days_since_j2000(date);
    let before = geocentric_longitude(eph, Body::Mercury, t - 1.0)?;
    let after = geocentric_longitude(eph, Body::Mercury, t + 1.0)?;
    // Wrap into (-π, π] so crossing 0°/360° is not mistaken for motion.
    let mut delta = (after - before).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    Some(delta < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn alignment_is_bounded() {
        let eph = MeanElementsEphemeris;
        let mut day = date(2020, 1, 1);
        for _ in 0..400 {
            let (a, fallback) = alignment_index(&eph, day);
            assert!((0.0..=1.0).contains(&a));
            assert!(!fallback);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn missing_ephemeris_uses_seasonal_proxy() {
        let d = date(2024, 3, 20);
        let (a, fallback) = alignment_index(&NoEphemeris, d);
        assert!(fallback);
        assert_eq!(a, seasonal_proxy(d));
        assert!(mercury_retrograde(&NoEphemeris, d).is_none());
    }

    #[test]
    fn mercury_retrogrades_a_few_times_a_year() {
        let eph = MeanElementsEphemeris;
        let mut day = date(2023, 1, 1);
        let mut retro_days = 0;
        let mut stations = 0;
        let mut prev = false;
        for _ in 0..365 {
            let r = mercury_retrograde(&eph, day).unwrap();
            if r {
                retro_days += 1;
            }
            if r && !prev {
                stations += 1;
            }
            prev = r;
            day = day.succ_opt().unwrap();
        }
        // Roughly three ~3-week retrograde spells per year.
        assert!((2..=4).contains(&stations), "stations = {stations}");
        assert!((30..=110).contains(&retro_days), "retro days = {retro_days}");
    }

    #[test]
    fn separation_wraps() {
        assert!((separation(0.1, TAU - 0.1) - 0.2).abs() < 1e-12);
    }
}
