//! Lunar phase from the mean synodic month.

use chrono::{NaiveDate, NaiveDateTime};

pub const SYNODIC_MONTH_DAYS: f64 = 29.530588853;

fn reference_new_moon() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2000, 1, 6)?.and_hms_opt(18, 14, 0)
}

/// Phase at noon UTC in [0, 1): 0 = new moon, 0.5 = full moon.
pub fn lunar_phase(date: NaiveDate) -> f64 {
    let (Some(anchor), Some(noon)) = (reference_new_moon(), date.and_hms_opt(12, 0, 0)) else {
        return 0.5;
    };
    let days = (noon - anchor).num_seconds() as f64 / 86_400.0;
    (days / SYNODIC_MONTH_DAYS).rem_euclid(1.0)
}

/// Illuminated fraction, 0 at new moon and 1 at full.
pub fn illumination(phase: f64) -> f64 {
    (1.0 - (2.0 * std::f64::consts::PI * phase).cos()) / 2.0
}
