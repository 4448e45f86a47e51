//! NOAA Space Weather Prediction Center products: planetary K index, F10.7
//! flux and GOES X-ray flares.
//!
//! Parsers are pure functions over the decoded JSON so they can be tested
//! without the network.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::http::OracleError;

pub const KP_URL: &str = "https://services.swpc.noaa.gov/products/noaa-planetary-k-index.json";
pub const F107_URL: &str = "https://services.swpc.noaa.gov/json/f107_cm_flux.json";
pub const FLARES_URL: &str =
    "https://services.swpc.noaa.gov/json/goes/primary/xray-flares-7-day.json";

/// Flares are counted over this many hours ending at the close of the date.
pub const FLARE_WINDOW_HOURS: i64 = 72;

fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim().trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|x: &f64| x.is_finite())
}

/// `(kp_3h_max, ap_daily)` for `date` from the planetary K-index table.
///
/// The product is an array of rows whose first row is the header
/// (`time_tag, Kp, a_running, station_count`).
pub fn parse_kp(json: &Value, date: NaiveDate) -> Result<(f64, f64), OracleError> {
    let rows = json
        .as_array()
        .ok_or_else(|| OracleError::Format("kp: expected array".into()))?;
    let header: Vec<String> = rows
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| OracleError::Format("kp: missing header".into()))?
        .iter()
        .map(|h| h.as_str().unwrap_or("").to_ascii_lowercase())
        .collect();
    let col = |name: &str| header.iter().position(|h| h == name);
    let (Some(t_col), Some(kp_col)) = (col("time_tag"), col("kp")) else {
        return Err(OracleError::Format("kp: unexpected header".into()));
    };
    let ap_col = col("a_running").or_else(|| col("ap"));

    let mut kp_max = f64::NAN;
    let mut ap_sum = 0.0;
    let mut ap_n = 0usize;
    for row in rows.iter().skip(1).filter_map(Value::as_array) {
        let Some(t) = row.get(t_col).and_then(Value::as_str).and_then(parse_time) else {
            continue;
        };
        if t.date() != date {
            continue;
        }
        if let Some(kp) = row.get(kp_col).and_then(number) {
            kp_max = if kp_max.is_nan() { kp } else { kp_max.max(kp) };
        }
        if let Some(ap) = ap_col.and_then(|c| row.get(c)).and_then(number) {
            ap_sum += ap;
            ap_n += 1;
        }
    }
    if kp_max.is_nan() {
        return Err(OracleError::NoData(format!("kp on {date}")));
    }
    let ap = if ap_n > 0 {
        ap_sum / ap_n as f64
    } else {
        f64::NAN
    };
    Ok((kp_max.clamp(0.0, 9.0), ap))
}

/// Latest F10.7 flux observed on or before `date`.
pub fn parse_f107(json: &Value, date: NaiveDate) -> Result<f64, OracleError> {
    let rows = json
        .as_array()
        .ok_or_else(|| OracleError::Format("f10.7: expected array".into()))?;
    rows.iter()
        .filter_map(|r| {
            let t = parse_time(r.get("time_tag")?.as_str()?)?;
            let flux = number(r.get("flux")?)?;
            (t.date() <= date).then_some((t, flux))
        })
        .max_by_key(|(t, _)| *t)
        .map(|(_, flux)| flux)
        .ok_or_else(|| OracleError::NoData(format!("f10.7 on {date}")))
}

/// Count of M- and X-class flares beginning in the `FLARE_WINDOW_HOURS`
/// before the end of `date`.
pub fn parse_flares(json: &Value, date: NaiveDate) -> Result<u32, OracleError> {
    let rows = json
        .as_array()
        .ok_or_else(|| OracleError::Format("flares: expected array".into()))?;
    let end = date
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| OracleError::Format("flares: date overflow".into()))?;
    let start = end - Duration::hours(FLARE_WINDOW_HOURS);

    let count = rows
        .iter()
        .filter(|r| {
            let class = r
                .get("max_class")
                .or_else(|| r.get("class"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let strong = matches!(class.chars().next(), Some('M' | 'X' | 'm' | 'x'));
            let begin = r
                .get("begin_time")
                .or_else(|| r.get("time_tag"))
                .and_then(Value::as_str)
                .and_then(parse_time);
            strong && begin.is_some_and(|t| t >= start && t < end)
        })
        .count();
    Ok(count as u32)
}
