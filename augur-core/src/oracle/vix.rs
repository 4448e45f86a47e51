//! VIX proxy: last `^VIX` close on or before a date, from Yahoo's v8 chart API.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use super::http::OracleError;

pub const VIX_SYMBOL: &str = "^VIX";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

/// Chart URL covering the week before `date` (weekends and holidays have no bar).
pub fn chart_url(symbol: &str, date: NaiveDate) -> String {
    let start = date - Duration::days(7);
    let ts = |d: NaiveDate, h: u32| {
        d.and_hms_opt(h, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0)
    };
    let encoded = symbol.replace('^', "%5E");
    format!(
        "https://query2.finance.yahoo.com/v8/finance/chart/{encoded}\
         ?period1={}&period2={}&interval=1d",
        ts(start, 0),
        ts(date, 23)
    )
}

/// Last non-null close dated on or before `date`.
pub fn parse_close(json: serde_json::Value, date: NaiveDate) -> Result<f64, OracleError> {
    let resp: ChartResponse =
        serde_json::from_value(json).map_err(|e| OracleError::Format(format!("vix: {e}")))?;
    let data = match resp.chart.result {
        Some(result) => result.into_iter().next(),
        None => {
            let why = resp
                .chart
                .error
                .map(|e| format!("{}: {}", e.code, e.description))
                .unwrap_or_else(|| "empty result".into());
            return Err(OracleError::Format(format!("vix: {why}")));
        }
    }
    .ok_or_else(|| OracleError::Format("vix: result array is empty".into()))?;

    let timestamps = data.timestamp.unwrap_or_default();
    let closes = data
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let day = chrono::DateTime::from_timestamp(*ts, 0)?.date_naive();
            let close = close.filter(|c| c.is_finite() && *c > 0.0)?;
            (day <= date).then_some((day, close))
        })
        .max_by_key(|(day, _)| *day)
        .map(|(_, close)| close)
        .ok_or_else(|| OracleError::NoData(format!("vix on {date}")))
}
