//! Column alias normalization, multi-format date parsing, number splitting.

use chrono::NaiveDate;

/// Canonical key for the row date (draw date or trading day).
pub const DATE: &str = "date";
/// Canonical key for the special ball.
pub const SPECIAL: &str = "special";
/// Canonical key for a single "all numbers in one cell" column.
pub const NUMBERS: &str = "numbers";

/// Map a raw header to its canonical column key.
///
/// Lowercases, trims, collapses separators to `_`, then resolves aliases:
/// `mega_ball|megaball|mega|mb|powerball|pb|bonus → special`,
/// `draw_date|drawdate|date|timestamp|day → date`,
/// `n1|ball1|white1|num1|w1 → w1`.
pub fn canonical_column(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut last_sep = true;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            key.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            key.push('_');
            last_sep = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }

    match key.as_str() {
        "mega_ball" | "megaball" | "mega" | "mb" | "powerball" | "power_ball" | "pb" | "bonus"
        | "bonus_ball" | "special_ball" | "special" | "sb" => return SPECIAL.to_string(),
        "draw_date" | "drawdate" | "date" | "timestamp" | "datetime" | "day" | "trading_day" => {
            return DATE.to_string()
        }
        "numbers" | "winning_numbers" | "winning_number" | "draw_numbers" | "result" => {
            return NUMBERS.to_string()
        }
        "o" => return "open".to_string(),
        "h" => return "high".to_string(),
        "l" => return "low".to_string(),
        "c" => return "close".to_string(),
        "v" | "vol" => return "volume".to_string(),
        "adj_close" | "adjclose" | "adjusted_close" => return "adj_close".to_string(),
        _ => {}
    }

    for prefix in [
        "white_ball_",
        "white_",
        "ball_",
        "digit_",
        "num_",
        "number_",
        "n_",
        "w_",
    ] {
        if let Some(rest) = key.strip_prefix(prefix) {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                return format!("w{}", rest.trim_start_matches('0'));
            }
        }
    }
    for prefix in ["white", "ball", "digit", "num", "number", "n", "w"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                return format!("w{}", rest.trim_start_matches('0'));
            }
        }
    }
    key
}

/// Position of a white column (`w3` → 3).
pub fn white_position(key: &str) -> Option<usize> {
    key.strip_prefix('w')
        .filter(|rest| !rest.is_empty())
        .and_then(|rest| rest.parse().ok())
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%a, %b %d, %Y",
    "%Y%m%d",
    "%d.%m.%Y",
];

/// Parse a date in any of the supported formats. Timestamps with a time part
/// (`2024-01-02T00:00:00`, `2024-01-02 21:59`) keep only the date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Datetime forms: take the leading date token.
    let head = s.split(['T', ' ']).next().unwrap_or(s);
    if head.len() != s.len() {
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(head, fmt) {
                return Some(d);
            }
        }
    }
    None
}

/// Parse an integer cell, accepting zero padding and a trailing `.0`.
pub fn parse_int(raw: &str) -> Option<u32> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<u32>() {
        return Some(v);
    }
    let f: f64 = s.parse().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

/// Parse a float cell; empty and non-numeric cells are `None`.
pub fn parse_float(raw: &str) -> Option<f64> {
    let s = raw.trim().replace(',', "");
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split a "numbers" cell on spaces, dashes, commas or semicolons.
pub fn split_numbers(raw: &str) -> Vec<u32> {
    raw.split(|c: char| c.is_whitespace() || matches!(c, '-' | ',' | ';' | '|'))
        .filter_map(parse_int)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_aliases() {
        for raw in ["Mega Ball", "megaball", "MEGA", "mb", "Powerball", "PB", "Bonus"] {
            assert_eq!(canonical_column(raw), SPECIAL, "{raw}");
        }
    }

    #[test]
    fn date_aliases() {
        for raw in ["Draw Date", "draw_date", "DrawDate", "Date", "timestamp"] {
            assert_eq!(canonical_column(raw), DATE, "{raw}");
        }
    }

    #[test]
    fn white_aliases() {
        assert_eq!(canonical_column("n1"), "w1");
        assert_eq!(canonical_column("Ball 2"), "w2");
        assert_eq!(canonical_column("white_03"), "w3");
        assert_eq!(canonical_column("Num5"), "w5");
        assert_eq!(white_position("w12"), Some(12));
        assert_eq!(white_position("winner"), None);
    }

    #[test]
    fn ohlcv_aliases() {
        assert_eq!(canonical_column("Adj Close"), "adj_close");
        assert_eq!(canonical_column("Vol"), "volume");
        assert_eq!(canonical_column(" Close "), "close");
    }

    #[test]
    fn parses_many_date_formats() {
        let want = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        for raw in [
            "2024-03-09",
            "03/09/2024",
            "03/09/24",
            "2024/03/09",
            "09-Mar-2024",
            "Mar 09, 2024",
            "20240309",
            "2024-03-09T00:00:00",
            "2024-03-09 22:59",
        ] {
            assert_eq!(parse_date(raw), Some(want), "{raw}");
        }
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn splits_number_cells() {
        assert_eq!(split_numbers("01 02 13 44 69 07"), vec![1, 2, 13, 44, 69, 7]);
        assert_eq!(split_numbers("4-5-6"), vec![4, 5, 6]);
        assert_eq!(split_numbers("10, 20,30"), vec![10, 20, 30]);
    }

    #[test]
    fn parse_int_accepts_float_form() {
        assert_eq!(parse_int("07"), Some(7));
        assert_eq!(parse_int("7.0"), Some(7));
        assert_eq!(parse_int("7.5"), None);
        assert_eq!(parse_int("-1"), None);
    }
}
