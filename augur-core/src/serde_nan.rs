//! Serde adapter that writes NaN floats as JSON `null` and reads `null` (or a
//! missing field) back as NaN.
//!
//! Use with `#[serde(with = "crate::serde_nan", default = "crate::serde_nan::nan")]`.

use serde::{Deserialize, Deserializer, Serializer};

pub fn nan() -> f64 {
    f64::NAN
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(value)
    } else {
        serializer.serialize_none()
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Probe {
        #[serde(with = "super", default = "super::nan")]
        x: f64,
    }

    #[test]
    fn nan_round_trips_through_null() {
        let json = serde_json::to_string(&Probe { x: f64::NAN }).unwrap();
        assert_eq!(json, r#"{"x":null}"#);
        let back: Probe = serde_json::from_str(&json).unwrap();
        assert!(back.x.is_nan());
        let missing: Probe = serde_json::from_str("{}").unwrap();
        assert!(missing.x.is_nan());
        let finite: Probe = serde_json::from_str(r#"{"x":1.5}"#).unwrap();
        assert_eq!(finite.x, 1.5);
    }
}
