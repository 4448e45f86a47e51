//! Oracle fetchers: a bounded, date-keyed bundle of exogenous signals.
//!
//! Lunar phase, planetary alignment and Mercury retrograde are computed
//! locally. Kp/Ap, F10.7, flares and the VIX close come over HTTP; those
//! fetches run in parallel for one date and any failure degrades to the
//! neutral value (NaN, or 0 flares) with a warning. `OracleHub::signals`
//! never returns an error.

pub mod circuit_breaker;
pub mod ephemeris;
pub mod http;
pub mod lunar;
pub mod swpc;
pub mod vix;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use ephemeris::{Ephemeris, MeanElementsEphemeris, NoEphemeris};
pub use http::{JsonFetcher, OracleError, RetryPolicy};

/// Volatility regime derived from the VIX close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Calm,
    Normal,
    Stressed,
    Unknown,
}

impl MarketRegime {
    pub fn from_vix(vix: f64) -> Self {
        if !vix.is_finite() {
            MarketRegime::Unknown
        } else if vix < 15.0 {
            MarketRegime::Calm
        } else if vix < 25.0 {
            MarketRegime::Normal
        } else {
            MarketRegime::Stressed
        }
    }
}

/// Signal bundle for one date. NaN means "unavailable" and is read as neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSignals {
    pub date: NaiveDate,
    pub lunar_phase: f64,
    #[serde(with = "crate::serde_nan", default = "crate::serde_nan::nan")]
    pub kp_3h_max: f64,
    #[serde(with = "crate::serde_nan", default = "crate::serde_nan::nan")]
    pub ap_daily: f64,
    #[serde(with = "crate::serde_nan", default = "crate::serde_nan::nan")]
    pub f10_7_flux: f64,
    pub flare_mx_72h: u32,
    pub alignment_index: f64,
    pub mercury_retro: bool,
    #[serde(with = "crate::serde_nan", default = "crate::serde_nan::nan")]
    pub vix_close: f64,
    /// Sources that could not be fetched or computed for this date.
    #[serde(default)]
    pub missing: Vec<String>,
}

impl OracleSignals {
    /// Locally computed signals with every remote field neutral.
    pub fn local(date: NaiveDate, eph: &dyn Ephemeris) -> Self {
        let (alignment_index, fallback) = ephemeris::alignment_index(eph, date);
        let retro = ephemeris::mercury_retrograde(eph, date);
        let mut missing = Vec::new();
        if fallback {
            missing.push("ephemeris".to_string());
        }
        Self {
            date,
            lunar_phase: lunar::lunar_phase(date),
            kp_3h_max: f64::NAN,
            ap_daily: f64::NAN,
            f10_7_flux: f64::NAN,
            flare_mx_72h: 0,
            alignment_index,
            mercury_retro: retro.unwrap_or(false),
            vix_close: f64::NAN,
            missing,
        }
    }

    /// Fully neutral bundle (midpoints, NaN remote fields).
    pub fn neutral(date: NaiveDate) -> Self {
        Self {
            date,
            lunar_phase: 0.5,
            kp_3h_max: f64::NAN,
            ap_daily: f64::NAN,
            f10_7_flux: f64::NAN,
            flare_mx_72h: 0,
            alignment_index: 0.5,
            mercury_retro: false,
            vix_close: f64::NAN,
            missing: Vec::new(),
        }
    }

    pub fn regime(&self) -> MarketRegime {
        MarketRegime::from_vix(self.vix_close)
    }

    /// Kp with NaN read as quiet (0).
    pub fn kp_or_quiet(&self) -> f64 {
        if self.kp_3h_max.is_finite() {
            self.kp_3h_max
        } else {
            0.0
        }
    }

    /// Alignment z-score against a 0.5 ± 0.2 reference.
    pub fn alignment_z(&self) -> f64 {
        (self.alignment_index - 0.5) / 0.2
    }
}

/// Oracle layer settings (`[oracle]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Skip every HTTP fetch.
    pub offline: bool,
    /// Cache TTL in seconds, clamped to 10–30 minutes.
    pub ttl_secs: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub kp_url: String,
    pub f107_url: String,
    pub flares_url: String,
    pub vix_symbol: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            offline: false,
            ttl_secs: 600,
            timeout_secs: 6,
            max_retries: 2,
            backoff_ms: 500,
            kp_url: swpc::KP_URL.to_string(),
            f107_url: swpc::F107_URL.to_string(),
            flares_url: swpc::FLARES_URL.to_string(),
            vix_symbol: vix::VIX_SYMBOL.to_string(),
        }
    }
}

impl OracleConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.clamp(600, 1800))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs.clamp(1, 6)),
            max_retries: self.max_retries.min(2),
            base_delay: Duration::from_millis(self.backoff_ms.min(500)),
        }
    }
}

/// Date-keyed oracle cache plus the fetchers behind it.
pub struct OracleHub {
    config: OracleConfig,
    fetcher: Option<JsonFetcher>,
    ephemeris: Arc<dyn Ephemeris>,
    cache: Mutex<HashMap<NaiveDate, (Instant, OracleSignals)>>,
}

impl OracleHub {
    pub fn new(config: OracleConfig) -> Self {
        Self::with_ephemeris(config, Arc::new(MeanElementsEphemeris))
    }

    pub fn with_ephemeris(config: OracleConfig, ephemeris: Arc<dyn Ephemeris>) -> Self {
        let fetcher = if config.offline {
            None
        } else {
            match JsonFetcher::new(config.retry_policy()) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(error = %e, "HTTP client unavailable; oracle runs offline");
                    None
                }
            }
        };
        Self {
            config,
            fetcher,
            ephemeris,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Hub that never touches the network.
    pub fn offline() -> Self {
        Self::new(OracleConfig {
            offline: true,
            ..OracleConfig::default()
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Signals for `date`, served from cache within the TTL.
    pub fn signals(&self, date: NaiveDate) -> OracleSignals {
        let ttl = self.config.ttl();
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((at, hit)) = cache.get(&date) {
                if at.elapsed() < ttl {
                    debug!(%date, "oracle cache hit");
                    return hit.clone();
                }
            }
        }

        let signals = self.compute(date);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(date, (Instant::now(), signals.clone()));
        signals
    }

    fn compute(&self, date: NaiveDate) -> OracleSignals {
        let mut signals = OracleSignals::local(date, self.ephemeris.as_ref());
        let Some(fetcher) = &self.fetcher else {
            signals.missing.push("remote (offline)".to_string());
            return signals;
        };

        let cfg = &self.config;
        let (kp, (f107, (flares, vix))) = rayon::join(
            || fetcher.get_json(&cfg.kp_url).and_then(|j| swpc::parse_kp(&j, date)),
            || {
                rayon::join(
                    || fetcher.get_json(&cfg.f107_url).and_then(|j| swpc::parse_f107(&j, date)),
                    || {
                        rayon::join(
                            || {
                                fetcher
                                    .get_json(&cfg.flares_url)
                                    .and_then(|j| swpc::parse_flares(&j, date))
                            },
                            || {
                                fetcher
                                    .get_json(&vix::chart_url(&cfg.vix_symbol, date))
                                    .and_then(|j| vix::parse_close(j, date))
                            },
                        )
                    },
                )
            },
        );

        match kp {
            Ok((kp, ap)) => {
                signals.kp_3h_max = kp;
                signals.ap_daily = ap;
            }
            Err(e) => degrade(&mut signals, "kp", &e),
        }
        match f107 {
            Ok(flux) => signals.f10_7_flux = flux,
            Err(e) => degrade(&mut signals, "f10_7", &e),
        }
        match flares {
            Ok(n) => signals.flare_mx_72h = n,
            Err(e) => degrade(&mut signals, "flares", &e),
        }
        match vix {
            Ok(close) => signals.vix_close = close,
            Err(e) => degrade(&mut signals, "vix", &e),
        }
        signals
    }
}

fn degrade(signals: &mut OracleSignals, source: &str, err: &OracleError) {
    warn!(date = %signals.date, source, error = %err, "oracle fetch failed; using neutral value");
    signals.missing.push(source.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn offline_hub_is_neutral_and_bounded() {
        let hub = OracleHub::offline();
        let s = hub.signals(date());
        assert!((0.0..1.0).contains(&s.lunar_phase));
        assert!((0.0..=1.0).contains(&s.alignment_index));
        assert!(s.kp_3h_max.is_nan());
        assert!(s.vix_close.is_nan());
        assert_eq!(s.flare_mx_72h, 0);
        assert_eq!(s.regime(), MarketRegime::Unknown);
        assert!(s.missing.iter().any(|m| m.contains("offline")));
    }

    #[test]
    fn idempotent_within_ttl() {
        let hub = OracleHub::offline();
        let a = hub.signals(date());
        let b = hub.signals(date());
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn no_ephemeris_uses_seasonal_alignment() {
        let hub = OracleHub::with_ephemeris(
            OracleConfig {
                offline: true,
                ..OracleConfig::default()
            },
            Arc::new(NoEphemeris),
        );
        let s = hub.signals(date());
        assert_eq!(s.alignment_index, ephemeris::seasonal_proxy(date()));
        assert!(!s.mercury_retro);
        assert!(s.missing.iter().any(|m| m == "ephemeris"));
    }

    #[test]
    fn regime_thresholds() {
        assert_eq!(MarketRegime::from_vix(12.0), MarketRegime::Calm);
        assert_eq!(MarketRegime::from_vix(20.0), MarketRegime::Normal);
        assert_eq!(MarketRegime::from_vix(31.0), MarketRegime::Stressed);
        assert_eq!(MarketRegime::from_vix(f64::NAN), MarketRegime::Unknown);
    }

    #[test]
    fn signals_round_trip_through_json_with_nan() {
        let s = OracleSignals::neutral(date());
        let json = serde_json::to_string(&s).unwrap();
        let back: OracleSignals = serde_json::from_str(&json).unwrap();
        assert!(back.kp_3h_max.is_nan());
        assert_eq!(back.alignment_index, 0.5);
    }

    #[test]
    fn config_clamps_policy() {
        let cfg = OracleConfig {
            ttl_secs: 5,
            timeout_secs: 60,
            max_retries: 9,
            ..OracleConfig::default()
        };
        assert_eq!(cfg.ttl(), Duration::from_secs(600));
        let p = cfg.retry_policy();
        assert_eq!(p.timeout, Duration::from_secs(6));
        assert_eq!(p.max_retries, 2);
    }
}
