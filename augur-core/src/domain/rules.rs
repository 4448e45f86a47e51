//! Game rules — candidate domains and draw policy.
//!
//! A `GameRules` value fixes the white-ball domain `[white_min, white_max]`,
//! how many whites a ticket holds, the optional special-ball domain, and the
//! draw policy (unique/unordered vs ordered-with-replacement).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured configuration error raised at run start.
///
/// These are the only errors a run surfaces to its caller; everything else
/// degrades into the run's health report.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("white domain is empty: white_min={min} > white_max={max}")]
    EmptyWhiteDomain { min: u32, max: u32 },

    #[error("k_white={k} exceeds the white domain size {domain} for a unique-draw game")]
    TooManyWhites { k: usize, domain: usize },

    #[error("k_white must be at least 1")]
    NoWhites,

    #[error("special domain is incomplete: both special_min and special_max are required")]
    IncompleteSpecialDomain,

    #[error("special domain is empty: special_min={min} > special_max={max}")]
    EmptySpecialDomain { min: u32, max: u32 },

    #[error("k_special={k} exceeds the special domain size {domain}")]
    TooManySpecials { k: usize, domain: usize },

    #[error("unknown game '{0}'")]
    UnknownGame(String),

    #[error("invalid entity id '{0}'")]
    InvalidEntity(String),

    #[error("option '{name}' out of range: {value} (allowed {min}..={max})")]
    OptionOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("n_picks must be at least 1")]
    NoPicks,

    #[error("{ball} domain holds {len} candidates (max {max})")]
    DomainTooLarge { ball: &'static str, len: u64, max: u64 },
}

/// Largest candidate domain a surface is built over.
pub const MAX_DOMAIN_LEN: u64 = 10_000;

/// Size of `[lo, hi]`, 0 when empty. Computed in u64 so `0..=u32::MAX` fits.
fn span(lo: u32, hi: u32) -> u64 {
    if hi < lo {
        0
    } else {
        u64::from(hi) - u64::from(lo) + 1
    }
}

/// Candidate domain and draw policy for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    pub white_min: u32,
    pub white_max: u32,
    pub k_white: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_special: Option<usize>,
    /// Picks keep draw order (e.g. Pick-3 "straight" play).
    #[serde(default)]
    pub ordered: bool,
    /// Whites may repeat within a pick.
    #[serde(default)]
    pub replacement: bool,
}

impl GameRules {
    /// Unique, unordered game without a special ball.
    pub fn simple(white_min: u32, white_max: u32, k_white: usize) -> Self {
        Self {
            white_min,
            white_max,
            k_white,
            special_min: None,
            special_max: None,
            k_special: None,
            ordered: false,
            replacement: false,
        }
    }

    /// Attach a special-ball domain drawing `k` specials.
    pub fn with_special(mut self, special_min: u32, special_max: u32, k: usize) -> Self {
        self.special_min = Some(special_min);
        self.special_max = Some(special_max);
        self.k_special = Some(k);
        self
    }

    /// Switch to ordered draws with replacement (digit games).
    pub fn digits(mut self) -> Self {
        self.ordered = true;
        self.replacement = true;
        self
    }

    /// Look up a named game in the preset table.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let key = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        PRESETS
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, build)| build())
            .ok_or_else(|| ConfigError::UnknownGame(name.to_string()))
    }

    /// Names of every preset game.
    pub fn preset_names() -> Vec<&'static str> {
        PRESETS.iter().map(|(n, _)| *n).collect()
    }

    pub fn white_len(&self) -> usize {
        usize::try_from(span(self.white_min, self.white_max)).unwrap_or(usize::MAX)
    }

    pub fn special_len(&self) -> Option<usize> {
        match (self.special_min, self.special_max) {
            (Some(lo), Some(hi)) if hi >= lo => Some(usize::try_from(span(lo, hi)).unwrap_or(usize::MAX)),
            _ => None,
        }
    }

    pub fn has_special(&self) -> bool {
        self.special_len().is_some() && self.k_special.unwrap_or(0) > 0
    }

    /// Index of a white candidate in the surface vector.
    pub fn white_index(&self, value: u32) -> Option<usize> {
        if value < self.white_min || value > self.white_max {
            None
        } else {
            Some((value - self.white_min) as usize)
        }
    }

    pub fn white_value(&self, index: usize) -> u32 {
        self.white_min + index as u32
    }

    pub fn special_index(&self, value: u32) -> Option<usize> {
        let (lo, hi) = (self.special_min?, self.special_max?);
        if value < lo || value > hi {
            None
        } else {
            Some((value - lo) as usize)
        }
    }

    pub fn special_value(&self, index: usize) -> Option<u32> {
        self.special_min.map(|lo| lo + index as u32)
    }

    /// Clamp a special to the legal range.
    pub fn clamp_special(&self, value: u32) -> Option<u32> {
        let (lo, hi) = (self.special_min?, self.special_max?);
        Some(value.clamp(lo, hi))
    }

    /// Fail-fast validation at run start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.white_min > self.white_max {
            return Err(ConfigError::EmptyWhiteDomain {
                min: self.white_min,
                max: self.white_max,
            });
        }
        let white = span(self.white_min, self.white_max);
        if white > MAX_DOMAIN_LEN {
            return Err(ConfigError::DomainTooLarge {
                ball: "white",
                len: white,
                max: MAX_DOMAIN_LEN,
            });
        }
        if self.k_white == 0 {
            return Err(ConfigError::NoWhites);
        }
        if !self.replacement && self.k_white > self.white_len() {
            return Err(ConfigError::TooManyWhites {
                k: self.k_white,
                domain: self.white_len(),
            });
        }
        match (self.special_min, self.special_max) {
            (None, None) => {}
            (Some(lo), Some(hi)) => {
                if lo > hi {
                    return Err(ConfigError::EmptySpecialDomain { min: lo, max: hi });
                }
                let len = span(lo, hi);
                if len > MAX_DOMAIN_LEN {
                    return Err(ConfigError::DomainTooLarge {
                        ball: "special",
                        len,
                        max: MAX_DOMAIN_LEN,
                    });
                }
                let domain = len as usize;
                let k = self.k_special.unwrap_or(1);
                if k > domain {
                    return Err(ConfigError::TooManySpecials { k, domain });
                }
            }
            _ => return Err(ConfigError::IncompleteSpecialDomain),
        }
        Ok(())
    }
}

type PresetFn = fn() -> GameRules;

fn powerball() -> GameRules {
    GameRules::simple(1, 69, 5).with_special(1, 26, 1)
}

fn mega_millions() -> GameRules {
    GameRules::simple(1, 70, 5).with_special(1, 25, 1)
}

fn lotto_texas() -> GameRules {
    GameRules::simple(1, 54, 6)
}

fn cash_five() -> GameRules {
    GameRules::simple(1, 35, 5)
}

fn pick3() -> GameRules {
    GameRules::simple(0, 9, 3).digits()
}

fn pick4() -> GameRules {
    GameRules::simple(0, 9, 4).digits()
}

/// Static `{game → rules}` table.
const PRESETS: &[(&str, PresetFn)] = &[
    ("powerball", powerball),
    ("mega_millions", mega_millions),
    ("lotto_texas", lotto_texas),
    ("cash_five", cash_five),
    ("pick3", pick3),
    ("pick4", pick4),
];
