//! TOML configuration: `augur.toml` for the runner and `kappa.toml` for the
//! autotuned coupling strength.
//!
//! Every section carries serde defaults, so an empty or missing file yields
//! a working offline-capable setup rooted at `./data`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use augur_core::features::FeatureConfig;
use augur_core::oracle::OracleConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to serialize settings: {0}")]
    Serialize(String),
}

/// On-disk layout. Everything hangs off `data_dir` unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    /// Per-entity history CSVs; `{data_dir}/history` when unset.
    pub history_dir: Option<PathBuf>,
    /// Run archive; `{data_dir}/runs` when unset.
    pub runs_dir: Option<PathBuf>,
    /// Weights, bins, cap locks, temporal logs and `kappa.toml`.
    pub calibration_dir: Option<PathBuf>,
    /// Write run archives and temporal logs.
    pub archive: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            history_dir: None,
            runs_dir: None,
            calibration_dir: None,
            archive: true,
        }
    }
}

impl PathsConfig {
    /// Layout rooted at `dir` with archiving on.
    pub fn rooted(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("history"))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.runs_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("runs"))
    }

    pub fn calibration_dir(&self) -> PathBuf {
        self.calibration_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("calibration"))
    }

    pub fn kappa_path(&self) -> PathBuf {
        self.calibration_dir().join("kappa.toml")
    }

    pub fn temporal_logs_path(&self) -> PathBuf {
        self.calibration_dir().join("temporal_logs.csv")
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.calibration_dir().join("outcomes.csv")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Agent pool size; 0 means one thread per core.
    pub threads: usize,
    pub cache_ttl_mins: u64,
    /// History older than this is reported stale by ops health.
    pub max_staleness_days: i64,
    /// Benchmark ticker for relative strength.
    pub benchmark: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            cache_ttl_mins: 60,
            max_staleness_days: 14,
            benchmark: "SPY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Ridge penalty.
    pub lambda: f64,
    /// Upper bound on the L1 norm of fitted weights.
    pub l1_cap: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            l1_cap: 4.0,
        }
    }
}

/// Top-level `augur.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugurConfig {
    pub paths: PathsConfig,
    pub oracle: OracleConfig,
    pub features: FeatureConfig,
    pub orchestrator: OrchestratorConfig,
    pub calibration: CalibrationConfig,
}

impl AugurConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Offline configuration rooted at `dir`.
    pub fn offline_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig::rooted(dir),
            oracle: OracleConfig {
                offline: true,
                ..OracleConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Contents of `kappa.toml`, written by the autotuner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KappaFile {
    pub kappa: f64,
    /// Metric the value was tuned on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Joined log rows the scan used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl KappaFile {
    /// Missing file reads as κ = 0.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SettingsError::Serialize(e.to_string()))?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AugurConfig::from_toml("").unwrap();
        assert_eq!(cfg, AugurConfig::default());
        assert_eq!(cfg.orchestrator.cache_ttl_mins, 60);
        assert_eq!(cfg.calibration.lambda, 1.0);
        assert_eq!(cfg.calibration.l1_cap, 4.0);
        assert!(cfg.paths.archive);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = AugurConfig::from_toml(
            r#"
            [paths]
            data_dir = "/tmp/augur"

            [oracle]
            offline = true

            [orchestrator]
            threads = 2
            "#,
        )
        .unwrap();
        assert!(cfg.oracle.offline);
        assert_eq!(cfg.oracle.timeout_secs, 6);
        assert_eq!(cfg.orchestrator.threads, 2);
        assert_eq!(cfg.orchestrator.max_staleness_days, 14);
        assert_eq!(cfg.paths.history_dir(), PathBuf::from("/tmp/augur/history"));
        assert_eq!(
            cfg.paths.kappa_path(),
            PathBuf::from("/tmp/augur/calibration/kappa.toml")
        );
    }

    #[test]
    fn explicit_dirs_override_layout() {
        let paths = PathsConfig {
            runs_dir: Some(PathBuf::from("/archive")),
            ..PathsConfig::rooted("/data")
        };
        assert_eq!(paths.runs_dir(), PathBuf::from("/archive"));
        assert_eq!(paths.history_dir(), PathBuf::from("/data/history"));
    }

    #[test]
    fn unknown_types_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("augur.toml");
        fs::write(&path, "[orchestrator]\nthreads = \"many\"\n").unwrap();
        assert!(matches!(
            AugurConfig::load(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(
            AugurConfig::load_or_default(&dir.path().join("absent.toml")).unwrap(),
            AugurConfig::default()
        );
    }

    #[test]
    fn kappa_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal").join("kappa.toml");
        assert_eq!(KappaFile::load(&path).unwrap().kappa, 0.0);

        let k = KappaFile {
            kappa: 2.5e15,
            metric: Some("log_loss".to_string()),
            score: Some(0.12),
            samples: Some(3),
            updated: Some("2024-06-01T00:00:00Z".to_string()),
        };
        k.save(&path).unwrap();
        assert_eq!(KappaFile::load(&path).unwrap(), k);
    }
}
