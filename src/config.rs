//! TOML configuration for the analyzer and CLI.
//!
//! Layered the usual way: compiled-in defaults, an optional config file
//! (path from `GAUSSIAN_ANOMALY_CONFIG` or the standard system location),
//! then command-line overrides applied by the caller.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::DetectorConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GAUSSIAN_ANOMALY_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/gaussian-anomaly/config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .detector
            .to_detector_config()
            .with_context(|| format!("invalid [detector] section in {}", path.display()))?;
        Ok(config)
    }

    /// Config files consulted by [`AppConfig::load_or_default`], highest
    /// priority first.
    pub fn search_path() -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            candidates.push(Candidate {
                path: PathBuf::from(path),
                required: true,
            });
        }
        candidates.push(Candidate {
            path: PathBuf::from(SYSTEM_CONFIG_PATH),
            required: false,
        });
        candidates
    }

    /// First loadable file on the search path, else compiled-in defaults.
    ///
    /// Nothing is logged here because this usually runs before tracing is
    /// set up; pass the returned [`ConfigOrigin`] to the log once it is.
    pub fn load_or_default() -> (Self, ConfigOrigin) {
        Self::load_first(&Self::search_path())
    }

    fn load_first(candidates: &[Candidate]) -> (Self, ConfigOrigin) {
        let mut origin = ConfigOrigin::default();
        for candidate in candidates {
            if !candidate.required && !candidate.path.exists() {
                continue;
            }
            match Self::load(&candidate.path) {
                Ok(config) => {
                    origin.path = Some(candidate.path.clone());
                    return (config, origin);
                }
                Err(e) => origin.rejected.push((candidate.path.clone(), format!("{e:#}"))),
            }
        }
        (Self::default(), origin)
    }
}

/// A config file location. A `required` file that is missing counts as a
/// failure; an optional one is skipped silently.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub required: bool,
}

/// Where the effective configuration came from.
#[derive(Debug, Default)]
pub struct ConfigOrigin {
    /// `None` when compiled-in defaults are in use.
    pub path: Option<PathBuf>,
    /// Files that were tried and could not be used, with the error.
    pub rejected: Vec<(PathBuf, String)>,
}

impl ConfigOrigin {
    pub fn file(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            rejected: Vec::new(),
        }
    }

    /// Log how the configuration was resolved.
    pub fn report(&self) {
        for (path, error) in &self.rejected {
            warn!(path = %path.display(), %error, "skipping config file");
        }
        match &self.path {
            Some(path) => info!(path = %path.display(), "loaded configuration"),
            None => debug!("no config file found, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Training parameters used when a new model is fitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// Expected outlier fraction in the training data, in (0, 0.5).
    pub contamination: f64,
    /// Fit on `ln(v + 1)` instead of raw values.
    pub log_transform: bool,
    /// Floor added to every standard deviation.
    pub std_floor: f64,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            log_transform: true,
            std_floor: DetectorConfig::DEFAULT_STD_FLOOR,
        }
    }
}

impl DetectorSection {
    pub fn to_detector_config(&self) -> Result<DetectorConfig> {
        let config = DetectorConfig::new(self.contamination, self.log_transform)?
            .with_std_floor(self.std_floor)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Which fields are trained on and which are passed through to the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    /// Model name; one model per domain and feature set.
    pub domain: String,
    /// Numeric features the detector is fitted on.
    pub train_fields: Vec<String>,
    /// Record fields copied into every output message.
    pub include_fields: Vec<String>,
    /// Score with a stored model instead of training on the input batch.
    pub load_model: bool,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            domain: "main".to_string(),
            train_fields: ["duration", "orig_bytes", "resp_bytes"]
                .into_iter()
                .map(String::from)
                .collect(),
            include_fields: ["uid", "community_id", "duration", "orig_bytes", "resp_bytes"]
                .into_iter()
                .map(String::from)
                .collect(),
            load_model: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the model store.
    pub model_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("/var/lib/gaussian-anomaly"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON log lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.detector.contamination, 0.05);
        assert!(cfg.detector.log_transform);
        assert_eq!(cfg.detector.std_floor, 1e-100);
        assert!(cfg.detector.to_detector_config().is_ok());

        assert_eq!(cfg.analyzer.domain, "main");
        assert_eq!(cfg.analyzer.train_fields, vec!["duration", "orig_bytes", "resp_bytes"]);
        assert_eq!(cfg.analyzer.include_fields.len(), 5);
        assert!(cfg.analyzer.load_model);

        assert_eq!(cfg.storage.model_root, PathBuf::from("/var/lib/gaussian-anomaly"));
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[detector]
contamination = 0.1
log_transform = false

[analyzer]
domain = "conn"
train_fields = ["duration", "resp_bytes"]
include_fields = ["uid"]
load_model = false

[storage]
model_root = "/opt/models"

[logging]
level = "debug"
json = true
"#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.detector.contamination, 0.1);
        assert!(!cfg.detector.log_transform);
        assert_eq!(cfg.detector.std_floor, 1e-100);
        assert_eq!(cfg.analyzer.domain, "conn");
        assert_eq!(cfg.analyzer.train_fields, vec!["duration", "resp_bytes"]);
        assert!(!cfg.analyzer.load_model);
        assert_eq!(cfg.storage.model_root, PathBuf::from("/opt/models"));
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("[analyzer]\ndomain = \"dns\"\n").unwrap();
        assert_eq!(cfg.analyzer.domain, "dns");
        assert_eq!(cfg.analyzer.train_fields.len(), 3);
        assert_eq!(cfg.detector.contamination, 0.05);
    }

    #[test]
    fn test_load_rejects_bad_contamination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detector]\ncontamination = 0.7\n").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    fn candidate(path: PathBuf, required: bool) -> Candidate {
        Candidate { path, required }
    }

    #[test]
    fn test_first_loadable_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[detector\n").unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[analyzer]\ndomain = \"conn\"\n").unwrap();
        let later = dir.path().join("later.toml");
        std::fs::write(&later, "[analyzer]\ndomain = \"dns\"\n").unwrap();

        let candidates = [
            candidate(dir.path().join("absent.toml"), true),
            candidate(broken.clone(), false),
            candidate(good.clone(), false),
            candidate(later, false),
        ];
        let (cfg, origin) = AppConfig::load_first(&candidates);
        assert_eq!(cfg.analyzer.domain, "conn");
        assert_eq!(origin.path, Some(good));
        assert_eq!(origin.rejected.len(), 2);
        assert_eq!(origin.rejected[1].0, broken);
        assert!(origin.rejected[0].1.contains("failed to read config file"));
        origin.report();
    }

    #[test]
    fn test_missing_optional_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = [candidate(dir.path().join("config.toml"), false)];
        let (cfg, origin) = AppConfig::load_first(&candidates);
        assert_eq!(cfg.analyzer.domain, "main");
        assert!(origin.path.is_none());
        assert!(origin.rejected.is_empty());
    }

    #[test]
    fn test_invalid_file_is_rejected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detector]\ncontamination = 0.7\n").unwrap();
        let candidates = [candidate(path, true)];
        let (cfg, origin) = AppConfig::load_first(&candidates);
        assert_eq!(cfg.detector.contamination, 0.05);
        assert_eq!(origin.rejected.len(), 1);
        assert!(origin.rejected[0].1.contains("invalid [detector] section"));
    }
}
