//! Model store -- persists fitted detectors keyed by feature set and domain.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/models/gaussian_anomaly_detector/<feature_group_id>/<domain>.json
//! ```

use crate::detect::{DetectError, FittedModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Bumped whenever the on-disk model layout changes.
pub const FORMAT_VERSION: u32 = 1;

const MODEL_KIND: &str = "gaussian_anomaly_detector";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no model stored at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model file {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model file {} has format version {found}, expected {expected}", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("model file {} is not a usable model: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: DetectError,
    },

    #[error("invalid domain name '{0}'")]
    InvalidDomain(String),
}

#[derive(Serialize, Deserialize)]
struct ModelFile {
    format_version: u32,
    domain: String,
    feature_group_id: String,
    saved_at: chrono::DateTime<chrono::Utc>,
    model: FittedModel,
}

/// Stable identifier for a set of feature names.
///
/// Order and duplicates do not matter: names are de-duplicated, sorted and
/// newline-joined before hashing with BLAKE3.
pub fn feature_group_id<S: AsRef<str>>(fields: &[S]) -> String {
    let canonical: BTreeSet<&str> = fields.iter().map(AsRef::as_ref).collect();
    let mut hasher = blake3::Hasher::new();
    for (i, name) in canonical.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(name.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Filesystem-backed store of fitted models.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the model file for `domain` trained on `fields`.
    pub fn model_path<S: AsRef<str>>(
        &self,
        domain: &str,
        fields: &[S],
    ) -> Result<PathBuf, StoreError> {
        validate_domain(domain)?;
        Ok(self
            .root
            .join("models")
            .join(MODEL_KIND)
            .join(feature_group_id(fields))
            .join(format!("{domain}.json")))
    }

    pub fn exists<S: AsRef<str>>(&self, domain: &str, fields: &[S]) -> bool {
        self.model_path(domain, fields)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Write `model` under `domain`, keyed by the model's own feature names.
    pub fn save(&self, domain: &str, model: &FittedModel) -> Result<PathBuf, StoreError> {
        let fields: Vec<&str> = model.feature_names().collect();
        let path = self.model_path(domain, &fields[..])?;
        model.validate().map_err(|source| StoreError::Invalid {
            path: path.clone(),
            source,
        })?;
        let dir = path.parent().unwrap_or(self.root.as_path());
        std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let file = ModelFile {
            format_version: FORMAT_VERSION,
            domain: domain.to_string(),
            feature_group_id: feature_group_id(&fields[..]),
            saved_at: chrono::Utc::now(),
            model: model.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Format {
            path: path.clone(),
            source,
        })?;

        // Write-then-rename so readers never see a half-written model.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), %domain, features = fields.len(), "saved model");
        Ok(path)
    }

    /// Load the model for `domain` trained on `fields`.
    ///
    /// The model is re-validated after parsing, so a hand-edited file with a
    /// non-positive std or an out-of-range contamination is rejected here
    /// rather than producing meaningless scores.
    pub fn load<S: AsRef<str>>(
        &self,
        domain: &str,
        fields: &[S],
    ) -> Result<FittedModel, StoreError> {
        let path = self.model_path(domain, fields)?;
        let content = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let file: ModelFile =
            serde_json::from_slice(&content).map_err(|source| StoreError::Format {
                path: path.clone(),
                source,
            })?;
        if file.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path,
                found: file.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if let Err(source) = file.model.validate() {
            return Err(StoreError::Invalid { path, source });
        }
        debug!(path = %path.display(), saved_at = %file.saved_at, "loaded model");
        Ok(file.model)
    }
}

fn validate_domain(domain: &str) -> Result<(), StoreError> {
    let bad = domain.is_empty()
        || domain == "."
        || domain.contains("..")
        || domain.contains('/')
        || domain.contains('\\')
        || domain.contains('\0');
    if bad {
        return Err(StoreError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}
