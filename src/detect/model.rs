//! Fitted Gaussian model: parameter estimation, threshold calibration and scoring.

use crate::detect::anomaly::{density, log1p_transform, log_density, FeatureSeries};
use crate::detect::{DetectError, FeatureTable, NOT_ANOMALOUS};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Training configuration, fixed for the lifetime of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Expected fraction of outliers in the training data, in (0, 0.5).
    pub contamination: f64,
    /// Replace every value `v` with `ln(v + 1)` before fitting and scoring.
    pub log_transform: bool,
    /// Added to every standard deviation so it is strictly positive.
    #[serde(default = "default_std_floor")]
    pub std_floor: f64,
}

fn default_std_floor() -> f64 {
    DetectorConfig::DEFAULT_STD_FLOOR
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contamination: Self::DEFAULT_CONTAMINATION,
            log_transform: false,
            std_floor: Self::DEFAULT_STD_FLOOR,
        }
    }
}

impl DetectorConfig {
    pub const DEFAULT_CONTAMINATION: f64 = 0.01;
    pub const DEFAULT_STD_FLOOR: f64 = 1e-100;

    pub fn new(contamination: f64, log_transform: bool) -> Result<Self, DetectError> {
        let config = Self {
            contamination,
            log_transform,
            std_floor: Self::DEFAULT_STD_FLOOR,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_std_floor(self, std_floor: f64) -> Result<Self, DetectError> {
        let config = Self { std_floor, ..self };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(DetectError::InvalidConfig(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if !(self.std_floor > 0.0 && self.std_floor.is_finite()) {
            return Err(DetectError::InvalidConfig(format!(
                "std_floor must be a positive finite number, got {}",
                self.std_floor
            )));
        }
        Ok(())
    }
}

/// Fitted parameters of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub name: String,
    #[serde(with = "float_repr")]
    pub mean: f64,
    #[serde(with = "float_repr")]
    pub std: f64,
}

/// Joint density of a record, kept both directly and in the log domain.
///
/// The direct product underflows to zero (or overflows to infinity) once
/// enough features are multiplied together; the log sum does not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDensity {
    #[serde(with = "float_repr")]
    pub density: f64,
    #[serde(with = "float_repr")]
    pub log_density: f64,
}

impl JointDensity {
    /// Build from a running product and log sum.
    ///
    /// A product that overflowed to infinity and then met a zero density is
    /// NaN even though the log sum is well defined; it is recomputed from the
    /// log sum. Any NaN left over carries a positive sign so it orders above
    /// every number regardless of the platform's default NaN.
    pub fn new(density: f64, log_density: f64) -> Self {
        let density = if density.is_nan() && !log_density.is_nan() {
            log_density.exp()
        } else {
            density
        };
        Self {
            density: positive_nan(density),
            log_density: positive_nan(log_density),
        }
    }

    /// Strict "less than" used for the anomaly decision.
    ///
    /// Compares the products when both are normal floats, so small feature
    /// sets decide exactly as the direct formulation does. A NaN product on
    /// either side is decided by the log sums alone; everything else falls
    /// back to the total order.
    pub fn is_below(&self, threshold: &JointDensity) -> bool {
        if self.density.is_normal() && threshold.density.is_normal() {
            self.density < threshold.density
        } else if self.density.is_nan() || threshold.density.is_nan() {
            self.log_density.total_cmp(&threshold.log_density) == Ordering::Less
        } else {
            self.total_cmp(threshold) == Ordering::Less
        }
    }

    /// Product first, log sum to break ties between underflowed or overflowed
    /// products.
    pub fn total_cmp(&self, other: &JointDensity) -> Ordering {
        self.density
            .total_cmp(&other.density)
            .then_with(|| self.log_density.total_cmp(&other.log_density))
    }
}

/// Decision and reason for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 if anomalous, 0 otherwise.
    pub decision: u8,
    pub reason: String,
}

/// Everything computed by one scoring call. Never reused across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub feature_names: Vec<String>,
    /// Row-major N x F per-feature densities.
    pub densities: Vec<Vec<f64>>,
    pub joint: Vec<JointDensity>,
    pub reasons: Vec<String>,
    pub anomalies: Vec<bool>,
}

impl ScoreReport {
    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn decisions(&self) -> Vec<u8> {
        self.anomalies.iter().map(|&a| u8::from(a)).collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|&&a| a).count()
    }

    pub fn into_predictions(self) -> Vec<Prediction> {
        self.anomalies
            .into_iter()
            .zip(self.reasons)
            .map(|(anomalous, reason)| Prediction {
                decision: u8::from(anomalous),
                reason,
            })
            .collect()
    }
}

/// A fitted detector. Immutable; safe to share across threads for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    config: DetectorConfig,
    features: Vec<FeatureStats>,
    threshold: JointDensity,
}

impl FittedModel {
    /// Estimate per-feature statistics from `table` and calibrate the threshold
    /// so that roughly `contamination` of the training rows fall below it.
    ///
    /// The table's column order becomes the model's feature order.
    pub fn fit(config: DetectorConfig, table: &FeatureTable) -> Result<Self, DetectError> {
        config.validate()?;
        if table.n_columns() == 0 {
            return Err(DetectError::DegenerateTrainingSet {
                reason: "training table has no feature columns".into(),
            });
        }
        if table.is_empty() {
            return Err(DetectError::DegenerateTrainingSet {
                reason: "training table has no rows".into(),
            });
        }

        let table = transform(&config, table);
        let features: Vec<FeatureStats> = table
            .columns()
            .map(|(name, values)| {
                let series = FeatureSeries::new(values);
                FeatureStats {
                    name: name.to_string(),
                    mean: series.mean(),
                    std: series.std_dev() + config.std_floor,
                }
            })
            .collect();

        let columns = resolve(&features, &table)?;
        let mut joint: Vec<JointDensity> = (0..table.n_rows())
            .map(|row| score_row(&features, &columns, row).1)
            .collect();
        joint.sort_by(JointDensity::total_cmp);

        // floor(N * contamination) < N because contamination < 0.5
        let rank = (table.n_rows() as f64 * config.contamination).floor() as usize;
        let threshold = joint[rank.min(joint.len() - 1)];

        Ok(Self {
            config,
            features,
            threshold,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Fitted features in scoring order.
    pub fn features(&self) -> &[FeatureStats] {
        &self.features
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn mean(&self, feature: &str) -> Option<f64> {
        self.feature(feature).map(|f| f.mean)
    }

    pub fn std(&self, feature: &str) -> Option<f64> {
        self.feature(feature).map(|f| f.std)
    }

    pub fn means(&self) -> BTreeMap<String, f64> {
        self.features.iter().map(|f| (f.name.clone(), f.mean)).collect()
    }

    pub fn stds(&self) -> BTreeMap<String, f64> {
        self.features.iter().map(|f| (f.name.clone(), f.std)).collect()
    }

    /// Joint density below which a record is anomalous.
    pub fn threshold(&self) -> f64 {
        self.threshold.density
    }

    pub fn joint_threshold(&self) -> JointDensity {
        self.threshold
    }

    fn feature(&self, name: &str) -> Option<&FeatureStats> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Score every row of `table`. Columns are matched by name; extra columns
    /// are ignored and a missing fitted feature is an error.
    pub fn score(&self, table: &FeatureTable) -> Result<ScoreReport, DetectError> {
        // Resolve before transforming so a missing column fails without extra work.
        resolve(&self.features, table)?;
        let table = transform(&self.config, table);
        let columns = resolve(&self.features, &table)?;

        let n_rows = table.n_rows();
        let mut densities = Vec::with_capacity(n_rows);
        let mut joint = Vec::with_capacity(n_rows);
        let mut reasons = Vec::with_capacity(n_rows);
        let mut anomalies = Vec::with_capacity(n_rows);

        for row in 0..n_rows {
            let (row_densities, row_joint, min_idx) = score_row(&self.features, &columns, row);
            let anomalous = row_joint.is_below(&self.threshold);
            let reason = match (anomalous, min_idx) {
                (true, Some(idx)) => self.features[idx].name.clone(),
                _ => NOT_ANOMALOUS.to_string(),
            };
            densities.push(row_densities);
            joint.push(row_joint);
            reasons.push(reason);
            anomalies.push(anomalous);
        }

        Ok(ScoreReport {
            feature_names: self.features.iter().map(|f| f.name.clone()).collect(),
            densities,
            joint,
            reasons,
            anomalies,
        })
    }

    /// 1 for anomalous rows, 0 otherwise.
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<u8>, DetectError> {
        Ok(self.score(table)?.decisions())
    }

    pub fn predict_with_reasons(
        &self,
        table: &FeatureTable,
    ) -> Result<Vec<Prediction>, DetectError> {
        Ok(self.score(table)?.into_predictions())
    }

    /// Check the invariants `fit` guarantees, for models that did not come
    /// from `fit` (e.g. read back from disk).
    pub fn validate(&self) -> Result<(), DetectError> {
        self.config.validate()?;
        if self.features.is_empty() {
            return Err(DetectError::InvalidModel("model has no features".into()));
        }
        for (idx, f) in self.features.iter().enumerate() {
            if self.features[..idx].iter().any(|g| g.name == f.name) {
                return Err(DetectError::DuplicateFeature {
                    feature: f.name.clone(),
                });
            }
            if !(f.std > 0.0 && f.std.is_finite()) {
                return Err(DetectError::InvalidModel(format!(
                    "feature '{}' has std {}, expected a positive finite number",
                    f.name, f.std
                )));
            }
            if f.mean.is_infinite() {
                return Err(DetectError::InvalidModel(format!(
                    "feature '{}' has infinite mean",
                    f.name
                )));
            }
        }
        Ok(())
    }
}

fn transform<'a>(config: &DetectorConfig, table: &'a FeatureTable) -> Cow<'a, FeatureTable> {
    if config.log_transform {
        Cow::Owned(table.map_values(log1p_transform))
    } else {
        Cow::Borrowed(table)
    }
}

/// Input columns in model feature order.
fn resolve<'a>(
    features: &[FeatureStats],
    table: &'a FeatureTable,
) -> Result<Vec<&'a [f64]>, DetectError> {
    features
        .iter()
        .map(|f| {
            table.column(&f.name).ok_or_else(|| DetectError::MissingFeature {
                feature: f.name.clone(),
            })
        })
        .collect()
}

/// Per-feature densities, joint density and index of the least likely feature
/// (first one on ties) for a single row.
fn score_row(
    features: &[FeatureStats],
    columns: &[&[f64]],
    row: usize,
) -> (Vec<f64>, JointDensity, Option<usize>) {
    let mut densities = Vec::with_capacity(features.len());
    let mut product = 1.0;
    let mut log_sum = 0.0;
    let mut min_idx: Option<usize> = None;

    for (idx, (stats, column)) in features.iter().zip(columns).enumerate() {
        let x = column[row];
        let d = density(stats.mean, stats.std, x);
        product *= d;
        log_sum += log_density(stats.mean, stats.std, x);
        let new_min = match min_idx {
            Some(m) => d < densities[m],
            None => true,
        };
        if new_min {
            min_idx = Some(idx);
        }
        densities.push(d);
    }

    (densities, JointDensity::new(product, log_sum), min_idx)
}

fn positive_nan(value: f64) -> f64 {
    if value.is_nan() {
        value.copysign(1.0)
    } else {
        value
    }
}

/// JSON has no representation for NaN or infinities; write them as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(super::positive_nan(f64::NAN)),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid float: {other}"))),
            },
        }
    }
}
