//! Gaussian anomaly detection and reason attribution.

pub mod anomaly;
pub mod detector;
pub mod model;
pub mod table;

pub use detector::GaussianAnomalyDetector;
pub use model::{
    DetectorConfig, FeatureStats, FittedModel, JointDensity, Prediction, ScoreReport,
};
pub use table::FeatureTable;

use thiserror::Error;

/// Reason reported for every row that is not flagged.
pub const NOT_ANOMALOUS: &str = "not_anomalous";

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("feature '{feature}' not found in input table")]
    MissingFeature { feature: String },

    #[error("detector has not been fitted")]
    Unfitted,

    #[error("cannot fit on degenerate training set: {reason}")]
    DegenerateTrainingSet { reason: String },

    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid fitted model: {0}")]
    InvalidModel(String),

    #[error("column '{feature}' has {found} rows, expected {expected}")]
    RaggedColumns {
        feature: String,
        expected: usize,
        found: usize,
    },

    #[error("feature '{feature}' appears more than once")]
    DuplicateFeature { feature: String },

    #[error("feature '{feature}' is not numeric at row {row}")]
    NonNumeric { feature: String, row: usize },
}
