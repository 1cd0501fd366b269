use crate::detect::{
    DetectError, DetectorConfig, FeatureTable, FittedModel, Prediction, ScoreReport,
};
use std::sync::Arc;
use tracing::debug;

/// Estimator-style detector: constructed unfitted, fitted once, then scored.
///
/// The fitted state is an immutable snapshot. Re-fitting replaces the whole
/// snapshot, so a reader holding [`GaussianAnomalyDetector::snapshot`] keeps
/// scoring against consistent statistics.
#[derive(Debug, Clone)]
pub struct GaussianAnomalyDetector {
    config: DetectorConfig,
    state: State,
}

#[derive(Debug, Clone)]
enum State {
    Unfitted,
    Fitted(Arc<FittedModel>),
}

impl Default for GaussianAnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl GaussianAnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: State::Unfitted,
        }
    }

    /// Wrap an already fitted model, e.g. one loaded from a model store.
    pub fn from_model(model: FittedModel) -> Self {
        Self {
            config: *model.config(),
            state: State::Fitted(Arc::new(model)),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, State::Fitted(_))
    }

    pub fn fit(&mut self, table: &FeatureTable) -> Result<&mut Self, DetectError> {
        let model = FittedModel::fit(self.config, table)?;
        debug!(
            features = model.features().len(),
            rows = table.n_rows(),
            threshold = model.threshold(),
            "fitted gaussian detector"
        );
        self.state = State::Fitted(Arc::new(model));
        Ok(self)
    }

    /// Shared handle to the current fitted model.
    pub fn snapshot(&self) -> Result<Arc<FittedModel>, DetectError> {
        match &self.state {
            State::Fitted(model) => Ok(Arc::clone(model)),
            State::Unfitted => Err(DetectError::Unfitted),
        }
    }

    pub fn model(&self) -> Result<&FittedModel, DetectError> {
        match &self.state {
            State::Fitted(model) => Ok(model),
            State::Unfitted => Err(DetectError::Unfitted),
        }
    }

    pub fn score(&self, table: &FeatureTable) -> Result<ScoreReport, DetectError> {
        self.model()?.score(table)
    }

    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<u8>, DetectError> {
        self.model()?.predict(table)
    }

    pub fn predict_with_reasons(
        &self,
        table: &FeatureTable,
    ) -> Result<Vec<Prediction>, DetectError> {
        self.model()?.predict_with_reasons(table)
    }
}
