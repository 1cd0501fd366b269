//! Record-level analyzer: train or load a detector, score a batch of records
//! and turn every record into an output message.

pub mod records;

use crate::config::{AnalyzerSection, AppConfig};
use crate::detect::{DetectorConfig, FeatureTable, FittedModel, Prediction};
use crate::storage::ModelStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

/// One input record: a flat JSON object.
pub type Record = Map<String, Value>;

/// Scored record handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub dataset_name: String,
    /// 1 if anomalous, 0 otherwise.
    pub score: u8,
    /// Reason string; `not_anomalous` for normal records.
    pub msg: String,
    /// `score`, `reason` and every configured include field.
    pub data_extra: Map<String, Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct GaussianAnalyzer {
    settings: AnalyzerSection,
    detector: DetectorConfig,
    store: ModelStore,
}

impl GaussianAnalyzer {
    pub fn new(settings: AnalyzerSection, detector: DetectorConfig, store: ModelStore) -> Self {
        Self {
            settings,
            detector,
            store,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let detector = config
            .detector
            .to_detector_config()
            .context("invalid detector configuration")?;
        Ok(Self::new(
            config.analyzer.clone(),
            detector,
            ModelStore::new(&config.storage.model_root),
        ))
    }

    pub fn settings(&self) -> &AnalyzerSection {
        &self.settings
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Fit a new model on `records` and save it under the configured domain.
    pub fn train(&self, records: &[Record]) -> Result<FittedModel> {
        let table = FeatureTable::from_records(records, &self.settings.train_fields)
            .context("failed to build training table")?;
        let model = FittedModel::fit(self.detector, &table).context("failed to fit detector")?;
        let path = self
            .store
            .save(&self.settings.domain, &model)
            .context("failed to save model")?;
        info!(
            domain = %self.settings.domain,
            rows = table.n_rows(),
            threshold = model.threshold(),
            path = %path.display(),
            "trained model"
        );
        Ok(model)
    }

    /// Load the stored model for the configured domain and fields.
    pub fn load_model(&self) -> Result<FittedModel> {
        self.store
            .load(&self.settings.domain, &self.settings.train_fields)
            .with_context(|| format!("failed to load model for domain '{}'", self.settings.domain))
    }

    /// Score `records` with the stored model.
    pub fn predict(&self, records: &[Record]) -> Result<Vec<Message>> {
        let model = self.load_model()?;
        self.predict_with(&model, records)
    }

    /// Score `records` with `model` and build one message per record.
    pub fn predict_with(&self, model: &FittedModel, records: &[Record]) -> Result<Vec<Message>> {
        let table = FeatureTable::from_records(records, &self.settings.train_fields)
            .context("failed to build scoring table")?;
        let predictions = model.predict_with_reasons(&table).context("failed to score records")?;

        let messages: Vec<Message> = predictions
            .into_iter()
            .zip(records)
            .map(|(prediction, record)| self.message(prediction, record))
            .collect();

        let flagged = messages.iter().filter(|m| m.score == 1).count();
        if flagged > 0 {
            warn!(
                domain = %self.settings.domain,
                flagged,
                total = messages.len(),
                "anomalies detected"
            );
        } else {
            info!(domain = %self.settings.domain, total = messages.len(), "no anomalies detected");
        }
        Ok(messages)
    }

    /// Train first unless configured to use the stored model, then score.
    pub fn evaluate(&self, records: &[Record]) -> Result<Vec<Message>> {
        if self.settings.load_model {
            self.predict(records)
        } else {
            let model = self.train(records)?;
            self.predict_with(&model, records)
        }
    }

    /// [`evaluate`](Self::evaluate) on a blocking thread.
    pub async fn run(&self, records: Vec<Record>) -> Result<Vec<Message>> {
        let analyzer = self.clone();
        tokio::task::spawn_blocking(move || analyzer.evaluate(&records)).await?
    }

    fn message(&self, prediction: Prediction, record: &Record) -> Message {
        let mut data_extra = Map::new();
        data_extra.insert("score".into(), Value::from(prediction.decision));
        data_extra.insert("reason".into(), Value::from(prediction.reason.clone()));
        for field in &self.settings.include_fields {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            data_extra.insert(field.clone(), value);
        }

        Message {
            id: Uuid::new_v4(),
            dataset_name: self.settings.domain.clone(),
            score: prediction.decision,
            msg: prediction.reason,
            data_extra,
            created_at: chrono::Utc::now(),
        }
    }
}
