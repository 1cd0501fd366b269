//! End-to-end properties of the detector through the public API.

use gaussian_anomaly::detect::{
    DetectError, DetectorConfig, FeatureTable, FittedModel, GaussianAnomalyDetector, NOT_ANOMALOUS,
};
use gaussian_anomaly::storage::ModelStore;

fn traffic() -> FeatureTable {
    let n = 120;
    let duration: Vec<f64> = (0..n)
        .map(|i| match i {
            17 => 400.0,
            88 => 0.0,
            _ => 1.0 + ((i * 13) % 7) as f64 * 0.2,
        })
        .collect();
    let orig_bytes: Vec<f64> = (0..n)
        .map(|i| if i == 53 { 2_000_000.0 } else { 400.0 + ((i * 29) % 11) as f64 * 15.0 })
        .collect();
    let resp_bytes: Vec<f64> = (0..n).map(|i| 1500.0 + ((i * 7) % 13) as f64 * 40.0).collect();
    FeatureTable::from_columns([
        ("duration", duration),
        ("orig_bytes", orig_bytes),
        ("resp_bytes", resp_bytes),
    ])
    .unwrap()
}

#[test]
fn test_reasons_follow_decisions() {
    let table = traffic();
    for log_transform in [false, true] {
        let config = DetectorConfig::new(0.05, log_transform).unwrap();
        let model = FittedModel::fit(config, &table).unwrap();
        let report = model.score(&table).unwrap();
        assert!(report.anomaly_count() > 0);

        for row in 0..report.len() {
            if !report.anomalies[row] {
                assert_eq!(report.reasons[row], NOT_ANOMALOUS);
                continue;
            }
            let densities = &report.densities[row];
            let min = densities.iter().cloned().fold(f64::INFINITY, f64::min);
            let first_min = densities.iter().position(|&d| d == min).unwrap();
            assert_eq!(report.reasons[row], report.feature_names[first_min]);
        }
    }
}

#[test]
fn test_obvious_outliers_are_flagged() {
    let table = traffic();
    let model = FittedModel::fit(DetectorConfig::new(0.02, false).unwrap(), &table).unwrap();
    let predictions = model.predict_with_reasons(&table).unwrap();
    assert_eq!(predictions[17].decision, 1);
    assert_eq!(predictions[17].reason, "duration");
    assert_eq!(predictions[53].decision, 1);
    assert_eq!(predictions[53].reason, "orig_bytes");
}

#[test]
fn test_every_std_is_positive() {
    let table =
        FeatureTable::from_columns([("flat", vec![7.0; 10]), ("zero", vec![0.0; 10])]).unwrap();
    let model = FittedModel::fit(DetectorConfig::default(), &table).unwrap();
    assert!(model.stds().values().all(|&s| s > 0.0));
}

#[test]
fn test_stored_model_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    let table = traffic();

    let mut detector = GaussianAnomalyDetector::new(DetectorConfig::new(0.05, true).unwrap());
    let before = detector.fit(&table).unwrap().predict_with_reasons(&table).unwrap();
    store.save("main", detector.model().unwrap()).unwrap();

    let loaded = store
        .load("main", &["resp_bytes", "duration", "orig_bytes"])
        .unwrap();
    let reloaded = GaussianAnomalyDetector::from_model(loaded);
    assert_eq!(reloaded.predict_with_reasons(&table).unwrap(), before);
    assert_eq!(reloaded.config(), detector.config());
}

#[test]
fn test_missing_feature_names_the_column() {
    let table = traffic();
    let model = FittedModel::fit(DetectorConfig::default(), &table).unwrap();
    let partial = table
        .select(&["duration".to_string(), "resp_bytes".to_string()])
        .unwrap();
    match model.predict(&partial) {
        Err(DetectError::MissingFeature { feature }) => assert_eq!(feature, "orig_bytes"),
        other => panic!("expected MissingFeature, got {other:?}"),
    }
}
