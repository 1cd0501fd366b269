//! Smoke tests -- verify the binary runs and the train/predict round trip works.

use assert_cmd::Command;
use std::io::Write;

fn conn_log() -> String {
    let mut out = String::new();
    for i in 0..20 {
        let duration = if i == 19 { 900.0 } else { 0.5 + (i % 5) as f64 * 0.1 };
        out.push_str(&format!(
            "{{\"uid\":\"C{i}\",\"duration\":{duration},\"orig_bytes\":{},\"resp_bytes\":{}}}\n",
            300 + i,
            1000 + 3 * i
        ));
    }
    out
}

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("gaussian-anomaly").unwrap();
    cmd.env_remove("GAUSSIAN_ANOMALY_CONFIG").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Per-feature Gaussian anomaly detection"));
}

#[test]
fn test_cli_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("gaussian-anomaly"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["train", "predict", "analyze", "inspect"] {
        cmd().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_train_then_predict() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("conn.jsonl");
    std::fs::File::create(&input)
        .unwrap()
        .write_all(conn_log().as_bytes())
        .unwrap();
    let root = dir.path().join("store");

    cmd()
        .arg("--model-root")
        .arg(&root)
        .args(["--domain", "conn", "train", "--contamination", "0.05", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicates::str::contains("Model 'conn' trained on 3 feature(s)"));

    let output = cmd()
        .arg("--model-root")
        .arg(&root)
        .args(["--domain", "conn", "predict", "--input"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 20);
    let flagged: Vec<&serde_json::Value> = lines.iter().filter(|m| m["score"] == 1).collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0]["msg"], "duration");
    assert_eq!(flagged[0]["data_extra"]["uid"], "C19");
    assert_eq!(flagged[0]["dataset_name"], "conn");

    cmd()
        .arg("--model-root")
        .arg(&root)
        .args(["--domain", "conn", "inspect"])
        .assert()
        .success()
        .stdout(predicates::str::contains("orig_bytes"));
}

#[test]
fn test_predict_without_model_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("--model-root")
        .arg(dir.path())
        .args(["predict"])
        .write_stdin(conn_log())
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to load model"));
}
