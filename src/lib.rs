//! gaussian-anomaly -- per-feature Gaussian anomaly detection.
//!
//! Fits a mean and standard deviation per numeric feature, calibrates a
//! joint-density threshold from an expected contamination rate and flags
//! records that fall below it, naming the least likely feature as the reason.

pub mod analyzer;
pub mod config;
pub mod detect;
pub mod storage;

use anyhow::Result;

/// Initialize tracing to stderr. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().try_init().map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}
