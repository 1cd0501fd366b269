use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gaussian_anomaly::analyzer::records::{read_records_from, write_lines_to, STDIO};
use gaussian_anomaly::analyzer::GaussianAnalyzer;
use gaussian_anomaly::config::{AppConfig, ConfigOrigin, CONFIG_ENV};

#[derive(Parser)]
#[command(
    name = "gaussian-anomaly",
    about = "Per-feature Gaussian anomaly detection with reason attribution",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Root directory of the model store
    #[arg(long, global = true)]
    model_root: Option<PathBuf>,

    /// Model name
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Comma-separated numeric features to train on
    #[arg(long, global = true, value_delimiter = ',')]
    fields: Option<Vec<String>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model on JSON-lines records and save it
    Train {
        /// Input file, or - for stdin
        #[arg(long, default_value = STDIO)]
        input: String,

        /// Expected outlier fraction, in (0, 0.5)
        #[arg(long)]
        contamination: Option<f64>,

        /// Fit on ln(v + 1)
        #[arg(long)]
        log_transform: Option<bool>,
    },

    /// Score JSON-lines records with a stored model
    Predict {
        /// Input file, or - for stdin
        #[arg(long, default_value = STDIO)]
        input: String,

        /// Output file, or - for stdout
        #[arg(long, default_value = STDIO)]
        output: String,
    },

    /// Train-or-load then score, as configured in [analyzer]
    Analyze {
        /// Input file, or - for stdin
        #[arg(long, default_value = STDIO)]
        input: String,

        /// Output file, or - for stdout
        #[arg(long, default_value = STDIO)]
        output: String,

        /// Always train on the input batch before scoring
        #[arg(long)]
        train: bool,
    },

    /// Show the statistics of a stored model
    Inspect {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, origin) = match &cli.config {
        Some(path) => (AppConfig::load(path)?, ConfigOrigin::file(path)),
        None => AppConfig::load_or_default(),
    };
    if let Some(root) = cli.model_root {
        config.storage.model_root = root;
    }
    if let Some(domain) = cli.domain {
        config.analyzer.domain = domain;
    }
    if let Some(fields) = cli.fields {
        config.analyzer.train_fields = fields;
    }

    gaussian_anomaly::init_tracing(&config.logging.level, config.logging.json)?;
    origin.report();

    match cli.command {
        Commands::Train {
            input,
            contamination,
            log_transform,
        } => {
            if let Some(c) = contamination {
                config.detector.contamination = c;
            }
            if let Some(l) = log_transform {
                config.detector.log_transform = l;
            }
            let analyzer = GaussianAnalyzer::from_config(&config)?;
            let records = read_records_from(&input).await?;
            tracing::info!(
                %input,
                records = records.len(),
                domain = %config.analyzer.domain,
                "Training model"
            );

            let model = tokio::task::spawn_blocking({
                let analyzer = analyzer.clone();
                move || analyzer.train(&records)
            })
            .await??;
            let path = analyzer
                .store()
                .model_path(&config.analyzer.domain, &config.analyzer.train_fields)?;
            println!(
                "Model '{}' trained on {} feature(s), threshold {:e}",
                config.analyzer.domain,
                model.features().len(),
                model.threshold()
            );
            println!("Saved to {}", path.display());
        }
        Commands::Predict { input, output } => {
            let analyzer = GaussianAnalyzer::from_config(&config)?;
            let records = read_records_from(&input).await?;
            tracing::info!(%input, records = records.len(), "Scoring records");

            let messages = tokio::task::spawn_blocking({
                let analyzer = analyzer.clone();
                move || analyzer.predict(&records)
            })
            .await??;
            write_lines_to(&output, &messages).await?;
        }
        Commands::Analyze {
            input,
            output,
            train,
        } => {
            if train {
                config.analyzer.load_model = false;
            }
            let analyzer = GaussianAnalyzer::from_config(&config)?;
            let records = read_records_from(&input).await?;
            tracing::info!(
                %input,
                records = records.len(),
                load_model = config.analyzer.load_model,
                "Analyzing records"
            );

            let messages = analyzer.run(records).await?;
            write_lines_to(&output, &messages).await?;
        }
        Commands::Inspect { json } => {
            let analyzer = GaussianAnalyzer::from_config(&config)?;
            let model = analyzer.load_model()?;
            if json {
                let json_output =
                    serde_json::to_string_pretty(&model).context("failed to serialize model")?;
                println!("{}", json_output);
            } else {
                let detector = model.config();
                println!("\nModel: {}", config.analyzer.domain);
                println!(
                    "Contamination: {}   Log transform: {}   Threshold: {:e}",
                    detector.contamination,
                    detector.log_transform,
                    model.threshold()
                );
                println!("{:<25} | {:>18} | {:>18}", "Feature", "Mean", "Std");
                println!("{:-<25}-|-{:-<18}-|-{:-<18}", "", "", "");
                for f in model.features() {
                    println!("{:<25} | {:>18.6} | {:>18.6e}", f.name, f.mean, f.std);
                }
                println!();
            }
        }
    }

    Ok(())
}
