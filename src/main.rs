// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

use style_predictor_lib::features::get_feature_metadata;
use style_predictor_lib::models::{RawContext, UserProfile, VisualPreferences};
use style_predictor_lib::prediction::{ModelManager, PredictionOrchestrator};
use style_predictor_lib::utils::{env::load_env, predictor_config::PredictorConfig};

#[derive(Parser)]
#[command(author, version, about = "Predict presentation styles from request context", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Predict style classes and values for one request
    Predict {
        /// JSON file with the raw request context
        #[arg(long)]
        context: PathBuf,
        /// JSON file with the user profile
        #[arg(long)]
        profile: Option<PathBuf>,
        /// JSON file with the visual preferences
        #[arg(long)]
        visual: Option<PathBuf>,
    },
    /// Report which models are loaded
    Health,
    /// Print the feature vector layout
    Schema,
}

async fn read_json(path: &Path) -> Result<JsonValue> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let value = read_json(path).await?;
    serde_json::from_value(value)
        .with_context(|| format!("{} does not match the expected record", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let cli = Cli::parse();

    let config = PredictorConfig::from_env();
    config.log_config();

    match cli.command {
        Command::Predict {
            context,
            profile,
            visual,
        } => {
            let raw = RawContext::from_json(&read_json(&context).await?);
            let profile: Option<UserProfile> = match profile {
                Some(path) => Some(read_record(&path).await?),
                None => None,
            };
            let visual: Option<VisualPreferences> = match visual {
                Some(path) => Some(read_record(&path).await?),
                None => None,
            };

            let orchestrator = PredictionOrchestrator::from_config(&config).await;
            let result = orchestrator
                .predict(&raw, profile.as_ref(), visual.as_ref())
                .await
                .context("Prediction rejected")?;
            info!(
                "Prediction complete in {:.2}ms (placeholder used: {})",
                result.metadata.processing_ms, result.metadata.placeholder_used
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Health => {
            let models = ModelManager::load(&config).await;
            println!("{}", serde_json::to_string_pretty(&models.health())?);
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&get_feature_metadata())?);
        }
    }

    Ok(())
}
