//! Fit the Extended Isolation Forest on a seeded resting dataset and write
//! the artifact to `EIF_MODEL_PATH`.
//!
//! `TRAINING_DATASET_SIZE`, `TRAINING_SEED`, `EIF_N_TREES` and
//! `EIF_CONTAMINATION` tune the run.

use anomaly_detector::{train_forest_artifact, ForestParams, TrainingConfig};
use anyhow::{Context, Result};
use vitals_core::telemetry::init_tracing;
use vitals_core::Settings;
use vitals_simulator::variance::{
    generate_resting_dataset, DEFAULT_DATASET_SEED, DEFAULT_DATASET_SIZE,
};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key}: invalid value '{raw}'")),
        _ => Ok(default),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("Invalid configuration")?;
    init_tracing(settings.tracing_directive());

    let size = env_or("TRAINING_DATASET_SIZE", DEFAULT_DATASET_SIZE)?;
    let seed = env_or("TRAINING_SEED", DEFAULT_DATASET_SEED)?;
    let defaults = TrainingConfig::default();
    let config = TrainingConfig {
        forest: ForestParams {
            n_trees: env_or("EIF_N_TREES", defaults.forest.n_trees)?,
            seed,
            ..defaults.forest
        },
        contamination: env_or("EIF_CONTAMINATION", defaults.contamination)?,
    };

    tracing::info!("Generating {} resting readings (seed {})", size, seed);
    let dataset = generate_resting_dataset(size, seed);

    let artifact = train_forest_artifact(&dataset, &config).context("Training failed")?;
    let path = &settings.model_artifact_path;
    artifact
        .write_to(path)
        .with_context(|| format!("Failed to write model to {}", path.display()))?;

    tracing::info!(
        "Model written to {} (threshold {:.4}, {} features)",
        path.display(),
        artifact.threshold,
        artifact.feature_names.len()
    );
    Ok(())
}
