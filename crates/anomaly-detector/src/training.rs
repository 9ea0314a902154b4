use vitals_core::{Reading, VitalSign};

use crate::artifact::ForestArtifact;
use crate::error::{ModelError, ModelResult};
use crate::forest::{ExtendedIsolationForest, ForestParams};

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub forest: ForestParams,
    /// Expected share of anomalies in the training data; the bundled
    /// threshold is the `1 - contamination` quantile of training scores.
    pub contamination: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            contamination: 0.05,
        }
    }
}

/// Fit an Extended Isolation Forest over every tracked vital sign.
pub fn train_forest_artifact(
    readings: &[Reading],
    config: &TrainingConfig,
) -> ModelResult<ForestArtifact> {
    if !(0.0..0.5).contains(&config.contamination) {
        return Err(ModelError::Invalid(format!(
            "contamination must be in [0, 0.5), got {}",
            config.contamination
        )));
    }

    let feature_names: Vec<String> = VitalSign::ALL.iter().map(|s| s.name().to_string()).collect();
    let rows = readings
        .iter()
        .map(|reading| {
            feature_names
                .iter()
                .map(|name| {
                    reading
                        .get(name)
                        .ok_or_else(|| ModelError::MissingFeature(name.clone()))
                })
                .collect::<ModelResult<Vec<f64>>>()
        })
        .collect::<ModelResult<Vec<Vec<f64>>>>()?;

    let model = ExtendedIsolationForest::fit(&rows, &config.forest)?;
    let mut scores = rows
        .iter()
        .map(|row| model.score(row))
        .collect::<ModelResult<Vec<f64>>>()?;
    scores.sort_by(|a, b| a.total_cmp(b));
    let threshold = quantile(&scores, 1.0 - config.contamination);

    tracing::info!(
        "Trained forest: {} trees over {} readings, threshold {:.4}",
        model.n_trees(),
        rows.len(),
        threshold
    );

    Ok(ForestArtifact {
        model,
        threshold,
        feature_names,
    })
}

/// Linear-interpolated quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
