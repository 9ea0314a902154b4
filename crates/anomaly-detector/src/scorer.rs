use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use vitals_core::config::{valid_model_threshold, DEFAULT_MODEL_THRESHOLD};
use vitals_core::{DetectionConfig, Reading, Settings};

use crate::artifact::{ArtifactLoader, FileArtifactLoader, ModelArtifact};
use crate::distance;
use crate::error::ModelResult;

/// Consecutive model fallbacks after which the scorer reports itself degraded.
pub const DEGRADED_AFTER_FALLBACKS: u64 = 5;

/// Raw model scores at or below this map to 0.
const RAW_SCORE_FLOOR: f64 = 0.2;
/// Raw model scores at or above this map to 1.
const RAW_SCORE_CEIL: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionMethod {
    Distance,
    Model,
}

impl DetectionMethod {
    /// `DISTANCE`, `MODEL` or `EIF`, any case. Anything else selects
    /// `Distance` with a warning.
    pub fn from_config(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DISTANCE" => DetectionMethod::Distance,
            "MODEL" | "EIF" => DetectionMethod::Model,
            other => {
                warn!("Unknown anomaly detection method '{}', using DISTANCE", other);
                DetectionMethod::Distance
            }
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Distance => write!(f, "DISTANCE"),
            DetectionMethod::Model => write!(f, "MODEL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Severity in [0, 1].
    pub score: f64,
    /// Strategy that actually produced this verdict.
    pub method: DetectionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScorerHealth {
    Healthy,
    Degraded { consecutive_fallbacks: u64 },
}

/// Rescale a raw model score onto [0, 1] over the fixed operating band.
pub fn normalize_model_score(raw: f64) -> f64 {
    ((raw - RAW_SCORE_FLOOR) / (RAW_SCORE_CEIL - RAW_SCORE_FLOOR)).clamp(0.0, 1.0)
}

fn effective_model_threshold(threshold: f64) -> f64 {
    if valid_model_threshold(threshold) {
        threshold
    } else {
        warn!(
            "Invalid model threshold {}, using {}",
            threshold, DEFAULT_MODEL_THRESHOLD
        );
        DEFAULT_MODEL_THRESHOLD
    }
}

/// Scores readings with the configured strategy.
///
/// The model artifact is loaded lazily on the first model-scored call and
/// kept for the scorer's lifetime. A failed load is not remembered, so the
/// next call tries again.
pub struct AnomalyScorer {
    loader: Box<dyn ArtifactLoader>,
    artifact: Mutex<Option<Arc<ModelArtifact>>>,
    consecutive_fallbacks: AtomicU64,
    total_fallbacks: AtomicU64,
}

impl AnomalyScorer {
    pub fn new(loader: impl ArtifactLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            artifact: Mutex::new(None),
            consecutive_fallbacks: AtomicU64::new(0),
            total_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(FileArtifactLoader::new(settings.model_artifact_path.clone()))
    }

    /// Never fails: every model problem degrades to the distance strategy.
    pub fn score(&self, reading: &Reading, config: &DetectionConfig) -> AnomalyVerdict {
        match DetectionMethod::from_config(&config.method) {
            DetectionMethod::Distance => distance::evaluate(reading, config.distance_threshold),
            DetectionMethod::Model => match self.score_with_model(reading, config.model_threshold) {
                Ok(verdict) => {
                    self.record_model_success();
                    verdict
                }
                Err(e) => {
                    self.record_fallback(&e);
                    distance::evaluate(reading, config.distance_threshold)
                }
            },
        }
    }

    fn score_with_model(&self, reading: &Reading, threshold: f64) -> ModelResult<AnomalyVerdict> {
        let threshold = effective_model_threshold(threshold);
        let artifact = self.artifact()?;
        let raw = artifact.raw_score(reading)?;
        debug!("Model raw score {:.4} (threshold {})", raw, threshold);
        Ok(AnomalyVerdict {
            is_anomaly: raw >= threshold,
            score: normalize_model_score(raw),
            method: DetectionMethod::Model,
        })
    }

    fn artifact(&self) -> ModelResult<Arc<ModelArtifact>> {
        // Held across the load so concurrent first calls load only once.
        let mut slot = match self.artifact.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(artifact) = slot.as_ref() {
            return Ok(Arc::clone(artifact));
        }
        let artifact = Arc::new(self.loader.load()?);
        info!(
            "Loaded anomaly model from {} ({} features, bundled threshold {})",
            self.loader.describe(),
            artifact.feature_names().len(),
            artifact.threshold()
        );
        *slot = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    pub fn is_model_loaded(&self) -> bool {
        match self.artifact.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn record_fallback(&self, cause: &crate::error::ModelError) {
        let consecutive = self.consecutive_fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_fallbacks.fetch_add(1, Ordering::Relaxed);
        if consecutive == 1 {
            warn!("Model scoring unavailable ({}), falling back to DISTANCE", cause);
        } else {
            debug!("Model scoring still unavailable ({}), fallback #{}", cause, consecutive);
        }
        if consecutive == DEGRADED_AFTER_FALLBACKS {
            error!(
                "Anomaly scorer degraded: {} consecutive model fallbacks (last error: {})",
                consecutive, cause
            );
        }
    }

    fn record_model_success(&self) {
        let previous = self.consecutive_fallbacks.swap(0, Ordering::Relaxed);
        if previous >= DEGRADED_AFTER_FALLBACKS {
            info!("Anomaly scorer recovered after {} model fallbacks", previous);
        }
    }

    pub fn health(&self) -> ScorerHealth {
        let consecutive = self.consecutive_fallbacks.load(Ordering::Relaxed);
        if consecutive >= DEGRADED_AFTER_FALLBACKS {
            ScorerHealth::Degraded {
                consecutive_fallbacks: consecutive,
            }
        } else {
            ScorerHealth::Healthy
        }
    }

    /// Model-to-distance fallbacks over the scorer's lifetime.
    pub fn total_fallbacks(&self) -> u64 {
        self.total_fallbacks.load(Ordering::Relaxed)
    }
}
