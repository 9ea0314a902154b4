//! Anomaly scoring for vital-sign readings.
//!
//! Two strategies: a standardized radial distance from the resting center,
//! and a pre-trained Extended Isolation Forest loaded from a JSON artifact.
//! The model strategy falls back to distance whenever the artifact or the
//! reading cannot be used.

pub mod artifact;
pub mod distance;
pub mod error;
pub mod forest;
pub mod scorer;
pub mod training;

pub use artifact::{AnomalyModel, ArtifactLoader, FileArtifactLoader, ForestArtifact, ModelArtifact};
pub use error::{ModelError, ModelResult};
pub use forest::{ExtendedIsolationForest, ForestParams};
pub use scorer::{AnomalyScorer, AnomalyVerdict, DetectionMethod, ScorerHealth};
pub use training::{train_forest_artifact, TrainingConfig};
