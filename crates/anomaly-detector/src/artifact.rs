use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use vitals_core::Reading;

use crate::error::{ModelError, ModelResult};
use crate::forest::ExtendedIsolationForest;

/// A fitted model producing raw anomaly scores, higher meaning more anomalous.
pub trait AnomalyModel: Send + Sync {
    fn raw_score(&self, features: &[f64]) -> ModelResult<f64>;
}

impl AnomalyModel for ExtendedIsolationForest {
    fn raw_score(&self, features: &[f64]) -> ModelResult<f64> {
        self.score(features)
    }
}

/// A loaded model together with its decision threshold and the feature
/// order it was trained on.
pub struct ModelArtifact {
    model: Box<dyn AnomalyModel>,
    threshold: f64,
    feature_names: Vec<String>,
}

impl std::fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("threshold", &self.threshold)
            .field("feature_names", &self.feature_names)
            .finish_non_exhaustive()
    }
}

impl ModelArtifact {
    pub fn new(
        model: Box<dyn AnomalyModel>,
        threshold: f64,
        feature_names: Vec<String>,
    ) -> ModelResult<Self> {
        if feature_names.is_empty() {
            return Err(ModelError::Invalid("artifact declares no features".into()));
        }
        if !threshold.is_finite() {
            return Err(ModelError::Invalid(format!("threshold {threshold} is not finite")));
        }
        Ok(Self {
            model,
            threshold,
            feature_names,
        })
    }

    /// Threshold bundled at training time. Scoring uses the configured one.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature vector in the artifact's declared order.
    pub fn features(&self, reading: &Reading) -> ModelResult<Vec<f64>> {
        self.feature_names
            .iter()
            .map(|name| {
                reading
                    .get(name)
                    .ok_or_else(|| ModelError::MissingFeature(name.clone()))
            })
            .collect()
    }

    pub fn raw_score(&self, reading: &Reading) -> ModelResult<f64> {
        let features = self.features(reading)?;
        let raw = self.model.raw_score(&features)?;
        if raw.is_finite() {
            Ok(raw)
        } else {
            Err(ModelError::Inference(format!("model returned {raw}")))
        }
    }
}

/// On-disk artifact: `{ "model": ..., "threshold": ..., "feature_names": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    pub model: ExtendedIsolationForest,
    pub threshold: f64,
    pub feature_names: Vec<String>,
}

impl ForestArtifact {
    pub fn read_from(path: &Path) -> ModelResult<Self> {
        let bytes = fs::read(path)?;
        let artifact: ForestArtifact = serde_json::from_slice(&bytes)?;
        artifact.model.validate()?;
        if artifact.model.dimension() != artifact.feature_names.len() {
            return Err(ModelError::Invalid(format!(
                "model expects {} features but artifact names {}",
                artifact.model.dimension(),
                artifact.feature_names.len()
            )));
        }
        Ok(artifact)
    }

    /// Write atomically, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> ModelResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| ModelError::Io(e.error))?;
        Ok(())
    }

    pub fn into_artifact(self) -> ModelResult<ModelArtifact> {
        ModelArtifact::new(Box::new(self.model), self.threshold, self.feature_names)
    }
}

/// Source of the model artifact. Called until one load succeeds.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self) -> ModelResult<ModelArtifact>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileArtifactLoader {
    path: PathBuf,
}

impl FileArtifactLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactLoader for FileArtifactLoader {
    fn load(&self) -> ModelResult<ModelArtifact> {
        ForestArtifact::read_from(&self.path)?.into_artifact()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParams;

    fn small_artifact() -> ForestArtifact {
        let data: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![80.0 + (i % 7) as f64, 97.0 + (i % 3) as f64 * 0.5])
            .collect();
        let params = ForestParams {
            n_trees: 8,
            ..ForestParams::default()
        };
        ForestArtifact {
            model: ExtendedIsolationForest::fit(&data, &params).unwrap(),
            threshold: 0.55,
            feature_names: vec!["heart_rate".into(), "oxygen_saturation".into()],
        }
    }

    #[test]
    fn test_file_loader_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("eif_model.json");
        small_artifact().write_to(&path).unwrap();

        let loaded = FileArtifactLoader::new(&path).load().unwrap();
        assert_eq!(loaded.threshold(), 0.55);
        assert_eq!(loaded.feature_names(), ["heart_rate", "oxygen_saturation"]);

        let reading: Reading = [("oxygen_saturation", 97.5), ("heart_rate", 82.0)]
            .into_iter()
            .collect();
        let raw = loaded.raw_score(&reading).unwrap();
        assert!(raw > 0.0 && raw < 1.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileArtifactLoader::new(dir.path().join("absent.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }

    #[test]
    fn test_missing_keys_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eif_model.json");
        let mut value = serde_json::to_value(small_artifact()).unwrap();
        value.as_object_mut().unwrap().remove("feature_names");
        fs::write(&path, value.to_string()).unwrap();

        let err = FileArtifactLoader::new(&path).load().unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    #[test]
    fn test_feature_count_mismatch_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eif_model.json");
        let mut artifact = small_artifact();
        artifact.feature_names.push("breathing_rate".into());
        artifact.write_to(&path).unwrap();

        let err = FileArtifactLoader::new(&path).load().unwrap_err();
        assert!(matches!(err, ModelError::Invalid(_)));
    }

    #[test]
    fn test_reading_without_feature() {
        let artifact = small_artifact().into_artifact().unwrap();
        let reading: Reading = [("heart_rate", 80.0)].into_iter().collect();
        let err = artifact.raw_score(&reading).unwrap_err();
        assert!(matches!(err, ModelError::MissingFeature(name) if name == "oxygen_saturation"));
    }
}
