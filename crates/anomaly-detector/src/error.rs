use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Artifact unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid artifact: {0}")]
    Invalid(String),

    #[error("Reading is missing model feature '{0}'")]
    MissingFeature(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
