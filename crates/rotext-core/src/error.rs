use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Model mismatch at symbol {index}: {reason}")]
    ModelMismatch { index: usize, reason: String },
    #[error("Coding range collapsed at symbol {index}")]
    RangeCollapse { index: usize },
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Missing metadata for stage: {0}")]
    MissingMetadata(String),
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<CompressError>,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl CompressError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn mismatch(index: usize, reason: impl Into<String>) -> Self {
        Self::ModelMismatch { index, reason: reason.into() }
    }

    /// Attach the failing stage's name. Already-wrapped errors keep their
    /// innermost stage.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage { stage: stage.to_string(), source: Box::new(other) },
        }
    }

    /// Name of the stage that failed, if the error came out of a pipeline.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;
