use crate::env::EnvError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnerError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid config: {0}")]
    Config(String),
}
