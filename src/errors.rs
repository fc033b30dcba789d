use pitlane::env::EnvError;
use pitlane::eval::EvalError;
use pitlane::learner::LearnerError;
use pitlane::train::TrainError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Learner(#[from] LearnerError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
