use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("unknown environment id: {0}")]
    UnknownEnv(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("map error: {0}")]
    Map(String),

    #[error("expected {expected} actions, got {got}")]
    ActionCount { expected: usize, got: usize },

    #[error("expected action of length {expected}, got {got}")]
    ActionShape { expected: usize, got: usize },

    #[error("worker {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: Box<EnvError>,
    },

    #[error("worker {0} exited unexpectedly")]
    WorkerDied(usize),

    #[error("environment is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
