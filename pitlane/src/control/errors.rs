use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("prompt io error: {0}")]
    Io(#[from] std::io::Error),
}
