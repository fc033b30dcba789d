//! Model checkpoints named after the moment they were written.

use crate::learner::{Algorithm, LearnerError};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Day, month, year, hour, minute, second.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

pub fn timestamp(now: &NaiveDateTime) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

pub fn checkpoint_path(dir: &Path, prefix: &str, now: &NaiveDateTime) -> PathBuf {
    dir.join(format!("{prefix}-{}.json", timestamp(now)))
}

/// Writes the full model state under `dir`. The directory must already exist.
pub fn save<A: Algorithm>(
    model: &A,
    dir: &Path,
    prefix: &str,
    now: &NaiveDateTime,
) -> Result<PathBuf, LearnerError> {
    let path = checkpoint_path(dir, prefix, now);
    model.save(&path)?;
    tracing::info!(path = %path.display(), timesteps = model.num_timesteps(), "saved checkpoint");
    Ok(path)
}

pub fn load<A: Algorithm>(path: &Path) -> Result<A, LearnerError> {
    let model = A::load(path)?;
    tracing::info!(path = %path.display(), timesteps = model.num_timesteps(), "loaded checkpoint");
    Ok(model)
}
