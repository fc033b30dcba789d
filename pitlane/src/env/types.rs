use serde::{Deserialize, Serialize};

/// Flat observation vector handed to the learner.
pub type Observation = Vec<f32>;
/// Flat continuous action produced by the learner.
pub type Action = Vec<f32>;

/// Per-step info emitted by wrapped environments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// The episode was cut by a time limit rather than reaching a terminal state.
    pub truncated: bool,
    pub extra: serde_json::Value, // Keep it simple for now
}

/// A continuous box `[low, high]` per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: Vec<f32>,
    pub high: Vec<f32>,
}

impl BoxSpace {
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        debug_assert_eq!(low.len(), high.len());
        Self { low, high }
    }

    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self {
            low: vec![low; dim],
            high: vec![high; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn clip(&self, values: &[f32]) -> Vec<f32> {
        values
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect()
    }

    pub fn contains(&self, values: &[f32]) -> bool {
        values.len() == self.dim()
            && values
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }
}

/// Return and length of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub reward: f32,
    pub length: usize,
}

/// Result of stepping one sub-environment of a [`VecEnv`](super::VecEnv).
///
/// Finished sub-environments are reset automatically: `obs` is then the first
/// observation of the next episode and `terminal_obs` holds the last one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VecStep {
    pub obs: Observation,
    pub reward: f32,
    pub done: bool,
    pub truncated: bool,
    pub terminal_obs: Option<Observation>,
    pub episode: Option<EpisodeStats>,
}
