use super::errors::LearnerError;
use crate::env::{Action, VecEnv};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Anything that can map an observation to an action.
pub trait Policy: Send + Sync {
    /// Returns the action and the auxiliary recurrent state, which is `None`
    /// for feed-forward policies.
    fn predict(
        &self,
        obs: &[f32],
        deterministic: bool,
    ) -> Result<(Action, Option<Vec<f32>>), LearnerError>;
}

/// A trainable agent bound to observation and action spaces.
pub trait Algorithm: Policy + Sized + Send + 'static {
    /// Collects experience from `env` and updates the policy until at least
    /// `total_timesteps` more transitions, summed over all sub-environments,
    /// have been gathered.
    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        total_timesteps: u64,
    ) -> Result<LearnReport, LearnerError>;

    fn save(&self, path: &Path) -> Result<(), LearnerError>;
    fn load(path: &Path) -> Result<Self, LearnerError>;

    fn num_timesteps(&self) -> u64;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnReport {
    pub timesteps: u64,
    pub episodes: u64,
    pub iterations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmKind {
    #[serde(rename = "PPO")]
    Ppo,
}

impl FromStr for AlgorithmKind {
    type Err = LearnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ppo" => Ok(AlgorithmKind::Ppo),
            _ => Err(LearnerError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Ppo => write!(f, "PPO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Feed-forward tanh networks for both the actor and the critic.
    MlpPolicy,
}

impl FromStr for PolicyKind {
    type Err = LearnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MlpPolicy" => Ok(PolicyKind::MlpPolicy),
            _ => Err(LearnerError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::MlpPolicy => write!(f, "MlpPolicy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_parse() {
        assert_eq!("PPO".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Ppo);
        assert_eq!("ppo".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Ppo);
        assert!(matches!(
            "DQN".parse::<AlgorithmKind>(),
            Err(LearnerError::UnknownAlgorithm(_))
        ));
        assert_eq!(
            "MlpPolicy".parse::<PolicyKind>().unwrap(),
            PolicyKind::MlpPolicy
        );
        assert!(matches!(
            "CnnPolicy".parse::<PolicyKind>(),
            Err(LearnerError::UnknownPolicy(_))
        ));
    }
}
