use crate::errors::DriverError;
use pitlane::env::registry::{EnvKwargs, RACE_V0};
use pitlane::eval::EvalConfig;
use pitlane::learner::{AlgorithmKind, PolicyKind, PpoConfig};
use pitlane::sim::{RaceConfig, RenderMode, WrapperConfig};
use pitlane::train::TrainConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Names the optional JSON file that overrides the defaults.
pub const CONFIG_ENV_VAR: &str = "PITLANE_CONFIG";

/// Everything one train-then-evaluate run needs. Fixed once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Step budget summed over all training workers.
    pub train_steps: u64,
    pub min_eval_episodes: usize,
    pub num_process: usize,
    pub map_path: String,
    pub map_ext: String,
    pub num_agents: usize,
    pub env_id: String,
    pub algorithm: String,
    pub policy: String,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_prefix: String,
    pub seed: u64,
    pub sim: RaceConfig,
    pub wrapper: WrapperConfig,
    pub ppo: PpoConfig,
    pub eval: EvalConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_steps: 100_000,
            min_eval_episodes: 5,
            num_process: 4,
            map_path: "./maps/example_map".to_string(),
            map_ext: ".json".to_string(),
            num_agents: 1,
            env_id: RACE_V0.to_string(),
            algorithm: AlgorithmKind::Ppo.to_string(),
            policy: PolicyKind::MlpPolicy.to_string(),
            checkpoint_dir: PathBuf::from("./train"),
            checkpoint_prefix: "ppo-pitlane".to_string(),
            seed: 0,
            sim: RaceConfig::default(),
            wrapper: WrapperConfig::default(),
            ppo: PpoConfig::default(),
            eval: EvalConfig::default(),
        }
    }
}

impl RunConfig {
    /// Defaults, overridden by the file named in `PITLANE_CONFIG` when set.
    pub fn load() -> Result<Self, DriverError> {
        let config = match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| DriverError::ConfigFile { path, source })?;
                serde_json::from_str(&raw)?
            }
            Err(_) => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if self.num_process == 0 {
            return Err(DriverError::Config("num_process must be at least 1".to_string()));
        }
        if self.train_steps == 0 {
            return Err(DriverError::Config("train_steps must be positive".to_string()));
        }
        self.ppo.validate()?;
        Ok(())
    }

    pub fn env_kwargs(&self, render_mode: RenderMode) -> EnvKwargs {
        EnvKwargs {
            map: self.map_path.clone(),
            map_ext: self.map_ext.clone(),
            num_agents: self.num_agents,
            render_mode,
            sim: self.sim.clone(),
        }
    }

    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            algorithm: self.algorithm.clone(),
            policy: self.policy.clone(),
            total_timesteps: self.train_steps,
            seed: self.seed,
            ppo: self.ppo.clone(),
        }
    }

    /// `min_eval_episodes` wins over whatever `eval.min_episodes` says.
    pub fn eval_config(&self) -> EvalConfig {
        EvalConfig {
            min_episodes: self.min_eval_episodes,
            ..self.eval.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_run() {
        let config = RunConfig::default();
        assert_eq!(config.train_steps, 100_000);
        assert_eq!(config.min_eval_episodes, 5);
        assert_eq!(config.num_process, 4);
        assert_eq!(config.env_id, "pitlane:race-v0");
        assert_eq!(config.algorithm, "PPO");
        assert_eq!(config.policy, "MlpPolicy");
        assert_eq!(config.checkpoint_dir, PathBuf::from("./train"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_files_keep_the_remaining_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"train_steps": 2048, "eval": {"frame_delay_ms": 20}}"#).unwrap();
        assert_eq!(config.train_steps, 2048);
        assert_eq!(config.num_process, 4);
        assert_eq!(config.eval.frame_delay_ms, 20);
        assert_eq!(config.eval_config().min_episodes, 5);
    }

    #[test]
    fn degenerate_budgets_are_rejected() {
        let config = RunConfig {
            num_process: 0,
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));

        let config = RunConfig {
            train_steps: 0,
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));
    }

    #[test]
    fn derived_configs_carry_the_run_settings() {
        let config = RunConfig {
            train_steps: 777,
            seed: 3,
            min_eval_episodes: 2,
            ..RunConfig::default()
        };
        let train = config.train_config();
        assert_eq!(train.total_timesteps, 777);
        assert_eq!(train.seed, 3);
        assert_eq!(config.eval_config().min_episodes, 2);

        let kwargs = config.env_kwargs(RenderMode::Human);
        assert_eq!(kwargs.map, "./maps/example_map");
        assert_eq!(kwargs.map_ext, ".json");
        assert_eq!(kwargs.render_mode, RenderMode::Human);
    }
}
