use crate::env::{EnvError, VecEnv};
use crate::learner::{Algorithm, AlgorithmKind, LearnerError, PolicyKind, Ppo, PpoConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Algorithm identifier, e.g. `"PPO"`.
    pub algorithm: String,
    /// Policy architecture identifier, e.g. `"MlpPolicy"`.
    pub policy: String,
    /// Transitions to collect, summed over all parallel environments.
    pub total_timesteps: u64,
    pub seed: u64,
    pub ppo: PpoConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Ppo.to_string(),
            policy: PolicyKind::MlpPolicy.to_string(),
            total_timesteps: 100_000,
            seed: 0,
            ppo: PpoConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct TrainingStats {
    pub total_steps: u64,
    pub total_episodes: u64,
    pub iterations: u64,
    pub training_time: Duration,
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Learner(#[from] LearnerError),

    #[error("failed to close training environments: {0}")]
    Close(#[from] EnvError),

    #[error("training task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Instantiates the agent named by `cfg`, sized to the spaces of `env`.
pub fn build_algorithm(cfg: &TrainConfig, env: &dyn VecEnv) -> Result<Ppo, LearnerError> {
    let algorithm: AlgorithmKind = cfg.algorithm.parse()?;
    let policy: PolicyKind = cfg.policy.parse()?;

    match algorithm {
        AlgorithmKind::Ppo => Ppo::new(
            policy,
            env.observation_space(),
            env.action_space(),
            cfg.ppo.clone(),
            cfg.seed,
        ),
    }
}

/// Runs `learn` to completion on the blocking pool, then tears the batch down.
///
/// The environment is consumed: it only lives as long as the training run.
pub async fn train<A>(
    mut algorithm: A,
    mut env: Box<dyn VecEnv>,
    total_timesteps: u64,
) -> Result<(A, TrainingStats), TrainError>
where
    A: Algorithm,
{
    let started = Instant::now();
    let (algorithm, report, closed) = tokio::task::spawn_blocking(move || {
        let report = algorithm.learn(env.as_mut(), total_timesteps);
        let closed = env.close();
        (algorithm, report, closed)
    })
    .await?;
    let training_time = started.elapsed();

    let report = report?;
    closed?;

    tracing::info!(
        total_steps = report.timesteps,
        episodes = report.episodes,
        "Training time {:.2}s",
        training_time.as_secs_f64()
    );
    tracing::info!("Training cycle complete.");

    Ok((
        algorithm,
        TrainingStats {
            total_steps: report.timesteps,
            total_episodes: report.episodes,
            iterations: report.iterations,
            training_time,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DummyEnv, VecEnvKind, make_vec_env};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn small() -> TrainConfig {
        TrainConfig {
            total_timesteps: 50,
            ppo: PpoConfig {
                n_steps: 8,
                batch_size: 8,
                n_epochs: 1,
                net_arch: vec![4],
                ..PpoConfig::default()
            },
            ..TrainConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trains_across_workers_until_budget_is_spent() {
        let counter = Arc::new(AtomicU64::new(0));
        let shared = Arc::clone(&counter);
        let env = make_vec_env(2, VecEnvKind::Subproc, 0, move |_, _| {
            Ok(DummyEnv::with_counter(3, Arc::clone(&shared)))
        })
        .unwrap();

        let cfg = small();
        let model = build_algorithm(&cfg, env.as_ref()).unwrap();
        let (model, stats) = train(model, env, cfg.total_timesteps).await.unwrap();

        assert!(stats.total_steps >= 50);
        assert_eq!(counter.load(Ordering::Relaxed), stats.total_steps);
        assert_eq!(model.num_timesteps(), stats.total_steps);
        assert!(stats.total_episodes > 0);
    }

    #[test]
    fn unknown_identifiers_fail_to_build() {
        let env = make_vec_env(1, VecEnvKind::Dummy, 0, |_, _| Ok(DummyEnv::new(3))).unwrap();
        let cfg = TrainConfig {
            algorithm: "SAC".to_string(),
            ..small()
        };
        assert!(matches!(
            build_algorithm(&cfg, env.as_ref()),
            Err(LearnerError::UnknownAlgorithm(_))
        ));

        let cfg = TrainConfig {
            policy: "CnnPolicy".to_string(),
            ..small()
        };
        assert!(matches!(
            build_algorithm(&cfg, env.as_ref()),
            Err(LearnerError::UnknownPolicy(_))
        ));
    }
}
