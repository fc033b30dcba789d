use super::subproc::SubprocVecEnv;
use super::{Action, BoxSpace, Env, EnvError, EpisodeStats, Observation, StepInfo, VecStep};
use serde::{Deserialize, Serialize};

/// A batch of independent environments stepped in lockstep.
pub trait VecEnv: Send {
    fn num_envs(&self) -> usize;
    fn observation_space(&self) -> BoxSpace;
    fn action_space(&self) -> BoxSpace;

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError>;
    fn step(&mut self, actions: Vec<Action>) -> Result<Vec<VecStep>, EnvError>;
    fn close(&mut self) -> Result<(), EnvError>;
}

/// How the sub-environments of a batch are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VecEnvKind {
    /// Sequentially, on the caller's thread.
    Dummy,
    /// One worker thread per environment.
    #[default]
    Subproc,
}

/// Builds `n_envs` environments, each from `factory(index, seed + index)`.
///
/// With [`VecEnvKind::Subproc`] the factory runs inside the worker that will own
/// the environment. Any construction failure fails the whole call.
pub fn make_vec_env<E, F>(
    n_envs: usize,
    kind: VecEnvKind,
    seed: u64,
    factory: F,
) -> Result<Box<dyn VecEnv>, EnvError>
where
    E: Env<Obs = Observation, Act = Action, Info = StepInfo> + 'static,
    F: Fn(usize, u64) -> Result<E, EnvError> + Send + Sync + 'static,
{
    if n_envs == 0 {
        return Err(EnvError::InvalidArgument(
            "n_envs must be at least 1".to_string(),
        ));
    }

    tracing::debug!(n_envs, ?kind, seed, "building vectorized environment");
    match kind {
        VecEnvKind::Dummy => {
            let envs = (0..n_envs)
                .map(|index| factory(index, seed + index as u64))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(DummyVecEnv::new(envs)?))
        }
        VecEnvKind::Subproc => Ok(Box::new(SubprocVecEnv::spawn(n_envs, seed, factory)?)),
    }
}

/// One environment plus the bookkeeping a vectorized runner needs: action shape
/// checks, the running episode return and automatic reset.
pub(crate) struct EnvSlot<E> {
    env: E,
    action_dim: usize,
    episode_reward: f32,
    episode_len: usize,
}

impl<E> EnvSlot<E>
where
    E: Env<Obs = Observation, Act = Action, Info = StepInfo>,
{
    pub(crate) fn new(env: E) -> Self {
        let action_dim = env.action_space().dim();
        Self {
            env,
            action_dim,
            episode_reward: 0.0,
            episode_len: 0,
        }
    }

    pub(crate) fn spaces(&self) -> (BoxSpace, BoxSpace) {
        (self.env.observation_space(), self.env.action_space())
    }

    pub(crate) fn reset(&mut self) -> Result<Observation, EnvError> {
        self.episode_reward = 0.0;
        self.episode_len = 0;
        self.env.reset()
    }

    pub(crate) fn step(&mut self, action: Action) -> Result<VecStep, EnvError> {
        if action.len() != self.action_dim {
            return Err(EnvError::ActionShape {
                expected: self.action_dim,
                got: action.len(),
            });
        }

        let (obs, reward, done, info) = self.env.step(action)?;
        self.episode_reward += reward;
        self.episode_len += 1;

        if !done {
            return Ok(VecStep {
                obs,
                reward,
                done,
                truncated: info.truncated,
                terminal_obs: None,
                episode: None,
            });
        }

        let episode = EpisodeStats {
            reward: self.episode_reward,
            length: self.episode_len,
        };
        let next = self.reset()?;
        Ok(VecStep {
            obs: next,
            reward,
            done,
            truncated: info.truncated,
            terminal_obs: Some(obs),
            episode: Some(episode),
        })
    }

    pub(crate) fn close(&mut self) -> Result<(), EnvError> {
        self.env.close()
    }
}

/// Runs every environment on the calling thread.
pub struct DummyVecEnv<E> {
    envs: Vec<EnvSlot<E>>,
    observation_space: BoxSpace,
    action_space: BoxSpace,
}

impl<E> DummyVecEnv<E>
where
    E: Env<Obs = Observation, Act = Action, Info = StepInfo>,
{
    pub fn new(envs: Vec<E>) -> Result<Self, EnvError> {
        let envs: Vec<_> = envs.into_iter().map(EnvSlot::new).collect();
        let Some(first) = envs.first() else {
            return Err(EnvError::InvalidArgument(
                "a vectorized environment needs at least one env".to_string(),
            ));
        };
        let (observation_space, action_space) = first.spaces();
        Ok(Self {
            envs,
            observation_space,
            action_space,
        })
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }
}

impl<E> VecEnv for DummyVecEnv<E>
where
    E: Env<Obs = Observation, Act = Action, Info = StepInfo>,
{
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn observation_space(&self) -> BoxSpace {
        self.observation_space.clone()
    }

    fn action_space(&self) -> BoxSpace {
        self.action_space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        self.envs.iter_mut().map(|env| env.reset()).collect()
    }

    fn step(&mut self, actions: Vec<Action>) -> Result<Vec<VecStep>, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::ActionCount {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }

        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(env, action)| env.step(action))
            .collect()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        for env in &mut self.envs {
            env.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DummyEnv;

    #[test]
    fn dummy_builds_n_resettable_envs() {
        for n in 1..=4 {
            let mut envs = make_vec_env(n, VecEnvKind::Dummy, 0, |_, _| Ok(DummyEnv::new(3))).unwrap();
            assert_eq!(envs.num_envs(), n);
            let obs = envs.reset().unwrap();
            assert_eq!(obs.len(), n);
            assert!(obs.iter().all(|o| o == &vec![0.0]));
        }
    }

    #[test]
    fn zero_envs_is_rejected() {
        let result = make_vec_env(0, VecEnvKind::Dummy, 0, |_, _| Ok(DummyEnv::new(3)));
        assert!(matches!(result, Err(EnvError::InvalidArgument(_))));
    }

    #[test]
    fn finished_episodes_reset_and_report_stats() {
        let mut envs = DummyVecEnv::new(vec![DummyEnv::new(2), DummyEnv::new(2)]).unwrap();
        envs.reset().unwrap();

        let first = envs.step(vec![vec![0.0], vec![0.0]]).unwrap();
        assert!(first.iter().all(|s| !s.done && s.episode.is_none()));

        let second = envs.step(vec![vec![0.0], vec![0.0]]).unwrap();
        for step in &second {
            assert!(step.done);
            assert_eq!(step.obs, vec![0.0]);
            assert_eq!(step.terminal_obs, Some(vec![2.0]));
            assert_eq!(
                step.episode,
                Some(EpisodeStats {
                    reward: 2.0,
                    length: 2
                })
            );
        }
    }

    #[test]
    fn action_count_must_match() {
        let mut envs = DummyVecEnv::new(vec![DummyEnv::new(2), DummyEnv::new(2)]).unwrap();
        envs.reset().unwrap();
        let err = envs.step(vec![vec![0.0]]).unwrap_err();
        assert!(matches!(err, EnvError::ActionCount { expected: 2, got: 1 }));
    }

    #[test]
    fn action_shape_must_match_space() {
        let mut envs = DummyVecEnv::new(vec![DummyEnv::new(2)]).unwrap();
        envs.reset().unwrap();
        let err = envs.step(vec![vec![0.0, 1.0]]).unwrap_err();
        assert!(matches!(err, EnvError::ActionShape { expected: 1, got: 2 }));
    }
}
