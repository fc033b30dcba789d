pub mod errors;
pub mod registry;
pub mod subproc;
pub mod traits;
pub mod types;
pub mod vec_env;

pub use errors::EnvError;
pub use subproc::SubprocVecEnv;
pub use traits::Env;
pub use types::{Action, BoxSpace, EpisodeStats, Observation, StepInfo, VecStep};
pub use vec_env::{DummyVecEnv, VecEnv, VecEnvKind, make_vec_env};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-length episodes with a one-dimensional observation: the step index.
///
/// Every `step` bumps a counter shared across clones, which makes it handy for
/// checking how many transitions a vectorized run really produced.
#[derive(Debug, Clone)]
pub struct DummyEnv {
    step_count: usize,
    episode_len: usize,
    total_steps: Arc<AtomicU64>,
}

impl DummyEnv {
    pub fn new(episode_len: usize) -> Self {
        Self {
            step_count: 0,
            episode_len: episode_len.max(1),
            total_steps: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_counter(episode_len: usize, total_steps: Arc<AtomicU64>) -> Self {
        Self {
            total_steps,
            ..Self::new(episode_len)
        }
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps.load(Ordering::Relaxed)
    }
}

impl Env for DummyEnv {
    type Obs = Observation;
    type Act = Action;
    type Info = StepInfo;

    fn reset(&mut self) -> Result<Self::Obs, EnvError> {
        self.step_count = 0;
        Ok(vec![0.0])
    }

    fn step(&mut self, _act: Self::Act) -> Result<(Self::Obs, f32, bool, Self::Info), EnvError> {
        self.step_count += 1;
        self.total_steps.fetch_add(1, Ordering::Relaxed);
        let done = self.step_count >= self.episode_len;
        Ok((
            vec![self.step_count as f32],
            1.0,
            done,
            StepInfo::default(),
        ))
    }

    fn observation_space(&self) -> BoxSpace {
        BoxSpace::uniform(1, 0.0, self.episode_len as f32)
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::uniform(1, -1.0, 1.0)
    }
}
