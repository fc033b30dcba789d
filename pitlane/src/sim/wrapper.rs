use super::race::RawObs;
use crate::env::{Action, BoxSpace, Env, EnvError, Observation, StepInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Lidar beams kept after downsampling; each is the minimum of its slice of the raw scan.
    pub scan_beams: usize,
    /// Speed range the normalized speed action maps onto.
    pub min_speed: f32,
    pub max_speed: f32,
    pub max_episode_steps: usize,
    /// Reward per meter of centerline progress.
    pub progress_reward: f32,
    pub collision_penalty: f32,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            scan_beams: 18,
            min_speed: 1.0,
            max_speed: 4.0,
            max_episode_steps: 1000,
            progress_reward: 1.0,
            collision_penalty: 1.0,
        }
    }
}

/// Adapts the raw racing simulation to the shape the learner works with.
///
/// Observations become `scan_beams` normalized ranges followed by the
/// normalized speed, all in `[0, 1]`. Actions are `[-1, 1]^2` and map onto
/// the steering range and `[min_speed, max_speed]`. Episodes are cut after
/// `max_episode_steps` with `StepInfo::truncated` set.
pub struct RaceWrapper<E> {
    inner: E,
    config: WrapperConfig,
    max_steer: f32,
    scan_range: f32,
    speed_scale: f32,
    last_progress: f32,
    steps: usize,
}

impl<E> RaceWrapper<E>
where
    E: Env<Obs = RawObs, Act = [f32; 2], Info = ()>,
{
    pub fn new(inner: E, config: WrapperConfig) -> Result<Self, EnvError> {
        if config.scan_beams == 0 {
            return Err(EnvError::InvalidArgument(
                "scan_beams must be at least 1".to_string(),
            ));
        }
        if config.min_speed > config.max_speed {
            return Err(EnvError::InvalidArgument(
                "min_speed exceeds max_speed".to_string(),
            ));
        }

        let obs_space = inner.observation_space();
        let act_space = inner.action_space();
        if obs_space.dim() < config.scan_beams {
            return Err(EnvError::InvalidArgument(format!(
                "cannot downsample {} lidar beams to {}",
                obs_space.dim(),
                config.scan_beams
            )));
        }

        let scan_range = obs_space.high.iter().cloned().fold(f32::MIN, f32::max);
        let max_steer = act_space.high[0];
        let speed_scale = act_space.high[1].max(f32::EPSILON);

        Ok(Self {
            inner,
            config,
            max_steer,
            scan_range: scan_range.max(f32::EPSILON),
            speed_scale,
            last_progress: 0.0,
            steps: 0,
        })
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn convert_obs(&self, raw: &RawObs) -> Observation {
        let n = raw.scan.len();
        let beams = self.config.scan_beams;
        let mut obs = Vec::with_capacity(beams + 1);
        for j in 0..beams {
            let start = j * n / beams;
            let end = ((j + 1) * n / beams).max(start + 1);
            let min = raw.scan[start..end]
                .iter()
                .cloned()
                .fold(f32::INFINITY, f32::min);
            obs.push((min / self.scan_range).clamp(0.0, 1.0));
        }
        obs.push((raw.speed / self.speed_scale).clamp(0.0, 1.0));
        obs
    }

    fn convert_action(&self, action: &[f32]) -> [f32; 2] {
        let steer = action[0].clamp(-1.0, 1.0) * self.max_steer;
        let speed_frac = (action[1].clamp(-1.0, 1.0) + 1.0) / 2.0;
        let speed = self.config.min_speed + speed_frac * (self.config.max_speed - self.config.min_speed);
        [steer, speed]
    }
}

impl<E> Env for RaceWrapper<E>
where
    E: Env<Obs = RawObs, Act = [f32; 2], Info = ()>,
{
    type Obs = Observation;
    type Act = Action;
    type Info = StepInfo;

    fn reset(&mut self) -> Result<Self::Obs, EnvError> {
        let raw = self.inner.reset()?;
        self.last_progress = raw.progress;
        self.steps = 0;
        Ok(self.convert_obs(&raw))
    }

    fn step(&mut self, act: Self::Act) -> Result<(Self::Obs, f32, bool, Self::Info), EnvError> {
        if act.len() != 2 {
            return Err(EnvError::ActionShape {
                expected: 2,
                got: act.len(),
            });
        }

        let (raw, _, done, ()) = self.inner.step(self.convert_action(&act))?;
        self.steps += 1;

        let gained = raw.progress - self.last_progress;
        self.last_progress = raw.progress;
        let mut reward = gained * self.config.progress_reward;
        if raw.collision {
            reward -= self.config.collision_penalty;
        }

        let truncated = !done && self.steps >= self.config.max_episode_steps;
        let info = StepInfo {
            truncated,
            extra: serde_json::json!({
                "lap_count": raw.lap_count,
                "collision": raw.collision,
                "progress": raw.progress,
            }),
        };

        Ok((self.convert_obs(&raw), reward, done || truncated, info))
    }

    fn render(&mut self) -> Result<(), EnvError> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.inner.close()
    }

    fn observation_space(&self) -> BoxSpace {
        BoxSpace::uniform(self.config.scan_beams + 1, 0.0, 1.0)
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::uniform(2, -1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::race::{RaceConfig, RaceEnv, RenderMode};
    use crate::sim::track::square_track;
    use std::sync::Arc;

    fn wrapped(config: WrapperConfig) -> RaceWrapper<RaceEnv> {
        let track = Arc::new(square_track(10.0, 2.0));
        let race = RaceConfig {
            start_noise: 0.0,
            ..RaceConfig::default()
        };
        let env = RaceEnv::new(track, race, RenderMode::None, 0).unwrap();
        RaceWrapper::new(env, config).unwrap()
    }

    #[test]
    fn observation_is_normalized_and_downsampled() {
        let mut env = wrapped(WrapperConfig::default());
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 19);
        assert!(obs.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(env.observation_space().contains(&obs));
    }

    #[test]
    fn actions_map_onto_steering_and_speed_ranges() {
        let env = wrapped(WrapperConfig::default());
        assert_eq!(env.convert_action(&[0.0, -1.0]), [0.0, 1.0]);
        assert_eq!(env.convert_action(&[1.0, 1.0]), [0.4189, 4.0]);
        assert_eq!(env.convert_action(&[-5.0, 0.0]), [-0.4189, 2.5]);
    }

    #[test]
    fn progress_is_rewarded() {
        let mut env = wrapped(WrapperConfig::default());
        env.reset().unwrap();
        let total: f32 = (0..20)
            .map(|_| env.step(vec![0.0, 0.0]).unwrap().1)
            .sum();
        assert!(total > 1.0);
    }

    #[test]
    fn time_limit_truncates() {
        let mut env = wrapped(WrapperConfig {
            max_episode_steps: 3,
            ..WrapperConfig::default()
        });
        env.reset().unwrap();
        assert!(!env.step(vec![0.0, -1.0]).unwrap().2);
        assert!(!env.step(vec![0.0, -1.0]).unwrap().2);
        let (_, _, done, info) = env.step(vec![0.0, -1.0]).unwrap();
        assert!(done);
        assert!(info.truncated);
    }

    #[test]
    fn wrong_action_length_is_an_error() {
        let mut env = wrapped(WrapperConfig::default());
        env.reset().unwrap();
        assert!(matches!(
            env.step(vec![0.0]),
            Err(EnvError::ActionShape { expected: 2, got: 1 })
        ));
    }
}
