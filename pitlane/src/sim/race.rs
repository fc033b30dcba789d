use super::render::AsciiRenderer;
use super::track::Track;
use crate::env::{BoxSpace, Env, EnvError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    None,
    Human,
}

/// Vehicle, lidar and episode parameters of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub timestep: f32,
    pub wheelbase: f32,
    pub max_steer: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub max_accel: f32,
    pub lidar_beams: usize,
    pub lidar_fov: f32,
    pub lidar_range: f32,
    /// Laps after which the episode ends.
    pub laps: u32,
    /// Uniform noise applied to the start pose on reset, in meters and radians.
    pub start_noise: f32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            timestep: 0.05,
            wheelbase: 0.33,
            max_steer: 0.4189,
            min_speed: 0.0,
            max_speed: 5.0,
            max_accel: 7.5,
            lidar_beams: 54,
            lidar_fov: 1.5 * PI,
            lidar_range: 10.0,
            laps: 2,
            start_noise: 0.1,
        }
    }
}

/// Everything the simulation reports about the ego car after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObs {
    pub scan: Vec<f32>,
    pub pose_x: f32,
    pub pose_y: f32,
    pub pose_theta: f32,
    pub speed: f32,
    pub lap_count: u32,
    pub collision: bool,
    /// Meters driven along the centerline since reset.
    pub progress: f32,
}

#[derive(Debug, Clone, Copy)]
struct CarState {
    x: f32,
    y: f32,
    theta: f32,
    speed: f32,
}

/// Single-car racing simulation on a [`Track`].
///
/// The car follows a kinematic bicycle model; `[steering_angle, speed]`
/// commands are clamped to the action space and speed changes are limited by
/// `max_accel`. An episode ends when the car leaves the track or completes
/// `laps` laps.
pub struct RaceEnv {
    track: Arc<Track>,
    config: RaceConfig,
    rng: StdRng,
    car: CarState,
    track_pos: f32,
    progress: f32,
    collision: bool,
    renderer: Option<AsciiRenderer>,
}

impl RaceEnv {
    pub fn new(
        track: Arc<Track>,
        config: RaceConfig,
        render_mode: RenderMode,
        seed: u64,
    ) -> Result<Self, EnvError> {
        if config.lidar_beams == 0 {
            return Err(EnvError::InvalidArgument(
                "lidar_beams must be at least 1".to_string(),
            ));
        }
        if !(config.timestep > 0.0) || !(config.wheelbase > 0.0) {
            return Err(EnvError::InvalidArgument(
                "timestep and wheelbase must be positive".to_string(),
            ));
        }
        let finite = [
            config.timestep,
            config.wheelbase,
            config.max_steer,
            config.min_speed,
            config.max_speed,
            config.max_accel,
            config.lidar_fov,
            config.lidar_range,
            config.start_noise,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(EnvError::InvalidArgument(
                "car and lidar limits must be finite".to_string(),
            ));
        }
        if config.max_steer < 0.0 || config.max_accel < 0.0 {
            return Err(EnvError::InvalidArgument(
                "max_steer and max_accel must not be negative".to_string(),
            ));
        }
        if config.min_speed > config.max_speed {
            return Err(EnvError::InvalidArgument(
                "min_speed exceeds max_speed".to_string(),
            ));
        }

        let renderer = match render_mode {
            RenderMode::Human => Some(AsciiRenderer::new(&track)),
            RenderMode::None => None,
        };
        let (x, y, theta) = track.start_pose();

        Ok(Self {
            track,
            config,
            rng: StdRng::seed_from_u64(seed),
            car: CarState {
                x,
                y,
                theta,
                speed: 0.0,
            },
            track_pos: 0.0,
            progress: 0.0,
            collision: false,
            renderer,
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    fn lap_count(&self) -> u32 {
        (self.progress.max(0.0) / self.track.length()).floor() as u32
    }

    fn scan(&self) -> Vec<f32> {
        let cfg = &self.config;
        let grid = self.track.grid();
        let step = grid.resolution;
        let beams = cfg.lidar_beams;

        (0..beams)
            .map(|i| {
                let offset = if beams == 1 {
                    0.0
                } else {
                    -cfg.lidar_fov / 2.0 + cfg.lidar_fov * i as f32 / (beams - 1) as f32
                };
                let (sin, cos) = (self.car.theta + offset).sin_cos();
                let mut range = 0.0;
                while range < cfg.lidar_range {
                    let next = range + step;
                    if !grid.is_free(self.car.x + cos * next, self.car.y + sin * next) {
                        break;
                    }
                    range = next;
                }
                range.min(cfg.lidar_range)
            })
            .collect()
    }

    fn observe(&self) -> RawObs {
        RawObs {
            scan: self.scan(),
            pose_x: self.car.x,
            pose_y: self.car.y,
            pose_theta: self.car.theta,
            speed: self.car.speed,
            lap_count: self.lap_count(),
            collision: self.collision,
            progress: self.progress,
        }
    }
}

impl Env for RaceEnv {
    type Obs = RawObs;
    type Act = [f32; 2];
    type Info = ();

    fn reset(&mut self) -> Result<Self::Obs, EnvError> {
        let (x, y, theta) = self.track.start_pose();
        let noise = self.config.start_noise;
        let (dx, dy, dtheta) = if noise > 0.0 {
            (
                self.rng.random_range(-noise..=noise),
                self.rng.random_range(-noise..=noise),
                self.rng.random_range(-noise..=noise),
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        self.car = CarState {
            x: x + dx,
            y: y + dy,
            theta: theta + dtheta,
            speed: 0.0,
        };
        self.track_pos = self.track.progress(self.car.x, self.car.y);
        self.progress = 0.0;
        self.collision = false;
        Ok(self.observe())
    }

    fn step(&mut self, act: Self::Act) -> Result<(Self::Obs, f32, bool, Self::Info), EnvError> {
        let cfg = &self.config;
        let steer = act[0].clamp(-cfg.max_steer, cfg.max_steer);
        let target = act[1].clamp(cfg.min_speed, cfg.max_speed);
        let dt = cfg.timestep;

        let max_dv = cfg.max_accel * dt;
        let car = &mut self.car;
        car.speed += (target - car.speed).clamp(-max_dv, max_dv);
        car.x += car.speed * car.theta.cos() * dt;
        car.y += car.speed * car.theta.sin() * dt;
        car.theta = (car.theta + car.speed / cfg.wheelbase * steer.tan() * dt).rem_euclid(2.0 * PI);

        let track_pos = self.track.progress(car.x, car.y);
        self.progress += self.track.progress_delta(self.track_pos, track_pos);
        self.track_pos = track_pos;
        self.collision = !self.track.grid().is_free(car.x, car.y);

        let obs = self.observe();
        let done = obs.collision || obs.lap_count >= self.config.laps;
        Ok((obs, 0.0, done, ()))
    }

    fn render(&mut self) -> Result<(), EnvError> {
        let status = format!(
            "lap {}/{}  speed {:4.2} m/s  progress {:7.2} m",
            self.lap_count(),
            self.config.laps,
            self.car.speed,
            self.progress
        );
        let CarState { x, y, theta, .. } = self.car;
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let frame = renderer.frame(x, y, theta, &status);
        renderer.draw(&frame)?;
        Ok(())
    }

    fn observation_space(&self) -> BoxSpace {
        BoxSpace::uniform(self.config.lidar_beams, 0.0, self.config.lidar_range)
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::new(
            vec![-self.config.max_steer, self.config.min_speed],
            vec![self.config.max_steer, self.config.max_speed],
        )
    }
}
