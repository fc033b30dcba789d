//! Proximal policy optimization with a diagonal Gaussian MLP policy.

use super::adam::Adam;
use super::errors::LearnerError;
use super::mlp::Mlp;
use super::rollout::{Minibatch, RolloutBuffer};
use super::traits::{Algorithm, AlgorithmKind, LearnReport, Policy, PolicyKind};
use crate::env::{Action, BoxSpace, EpisodeStats, VecEnv};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

const LOG_2PI: f32 = 1.837_877_1;
const EPISODE_WINDOW: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    /// Steps collected per sub-environment before each update.
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub clip_range: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub max_grad_norm: f32,
    pub normalize_advantage: bool,
    /// Hidden layer widths shared by actor and critic.
    pub net_arch: Vec<usize>,
    pub log_std_init: f32,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            n_steps: 512,
            batch_size: 64,
            n_epochs: 10,
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            normalize_advantage: true,
            net_arch: vec![64, 64],
            log_std_init: 0.0,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<(), LearnerError> {
        let fail = |msg: &str| Err(LearnerError::Config(msg.to_string()));
        if self.n_steps == 0 || self.batch_size == 0 || self.n_epochs == 0 {
            return fail("n_steps, batch_size and n_epochs must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            return fail("learning_rate must be positive");
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return fail("gamma and gae_lambda must lie in [0, 1]");
        }
        if !(self.clip_range > 0.0) {
            return fail("clip_range must be positive");
        }
        if self.net_arch.contains(&0) {
            return fail("hidden layers must have at least one unit");
        }
        Ok(())
    }
}

/// Actor mean network, critic network and the state-independent log std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCritic {
    pub actor: Mlp,
    pub critic: Mlp,
    pub log_std: Array1<f32>,
}

impl ActorCritic {
    fn new(obs_dim: usize, act_dim: usize, config: &PpoConfig, rng: &mut StdRng) -> Self {
        let mut actor_sizes = vec![obs_dim];
        actor_sizes.extend(&config.net_arch);
        let mut critic_sizes = actor_sizes.clone();
        actor_sizes.push(act_dim);
        critic_sizes.push(1);

        Self {
            actor: Mlp::new(&actor_sizes, 0.01, rng),
            critic: Mlp::new(&critic_sizes, 1.0, rng),
            log_std: Array1::from_elem(act_dim, config.log_std_init),
        }
    }

    fn values(&self, obs: &Array2<f32>) -> Vec<f32> {
        self.critic.forward(obs).column(0).to_vec()
    }

    fn clip_grad_norm(&mut self, max_norm: f32) -> f32 {
        let norm = (self.actor.sum_squares()
            + self.critic.sum_squares()
            + self.log_std.iter().map(|g| g * g).sum::<f32>())
        .sqrt();
        if max_norm > 0.0 && norm > max_norm {
            let factor = max_norm / (norm + 1e-6);
            self.actor.scale(factor);
            self.critic.scale(factor);
            self.log_std *= factor;
        }
        norm
    }

    fn apply(&mut self, grads: &ActorCritic, adam: &mut Adam) {
        let step = adam.tick();
        let mut slot = 0;
        let params = self.actor.layers.iter_mut().chain(self.critic.layers.iter_mut());
        let grads_iter = grads.actor.layers.iter().chain(grads.critic.layers.iter());
        for (p, g) in params.zip(grads_iter) {
            adam.apply(slot, step, &mut p.w, &g.w);
            adam.apply(slot + 1, step, &mut p.b, &g.b);
            slot += 2;
        }
        adam.apply(slot, step, &mut self.log_std, &grads.log_std);
    }
}

/// Sum over action dimensions of the Gaussian log density, one value per row.
fn log_prob(actions: &Array2<f32>, mean: &Array2<f32>, log_std: &Array1<f32>) -> Vec<f32> {
    actions
        .outer_iter()
        .zip(mean.outer_iter())
        .map(|(a, mu)| {
            a.iter()
                .zip(mu.iter())
                .zip(log_std.iter())
                .map(|((a, mu), ls)| {
                    let z = (a - mu) / ls.exp();
                    -0.5 * z * z - ls - 0.5 * LOG_2PI
                })
                .sum()
        })
        .collect()
}

fn entropy(log_std: &Array1<f32>) -> f32 {
    log_std.iter().map(|ls| ls + 0.5 * (1.0 + LOG_2PI)).sum()
}

#[derive(Debug, Default, Clone, Copy)]
struct UpdateStats {
    policy_loss: f32,
    value_loss: f32,
    entropy: f32,
    approx_kl: f32,
    clip_fraction: f32,
    grad_norm: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppo {
    algorithm: AlgorithmKind,
    policy: PolicyKind,
    config: PpoConfig,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    net: ActorCritic,
    optimizer: Adam,
    seed: u64,
    num_timesteps: u64,
    #[serde(skip, default = "unseeded_rng")]
    rng: StdRng,
}

fn unseeded_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

impl Ppo {
    pub fn new(
        policy: PolicyKind,
        observation_space: BoxSpace,
        action_space: BoxSpace,
        config: PpoConfig,
        seed: u64,
    ) -> Result<Self, LearnerError> {
        config.validate()?;
        if observation_space.dim() == 0 || action_space.dim() == 0 {
            return Err(LearnerError::Shape(
                "observation and action spaces must be non-empty".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let net = ActorCritic::new(observation_space.dim(), action_space.dim(), &config, &mut rng);
        let optimizer = Adam::new(config.learning_rate);

        Ok(Self {
            algorithm: AlgorithmKind::Ppo,
            policy,
            config,
            observation_space,
            action_space,
            net,
            optimizer,
            seed,
            num_timesteps: 0,
            rng,
        })
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn policy_kind(&self) -> PolicyKind {
        self.policy
    }

    pub fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    pub fn network(&self) -> &ActorCritic {
        &self.net
    }

    fn obs_dim(&self) -> usize {
        self.observation_space.dim()
    }

    fn act_dim(&self) -> usize {
        self.action_space.dim()
    }

    fn obs_matrix(&self, rows: &[Vec<f32>]) -> Result<Array2<f32>, LearnerError> {
        let dim = self.obs_dim();
        let mut flat = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(LearnerError::Shape(format!(
                    "expected observation of length {dim}, got {}",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }
        Array2::from_shape_vec((rows.len(), dim), flat)
            .map_err(|e| LearnerError::Shape(e.to_string()))
    }

    fn sample(&mut self, mean: &Array2<f32>) -> Array2<f32> {
        let std = self.net.log_std.mapv(f32::exp);
        let mut actions = mean.clone();
        for mut row in actions.outer_iter_mut() {
            for (a, s) in row.iter_mut().zip(std.iter()) {
                let noise: f32 = self.rng.sample(StandardNormal);
                *a += s * noise;
            }
        }
        actions
    }

    fn check_env(&self, env: &dyn VecEnv) -> Result<(), LearnerError> {
        if env.observation_space().dim() != self.obs_dim()
            || env.action_space().dim() != self.act_dim()
        {
            return Err(LearnerError::Shape(format!(
                "model expects {} obs / {} act dims, env provides {} / {}",
                self.obs_dim(),
                self.act_dim(),
                env.observation_space().dim(),
                env.action_space().dim()
            )));
        }
        Ok(())
    }

    fn update(&mut self, buffer: &RolloutBuffer) -> Result<UpdateStats, LearnerError> {
        let mut indices: Vec<usize> = (0..buffer.len()).collect();
        let mut stats = UpdateStats::default();
        let mut batches = 0usize;

        for _ in 0..self.config.n_epochs {
            indices.shuffle(&mut self.rng);
            for chunk in indices.chunks(self.config.batch_size) {
                let batch = buffer.minibatch(chunk)?;
                let step = self.train_minibatch(&batch);
                stats.policy_loss += step.policy_loss;
                stats.value_loss += step.value_loss;
                stats.entropy += step.entropy;
                stats.approx_kl += step.approx_kl;
                stats.clip_fraction += step.clip_fraction;
                stats.grad_norm += step.grad_norm;
                batches += 1;
            }
        }

        if batches > 0 {
            let n = batches as f32;
            stats.policy_loss /= n;
            stats.value_loss /= n;
            stats.entropy /= n;
            stats.approx_kl /= n;
            stats.clip_fraction /= n;
            stats.grad_norm /= n;
        }
        Ok(stats)
    }

    fn train_minibatch(&mut self, batch: &Minibatch) -> UpdateStats {
        let rows = batch.obs.nrows();
        let b = rows as f32;
        let clip = self.config.clip_range;

        let mut advantages = batch.advantages.clone();
        if self.config.normalize_advantage && rows > 1 {
            let mean = advantages.iter().sum::<f32>() / b;
            let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (b - 1.0);
            let std = var.sqrt() + 1e-8;
            advantages.iter_mut().for_each(|a| *a = (*a - mean) / std);
        }

        // Policy term.
        let (mean, actor_inputs) = self.net.actor.forward_trace(&batch.obs);
        let log_std = &self.net.log_std;
        let var = log_std.mapv(|ls| (2.0 * ls).exp());
        let new_log_probs = log_prob(&batch.actions, &mean, log_std);

        let mut d_log_prob = vec![0.0f32; rows];
        let mut policy_loss = 0.0;
        let mut approx_kl = 0.0;
        let mut clipped = 0usize;
        for i in 0..rows {
            let log_ratio = new_log_probs[i] - batch.old_log_probs[i];
            let ratio = log_ratio.exp();
            let adv = advantages[i];
            let unclipped = ratio * adv;
            let bounded = ratio.clamp(1.0 - clip, 1.0 + clip) * adv;
            policy_loss -= unclipped.min(bounded) / b;
            if (ratio - 1.0).abs() > clip {
                clipped += 1;
            }
            // The gradient only flows through the branch the min selects.
            let active = if adv >= 0.0 {
                ratio <= 1.0 + clip
            } else {
                ratio >= 1.0 - clip
            };
            if active {
                d_log_prob[i] = -adv * ratio / b;
            }
            approx_kl += ((ratio - 1.0) - log_ratio) / b;
        }

        let act_dim = self.act_dim();
        let mut d_mean = Array2::<f32>::zeros((rows, act_dim));
        let mut d_log_std = Array1::<f32>::from_elem(act_dim, -self.config.ent_coef);
        for i in 0..rows {
            for j in 0..act_dim {
                let diff = batch.actions[[i, j]] - mean[[i, j]];
                d_mean[[i, j]] = d_log_prob[i] * diff / var[j];
                d_log_std[j] += d_log_prob[i] * (diff * diff / var[j] - 1.0);
            }
        }

        // Value term.
        let (values, critic_inputs) = self.net.critic.forward_trace(&batch.obs);
        let mut d_values = Array2::<f32>::zeros((rows, 1));
        let mut value_loss = 0.0;
        for i in 0..rows {
            let err = values[[i, 0]] - batch.returns[i];
            value_loss += err * err / b;
            d_values[[i, 0]] = self.config.vf_coef * 2.0 * err / b;
        }

        let mut grads = ActorCritic {
            actor: self.net.actor.backward(&actor_inputs, d_mean),
            critic: self.net.critic.backward(&critic_inputs, d_values),
            log_std: d_log_std,
        };
        let grad_norm = grads.clip_grad_norm(self.config.max_grad_norm);

        let entropy = entropy(&self.net.log_std);
        self.net.apply(&grads, &mut self.optimizer);

        UpdateStats {
            policy_loss,
            value_loss,
            entropy,
            approx_kl,
            clip_fraction: clipped as f32 / b,
            grad_norm,
        }
    }
}

impl Policy for Ppo {
    fn predict(
        &self,
        obs: &[f32],
        deterministic: bool,
    ) -> Result<(Action, Option<Vec<f32>>), LearnerError> {
        let x = self.obs_matrix(&[obs.to_vec()])?;
        let mean = self.net.actor.forward(&x);
        let mean = mean.row(0);

        let action: Vec<f32> = if deterministic {
            mean.to_vec()
        } else {
            let mut rng = rand::rng();
            mean.iter()
                .zip(self.net.log_std.iter())
                .map(|(mu, ls)| {
                    let noise: f32 = rng.sample(StandardNormal);
                    mu + ls.exp() * noise
                })
                .collect()
        };
        Ok((self.action_space.clip(&action), None))
    }
}

impl Algorithm for Ppo {
    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        total_timesteps: u64,
    ) -> Result<LearnReport, LearnerError> {
        self.check_env(env)?;

        let n_envs = env.num_envs();
        let target = self.num_timesteps + total_timesteps;
        let start_timesteps = self.num_timesteps;
        let gamma = self.config.gamma;
        let action_space = env.action_space();

        let mut buffer = RolloutBuffer::new(n_envs, self.obs_dim(), self.act_dim());
        let mut obs = env.reset()?;
        let mut episode_starts = vec![true; n_envs];
        let mut recent: VecDeque<EpisodeStats> = VecDeque::with_capacity(EPISODE_WINDOW);
        let mut report = LearnReport::default();
        let started = Instant::now();

        tracing::info!(
            algorithm = %self.algorithm,
            policy = %self.policy,
            n_envs,
            total_timesteps,
            "starting training"
        );

        while self.num_timesteps < target {
            buffer.clear();

            for _ in 0..self.config.n_steps {
                let obs_batch = self.obs_matrix(&obs)?;
                let mean = self.net.actor.forward(&obs_batch);
                let values = self.net.values(&obs_batch);
                let actions = self.sample(&mean);
                let log_probs = log_prob(&actions, &mean, &self.net.log_std);

                let clipped = actions
                    .outer_iter()
                    .map(|row| action_space.clip(&row.to_vec()))
                    .collect();
                let steps = env.step(clipped)?;
                self.num_timesteps += n_envs as u64;

                let mut rewards = Vec::with_capacity(n_envs);
                for step in &steps {
                    let mut reward = step.reward;
                    // Bootstrap through time-limit cuts instead of treating them as terminal.
                    if step.done && step.truncated {
                        if let Some(terminal) = &step.terminal_obs {
                            let terminal = self.obs_matrix(std::slice::from_ref(terminal))?;
                            reward += gamma * self.net.values(&terminal)[0];
                        }
                    }
                    rewards.push(reward);

                    if let Some(episode) = step.episode {
                        report.episodes += 1;
                        if recent.len() == EPISODE_WINDOW {
                            recent.pop_front();
                        }
                        recent.push_back(episode);
                    }
                }

                buffer.push(
                    &obs_batch,
                    &actions,
                    &rewards,
                    &episode_starts,
                    &values,
                    &log_probs,
                )?;

                episode_starts = steps.iter().map(|s| s.done).collect();
                obs = steps.into_iter().map(|s| s.obs).collect();
            }

            let last_values = self.net.values(&self.obs_matrix(&obs)?);
            buffer.compute_returns_and_advantage(
                &last_values,
                &episode_starts,
                gamma,
                self.config.gae_lambda,
            );

            let stats = self.update(&buffer)?;
            report.iterations += 1;

            let elapsed = started.elapsed().as_secs_f64().max(1e-9);
            let fps = (self.num_timesteps - start_timesteps) as f64 / elapsed;
            let (ep_rew_mean, ep_len_mean) = if recent.is_empty() {
                (f32::NAN, f32::NAN)
            } else {
                let n = recent.len() as f32;
                (
                    recent.iter().map(|e| e.reward).sum::<f32>() / n,
                    recent.iter().map(|e| e.length as f32).sum::<f32>() / n,
                )
            };
            tracing::info!(
                iteration = report.iterations,
                total_timesteps = self.num_timesteps,
                fps = fps as u64,
                ep_rew_mean,
                ep_len_mean,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                entropy = stats.entropy,
                approx_kl = stats.approx_kl,
                clip_fraction = stats.clip_fraction,
                grad_norm = stats.grad_norm,
                "rollout"
            );
        }

        report.timesteps = self.num_timesteps - start_timesteps;
        Ok(report)
    }

    fn save(&self, path: &Path) -> Result<(), LearnerError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, LearnerError> {
        let reader = BufReader::new(File::open(path)?);
        let mut model: Ppo = serde_json::from_reader(reader)?;
        model.config.validate()?;
        model.rng = StdRng::seed_from_u64(model.seed ^ model.num_timesteps);
        Ok(model)
    }

    fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }
}
