use super::errors::LearnerError;
use ndarray::Array2;

/// On-policy experience from one rollout, laid out step-major:
/// index `t * n_envs + e` holds step `t` of sub-environment `e`.
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    n_envs: usize,
    obs_dim: usize,
    act_dim: usize,
    obs: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    episode_starts: Vec<bool>,
    values: Vec<f32>,
    log_probs: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
}

/// Rows gathered for one gradient step.
#[derive(Debug)]
pub struct Minibatch {
    pub obs: Array2<f32>,
    pub actions: Array2<f32>,
    pub old_log_probs: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new(n_envs: usize, obs_dim: usize, act_dim: usize) -> Self {
        Self {
            n_envs,
            obs_dim,
            act_dim,
            obs: Vec::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            episode_starts: Vec::new(),
            values: Vec::new(),
            log_probs: Vec::new(),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.obs.clear();
        self.actions.clear();
        self.rewards.clear();
        self.episode_starts.clear();
        self.values.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    /// Number of stored transitions over all sub-environments.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Appends one vectorized step: `obs` and `actions` are `n_envs` rows.
    pub fn push(
        &mut self,
        obs: &Array2<f32>,
        actions: &Array2<f32>,
        rewards: &[f32],
        episode_starts: &[bool],
        values: &[f32],
        log_probs: &[f32],
    ) -> Result<(), LearnerError> {
        let n = self.n_envs;
        if obs.dim() != (n, self.obs_dim)
            || actions.dim() != (n, self.act_dim)
            || rewards.len() != n
            || episode_starts.len() != n
            || values.len() != n
            || log_probs.len() != n
        {
            return Err(LearnerError::Shape(format!(
                "rollout step does not match {n} envs x {} obs x {} act",
                self.obs_dim, self.act_dim
            )));
        }

        self.obs.extend(obs.iter());
        self.actions.extend(actions.iter());
        self.rewards.extend_from_slice(rewards);
        self.episode_starts.extend_from_slice(episode_starts);
        self.values.extend_from_slice(values);
        self.log_probs.extend_from_slice(log_probs);
        Ok(())
    }

    /// Generalized advantage estimation.
    ///
    /// `last_values` are the value estimates of the observations following
    /// the final step and `dones` whether those observations start a new episode.
    pub fn compute_returns_and_advantage(
        &mut self,
        last_values: &[f32],
        dones: &[bool],
        gamma: f32,
        gae_lambda: f32,
    ) {
        let n = self.n_envs;
        let steps = self.len() / n.max(1);
        self.advantages = vec![0.0; self.len()];

        for e in 0..n {
            let mut last_gae = 0.0;
            for t in (0..steps).rev() {
                let i = t * n + e;
                let (next_non_terminal, next_value) = if t + 1 == steps {
                    (if dones[e] { 0.0 } else { 1.0 }, last_values[e])
                } else {
                    let next = (t + 1) * n + e;
                    (
                        if self.episode_starts[next] { 0.0 } else { 1.0 },
                        self.values[next],
                    )
                };
                let delta =
                    self.rewards[i] + gamma * next_value * next_non_terminal - self.values[i];
                last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;
                self.advantages[i] = last_gae;
            }
        }

        self.returns = self
            .advantages
            .iter()
            .zip(&self.values)
            .map(|(a, v)| a + v)
            .collect();
    }

    pub fn minibatch(&self, indices: &[usize]) -> Result<Minibatch, LearnerError> {
        let rows = indices.len();
        let mut obs = Vec::with_capacity(rows * self.obs_dim);
        let mut actions = Vec::with_capacity(rows * self.act_dim);
        for &i in indices {
            obs.extend_from_slice(&self.obs[i * self.obs_dim..(i + 1) * self.obs_dim]);
            actions.extend_from_slice(&self.actions[i * self.act_dim..(i + 1) * self.act_dim]);
        }

        let shape_err = |e: ndarray::ShapeError| LearnerError::Shape(e.to_string());
        Ok(Minibatch {
            obs: Array2::from_shape_vec((rows, self.obs_dim), obs).map_err(shape_err)?,
            actions: Array2::from_shape_vec((rows, self.act_dim), actions).map_err(shape_err)?,
            old_log_probs: indices.iter().map(|&i| self.log_probs[i]).collect(),
            advantages: indices.iter().map(|&i| self.advantages[i]).collect(),
            returns: indices.iter().map(|&i| self.returns[i]).collect(),
        })
    }

    pub fn advantages(&self) -> &[f32] {
        &self.advantages
    }

    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}
