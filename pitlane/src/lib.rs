//! Racing-simulator reinforcement learning: environments, a PPO learner and
//! the drivers that train, checkpoint and replay an agent.

pub mod checkpoint;
pub mod control;
pub mod env;
pub mod eval;
pub mod learner;
pub mod sim;
pub mod train;
