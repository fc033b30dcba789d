pub mod adam;
mod errors;
pub mod mlp;
pub mod ppo;
pub mod rollout;
mod traits;

pub use errors::LearnerError;
pub use ppo::{Ppo, PpoConfig};
pub use traits::{Algorithm, AlgorithmKind, LearnReport, Policy, PolicyKind};
