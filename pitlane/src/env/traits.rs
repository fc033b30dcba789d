use crate::env::errors::EnvError;
use crate::env::types::BoxSpace;

/// The reset/step/render contract every simulation and wrapper speaks.
///
/// Wrappers implement `Env` themselves and hold the inner environment, so the
/// only thing that changes across a wrapper boundary is the payload shape.
pub trait Env: Send {
    type Obs: Send + Clone + 'static;
    type Act: Send + Clone + 'static;
    type Info: Send + Clone + 'static;

    fn reset(&mut self) -> Result<Self::Obs, EnvError>;
    fn step(&mut self, act: Self::Act) -> Result<(Self::Obs, f32, bool, Self::Info), EnvError>;

    fn render(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    fn observation_space(&self) -> BoxSpace;
    fn action_space(&self) -> BoxSpace;
}
