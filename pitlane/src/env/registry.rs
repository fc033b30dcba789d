//! String identifiers for the environments this crate can build.

use super::EnvError;
use crate::sim::{RaceConfig, RaceEnv, RenderMode, Track};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const RACE_V0: &str = "pitlane:race-v0";

/// Construction arguments for one environment instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvKwargs {
    pub map: String,
    pub map_ext: String,
    pub num_agents: usize,
    pub render_mode: RenderMode,
    pub sim: RaceConfig,
}

impl Default for EnvKwargs {
    fn default() -> Self {
        Self {
            map: "./maps/example_map".to_string(),
            map_ext: ".json".to_string(),
            num_agents: 1,
            render_mode: RenderMode::None,
            sim: RaceConfig::default(),
        }
    }
}

/// Builds the environment registered under `id`.
pub fn make(id: &str, kwargs: &EnvKwargs, seed: u64) -> Result<RaceEnv, EnvError> {
    if id != RACE_V0 {
        return Err(EnvError::UnknownEnv(id.to_string()));
    }
    if kwargs.num_agents != 1 {
        return Err(EnvError::InvalidArgument(format!(
            "{RACE_V0} supports exactly one agent, got num_agents = {}",
            kwargs.num_agents
        )));
    }

    let track = Track::load(&kwargs.map, &kwargs.map_ext)?;
    RaceEnv::new(
        Arc::new(track),
        kwargs.sim.clone(),
        kwargs.render_mode,
        seed,
    )
}
