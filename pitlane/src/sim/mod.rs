//! Built-in single-car racing simulation and the wrapper that adapts it to the learner.

pub mod race;
pub mod render;
pub mod track;
pub mod wrapper;

pub use race::{RaceConfig, RaceEnv, RawObs, RenderMode};
pub use track::{Track, TrackSpec};
pub use wrapper::{RaceWrapper, WrapperConfig};
