pub mod config;
pub mod errors;
pub mod pipeline;

pub use config::RunConfig;
pub use errors::DriverError;
pub use pipeline::{RunSummary, run};
