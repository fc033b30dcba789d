use pitlane::control::{Interrupt, StdinPrompt};
use pitlane_driver::{RunConfig, run};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RunConfig::load()?;
    let interrupt = Interrupt::new();
    let mut prompt = StdinPrompt::new();

    let summary = run(&config, &mut prompt, &interrupt).await?;
    tracing::info!(
        checkpoint = %summary.checkpoint.display(),
        steps = summary.training.total_steps,
        episodes = summary.evaluation.episodes.len(),
        aborted = summary.evaluation.aborted,
        "run complete"
    );
    Ok(())
}
