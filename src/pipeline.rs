//! Train, checkpoint, then replay: the whole run from configuration to report.

use crate::config::RunConfig;
use crate::errors::DriverError;
use chrono::Local;
use pitlane::checkpoint;
use pitlane::control::{Interrupt, Prompt};
use pitlane::env::registry;
use pitlane::env::{VecEnvKind, make_vec_env};
use pitlane::eval::{EvalReport, evaluate};
use pitlane::learner::Ppo;
use pitlane::sim::{RaceWrapper, RenderMode};
use pitlane::train::{TrainingStats, build_algorithm, train};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct RunSummary {
    pub checkpoint: PathBuf,
    pub training: TrainingStats,
    pub evaluation: EvalReport,
}

pub async fn run<Q>(
    config: &RunConfig,
    prompt: &mut Q,
    interrupt: &Interrupt,
) -> Result<RunSummary, DriverError>
where
    Q: Prompt + ?Sized,
{
    config.validate()?;

    let env_id = config.env_id.clone();
    let kwargs = config.env_kwargs(RenderMode::None);
    let wrapper = config.wrapper.clone();
    let envs = make_vec_env(
        config.num_process,
        VecEnvKind::Subproc,
        config.seed,
        move |_, seed| RaceWrapper::new(registry::make(&env_id, &kwargs, seed)?, wrapper.clone()),
    )?;
    info!(workers = config.num_process, env_id = %config.env_id, "training environments ready");

    let model = build_algorithm(&config.train_config(), envs.as_ref())?;
    let (model, training) = train(model, envs, config.train_steps).await?;

    let checkpoint = checkpoint::save(
        &model,
        &config.checkpoint_dir,
        &config.checkpoint_prefix,
        &Local::now().naive_local(),
    )?;
    drop(model);

    let eval_env = registry::make(
        &config.env_id,
        &config.env_kwargs(RenderMode::Human),
        config.seed.wrapping_add(config.num_process as u64),
    )?;
    let mut eval_env = RaceWrapper::new(eval_env, config.wrapper.clone())?;
    let model: Ppo = checkpoint::load(&checkpoint)?;

    // Ctrl-C stays fatal while training; from here on it only cancels an episode.
    let listener = interrupt.listen_ctrl_c();
    let evaluation = evaluate(
        &mut eval_env,
        &model,
        prompt,
        interrupt,
        &config.eval_config(),
    )
    .await;
    listener.abort();
    let evaluation = evaluation?;

    Ok(RunSummary {
        checkpoint,
        training,
        evaluation,
    })
}
