//! Interactive evaluation of a trained policy.
//!
//! Episodes are rolled out one at a time with rendering enabled. After the
//! episode at index `min_episodes - 1` (zero-based) completes, the user is
//! asked whether to keep going: a yes replays that index once more, anything
//! else ends the session. An interrupt cancels only the attempt in progress,
//! which is then retried at the same index.

use crate::control::{ControlError, Interrupt, Prompt, is_affirmative};
use crate::env::{Action, Env, EnvError, EpisodeStats, Observation};
use crate::learner::{LearnerError, Policy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

pub const CONTINUE_PROMPT: &str = "Another episode? (Y/N) ";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub min_episodes: usize,
    /// Use the mean action instead of sampling.
    pub deterministic: bool,
    /// Pause after each rendered frame, in milliseconds.
    pub frame_delay_ms: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            min_episodes: 5,
            deterministic: false,
            frame_delay_ms: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub run_id: Uuid,
    pub episodes: Vec<EpisodeStats>,
    /// Attempts cut short by an interrupt. They do not count as episodes.
    pub aborted: usize,
    pub prompts: usize,
}

#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Learner(#[from] LearnerError),

    #[error(transparent)]
    Control(#[from] ControlError),
}

enum Attempt {
    Completed(EpisodeStats),
    Interrupted,
}

pub async fn evaluate<E, P, Q>(
    env: &mut E,
    policy: &P,
    prompt: &mut Q,
    interrupt: &Interrupt,
    cfg: &EvalConfig,
) -> Result<EvalReport, EvalError>
where
    E: Env<Obs = Observation, Act = Action> + ?Sized,
    P: Policy + ?Sized,
    Q: Prompt + ?Sized,
{
    let mut report = EvalReport {
        run_id: Uuid::new_v4(),
        episodes: Vec::new(),
        aborted: 0,
        prompts: 0,
    };
    let min = cfg.min_episodes;
    // Zero-based index of the episode being attempted.
    let mut episode = 0;

    while episode < min {
        let token = interrupt.arm();

        match run_episode(env, policy, &token, cfg).await? {
            Attempt::Interrupted => {
                report.aborted += 1;
                info!(run_id = %report.run_id, episode, "episode interrupted");
                continue;
            }
            Attempt::Completed(stats) => {
                info!(
                    run_id = %report.run_id,
                    episode,
                    reward = stats.reward,
                    length = stats.length,
                    "episode finished"
                );
                report.episodes.push(stats);
            }
        }

        if episode + 1 < min {
            episode += 1;
            continue;
        }

        report.prompts += 1;
        let answer = tokio::select! {
            answer = prompt.ask(CONTINUE_PROMPT) => answer?,
            _ = token.cancelled() => None,
        };
        if !answer.as_deref().is_some_and(is_affirmative) {
            episode = min;
        }
    }

    env.close()?;
    info!(
        run_id = %report.run_id,
        episodes = report.episodes.len(),
        aborted = report.aborted,
        "evaluation finished"
    );
    Ok(report)
}

async fn run_episode<E, P>(
    env: &mut E,
    policy: &P,
    token: &CancellationToken,
    cfg: &EvalConfig,
) -> Result<Attempt, EvalError>
where
    E: Env<Obs = Observation, Act = Action> + ?Sized,
    P: Policy + ?Sized,
{
    if token.is_cancelled() {
        return Ok(Attempt::Interrupted);
    }

    let mut obs = env.reset()?;
    let mut stats = EpisodeStats {
        reward: 0.0,
        length: 0,
    };

    loop {
        if token.is_cancelled() {
            return Ok(Attempt::Interrupted);
        }

        let (action, _state) = policy.predict(&obs, cfg.deterministic)?;
        let (next, reward, done, _info) = env.step(action)?;
        stats.reward += reward;
        stats.length += 1;
        env.render()?;

        if done {
            return Ok(Attempt::Completed(stats));
        }
        obs = next;

        // Yield so a pending ctrl-c can reach the token between frames.
        if cfg.frame_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cfg.frame_delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ScriptedPrompt, StdinPrompt};
    use crate::env::{BoxSpace, DummyEnv, StepInfo};
    use async_trait::async_trait;

    struct ZeroPolicy;

    impl Policy for ZeroPolicy {
        fn predict(
            &self,
            _obs: &[f32],
            _deterministic: bool,
        ) -> Result<(Action, Option<Vec<f32>>), LearnerError> {
            Ok((vec![0.0], None))
        }
    }

    /// Triggers the interrupt on the second step of the listed attempts.
    struct Interrupting {
        inner: DummyEnv,
        interrupt: Interrupt,
        on_attempts: Vec<usize>,
        attempt: usize,
        step: usize,
        renders: usize,
    }

    impl Interrupting {
        fn new(interrupt: Interrupt, on_attempts: Vec<usize>) -> Self {
            Self {
                inner: DummyEnv::new(4),
                interrupt,
                on_attempts,
                attempt: 0,
                step: 0,
                renders: 0,
            }
        }
    }

    impl Env for Interrupting {
        type Obs = Observation;
        type Act = Action;
        type Info = StepInfo;

        fn reset(&mut self) -> Result<Observation, EnvError> {
            self.attempt += 1;
            self.step = 0;
            self.inner.reset()
        }

        fn step(&mut self, act: Action) -> Result<(Observation, f32, bool, StepInfo), EnvError> {
            self.step += 1;
            if self.step == 2 && self.on_attempts.contains(&self.attempt) {
                self.interrupt.trigger();
            }
            self.inner.step(act)
        }

        fn render(&mut self) -> Result<(), EnvError> {
            self.renders += 1;
            Ok(())
        }

        fn observation_space(&self) -> BoxSpace {
            self.inner.observation_space()
        }

        fn action_space(&self) -> BoxSpace {
            self.inner.action_space()
        }
    }

    /// Fires the interrupt and then waits forever for an answer.
    struct StuckPrompt(Interrupt);

    #[async_trait]
    impl Prompt for StuckPrompt {
        async fn ask(&mut self, _question: &str) -> Result<Option<String>, ControlError> {
            self.0.trigger();
            std::future::pending().await
        }
    }

    fn cfg(min_episodes: usize) -> EvalConfig {
        EvalConfig {
            min_episodes,
            frame_delay_ms: 0,
            ..EvalConfig::default()
        }
    }

    #[tokio::test]
    async fn declining_stops_at_the_minimum() {
        let mut env = DummyEnv::new(3);
        let mut prompt = ScriptedPrompt::new(["n"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(5))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 5);
        assert_eq!(report.prompts, 1);
        assert_eq!(prompt.asked(), [CONTINUE_PROMPT]);
        assert!(report.episodes.iter().all(|e| e.length == 3 && e.reward == 3.0));
    }

    #[tokio::test]
    async fn one_yes_buys_exactly_one_more_episode() {
        let mut env = DummyEnv::new(2);
        let mut prompt = ScriptedPrompt::new([" Y e S ", "n"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(5))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 6);
        assert_eq!(report.prompts, 2);
    }

    #[tokio::test]
    async fn two_episode_minimum_with_one_yes_runs_three() {
        let mut env = DummyEnv::new(2);
        let mut prompt = ScriptedPrompt::new(["yes", "maybe"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(2))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 3);
        assert_eq!(report.prompts, 2);
        assert_eq!(env.total_steps(), 6);
    }

    #[tokio::test]
    async fn closed_input_counts_as_no() {
        let mut env = DummyEnv::new(2);
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(3))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 3);
        assert_eq!(report.prompts, 1);
    }

    #[tokio::test]
    async fn single_episode_minimum_asks_after_the_first() {
        let mut env = DummyEnv::new(2);
        let mut prompt = ScriptedPrompt::new(["y", "no"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(1))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 2);
        assert_eq!(report.prompts, 2);
    }

    #[tokio::test]
    async fn zero_minimum_runs_nothing() {
        let mut env = DummyEnv::new(2);
        let mut prompt = ScriptedPrompt::new(["y"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &Interrupt::new(), &cfg(0))
            .await
            .unwrap();

        assert!(report.episodes.is_empty());
        assert!(prompt.asked().is_empty());
        assert_eq!(env.total_steps(), 0);
    }

    #[tokio::test]
    async fn interrupt_abandons_only_the_current_attempt() {
        let interrupt = Interrupt::new();
        let mut env = Interrupting::new(interrupt.clone(), vec![2]);
        let mut prompt = ScriptedPrompt::new(["n"]);
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &interrupt, &cfg(3))
            .await
            .unwrap();

        assert_eq!(report.aborted, 1);
        assert_eq!(report.episodes.len(), 3);
        assert_eq!(report.prompts, 1);
        assert_eq!(env.attempt, 4);
        // 4 + 2 + 4 + 4 rendered frames
        assert_eq!(env.renders, 14);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_an_answer_ends_the_session() {
        let interrupt = Interrupt::new();
        let mut env = DummyEnv::new(2);
        let mut prompt = StuckPrompt(interrupt.clone());
        let report = evaluate(&mut env, &ZeroPolicy, &mut prompt, &interrupt, &cfg(2))
            .await
            .unwrap();

        assert_eq!(report.episodes.len(), 2);
        assert_eq!(report.prompts, 1);
        assert_eq!(report.aborted, 0);
    }

    /// Never yields a byte; stands in for a terminal nobody types into.
    struct SilentTerminal(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for SilentTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn interrupt_at_a_stdin_prompt_returns_without_waiting_for_input() {
        let (_keep_open, silent) = std::sync::mpsc::channel();
        let mut prompt = StdinPrompt::from_reader(std::io::BufReader::new(SilentTerminal(silent)));
        let interrupt = Interrupt::new();
        let mut env = DummyEnv::new(2);

        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            evaluate(&mut env, &ZeroPolicy, &mut prompt, &interrupt, &cfg(1)),
        )
        .await
        .expect("evaluation should end on interrupt")
        .unwrap();

        assert_eq!(report.episodes.len(), 1);
        assert_eq!(report.prompts, 1);
    }
}
