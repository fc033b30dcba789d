use super::vec_env::EnvSlot;
use super::{Action, BoxSpace, Env, EnvError, Observation, StepInfo, VecEnv, VecStep};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

type Reply<T> = SyncSender<Result<T, EnvError>>;

enum Command {
    Reset(Reply<Observation>),
    Step(Action, Reply<VecStep>),
    Close(Reply<()>),
}

fn reply_channel<T>() -> (Reply<T>, Receiver<Result<T, EnvError>>) {
    mpsc::sync_channel(1)
}

struct Worker {
    id: Uuid,
    index: usize,
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn send(&self, command: Command) -> Result<(), EnvError> {
        self.commands
            .send(command)
            .map_err(|_| EnvError::WorkerDied(self.index))
    }

    fn wait<T>(&self, reply: &Receiver<Result<T, EnvError>>) -> Result<T, EnvError> {
        match reply.recv() {
            Ok(result) => result.map_err(|source| EnvError::Worker {
                index: self.index,
                source: Box::new(source),
            }),
            Err(_) => Err(EnvError::WorkerDied(self.index)),
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(worker = %self.id, index = self.index, "env worker panicked");
            }
        }
    }
}

fn serve<E>(mut slot: EnvSlot<E>, commands: Receiver<Command>)
where
    E: Env<Obs = Observation, Act = Action, Info = StepInfo>,
{
    while let Ok(command) = commands.recv() {
        match command {
            Command::Reset(reply) => {
                let _ = reply.send(slot.reset());
            }
            Command::Step(action, reply) => {
                let _ = reply.send(slot.step(action));
            }
            Command::Close(reply) => {
                let _ = reply.send(slot.close());
                return;
            }
        }
    }
}

/// Each environment lives on its own worker thread and only exchanges
/// observations, actions and transitions with the caller.
///
/// `step` hands every worker its action before waiting on any reply, so the
/// simulations advance in parallel and the call returns once all have answered.
pub struct SubprocVecEnv {
    workers: Vec<Worker>,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    closed: bool,
}

impl SubprocVecEnv {
    pub fn spawn<E, F>(n_envs: usize, seed: u64, factory: F) -> Result<Self, EnvError>
    where
        E: Env<Obs = Observation, Act = Action, Info = StepInfo> + 'static,
        F: Fn(usize, u64) -> Result<E, EnvError> + Send + Sync + 'static,
    {
        if n_envs == 0 {
            return Err(EnvError::InvalidArgument(
                "n_envs must be at least 1".to_string(),
            ));
        }

        let factory = Arc::new(factory);
        let mut workers = Vec::with_capacity(n_envs);
        let mut ready = Vec::with_capacity(n_envs);

        for index in 0..n_envs {
            let (commands_tx, commands_rx) = mpsc::channel();
            let (ready_tx, ready_rx) = reply_channel::<(BoxSpace, BoxSpace)>();
            let factory = Arc::clone(&factory);
            let env_seed = seed + index as u64;
            let id = Uuid::new_v4();

            let spawned = thread::Builder::new()
                .name(format!("env-worker-{index}"))
                .spawn(move || match factory(index, env_seed) {
                    Ok(env) => {
                        let slot = EnvSlot::new(env);
                        if ready_tx.send(Ok(slot.spaces())).is_ok() {
                            serve(slot, commands_rx);
                        }
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(err) => {
                    shutdown(&mut workers);
                    return Err(EnvError::Io(err));
                }
            };

            tracing::debug!(worker = %id, index, seed = env_seed, "spawned env worker");
            workers.push(Worker {
                id,
                index,
                commands: commands_tx,
                thread: Some(thread),
            });
            ready.push(ready_rx);
        }

        let mut spaces = None;
        for (worker, ready_rx) in workers.iter().zip(&ready) {
            match worker.wait(ready_rx) {
                Ok(worker_spaces) => {
                    spaces.get_or_insert(worker_spaces);
                }
                Err(err) => {
                    tracing::error!(index = worker.index, error = %err, "env worker failed to start");
                    shutdown(&mut workers);
                    return Err(err);
                }
            }
        }

        let Some((observation_space, action_space)) = spaces else {
            return Err(EnvError::InvalidArgument(
                "n_envs must be at least 1".to_string(),
            ));
        };

        Ok(Self {
            workers,
            observation_space,
            action_space,
            closed: false,
        })
    }

    pub fn worker_ids(&self) -> Vec<Uuid> {
        self.workers.iter().map(|w| w.id).collect()
    }

    fn ensure_open(&self) -> Result<(), EnvError> {
        if self.closed {
            Err(EnvError::Closed)
        } else {
            Ok(())
        }
    }
}

fn shutdown(workers: &mut [Worker]) {
    for worker in workers.iter() {
        let (tx, _rx) = reply_channel();
        let _ = worker.send(Command::Close(tx));
    }
    for worker in workers.iter_mut() {
        worker.join();
    }
}

impl VecEnv for SubprocVecEnv {
    fn num_envs(&self) -> usize {
        self.workers.len()
    }

    fn observation_space(&self) -> BoxSpace {
        self.observation_space.clone()
    }

    fn action_space(&self) -> BoxSpace {
        self.action_space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Observation>, EnvError> {
        self.ensure_open()?;
        let mut pending = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let (tx, rx) = reply_channel();
            worker.send(Command::Reset(tx))?;
            pending.push(rx);
        }

        self.workers
            .iter()
            .zip(&pending)
            .map(|(worker, rx)| worker.wait(rx))
            .collect()
    }

    fn step(&mut self, actions: Vec<Action>) -> Result<Vec<VecStep>, EnvError> {
        self.ensure_open()?;
        if actions.len() != self.workers.len() {
            return Err(EnvError::ActionCount {
                expected: self.workers.len(),
                got: actions.len(),
            });
        }

        let mut pending = Vec::with_capacity(self.workers.len());
        for (worker, action) in self.workers.iter().zip(actions) {
            let (tx, rx) = reply_channel();
            worker.send(Command::Step(action, tx))?;
            pending.push(rx);
        }

        self.workers
            .iter()
            .zip(&pending)
            .map(|(worker, rx)| worker.wait(rx))
            .collect()
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut pending = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let (tx, rx) = reply_channel();
            // A dead worker has nothing left to close.
            if worker.send(Command::Close(tx)).is_ok() {
                pending.push((worker.index, rx));
            }
        }

        let mut first_err = None;
        for (index, rx) in pending {
            if let Ok(Err(err)) = rx.recv() {
                tracing::warn!(index, error = %err, "env worker failed to close");
                first_err.get_or_insert(err);
            }
        }
        for worker in &mut self.workers {
            worker.join();
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for SubprocVecEnv {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            shutdown(&mut self.workers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DummyEnv;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn spawns_one_worker_per_env() {
        for n in 1..=4 {
            let mut envs = SubprocVecEnv::spawn(n, 7, |_, _| Ok(DummyEnv::new(5))).unwrap();
            assert_eq!(envs.num_envs(), n);
            assert_eq!(envs.worker_ids().len(), n);
            assert_eq!(envs.reset().unwrap().len(), n);
            envs.close().unwrap();
        }
    }

    #[test]
    fn workers_receive_index_and_offset_seed() {
        let envs = SubprocVecEnv::spawn(3, 100, |index, seed| {
            assert_eq!(seed, 100 + index as u64);
            Ok(DummyEnv::new(5))
        });
        assert!(envs.is_ok());
    }

    #[test]
    fn one_failing_worker_fails_the_whole_batch() {
        let result = SubprocVecEnv::spawn(4, 0, |index, _| {
            if index == 2 {
                Err(EnvError::Map("no such map".to_string()))
            } else {
                Ok(DummyEnv::new(5))
            }
        });

        match result {
            Err(EnvError::Worker { index, source }) => {
                assert_eq!(index, 2);
                assert!(matches!(*source, EnvError::Map(_)));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected construction to fail"),
        }
    }

    #[test]
    fn steps_every_worker_once_per_call() {
        let counter = Arc::new(AtomicU64::new(0));
        let shared = Arc::clone(&counter);
        let mut envs =
            SubprocVecEnv::spawn(3, 0, move |_, _| Ok(DummyEnv::with_counter(4, Arc::clone(&shared))))
                .unwrap();
        envs.reset().unwrap();

        for _ in 0..5 {
            let steps = envs.step(vec![vec![0.0]; 3]).unwrap();
            assert_eq!(steps.len(), 3);
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 15);
    }

    #[test]
    fn closed_env_refuses_work() {
        let mut envs = SubprocVecEnv::spawn(2, 0, |_, _| Ok(DummyEnv::new(5))).unwrap();
        envs.close().unwrap();
        envs.close().unwrap();
        assert!(matches!(envs.reset(), Err(EnvError::Closed)));
    }
}
