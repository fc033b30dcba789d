use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation of the episode currently being evaluated.
///
/// Each episode attempt calls [`Interrupt::arm`] to get a fresh token;
/// [`Interrupt::trigger`] cancels whichever token is armed at that moment, so
/// an interrupt never leaks into the next attempt.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    pub fn trigger(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Triggers on every Ctrl-C until the returned task is aborted.
    pub fn listen_ctrl_c(&self) -> JoinHandle<()> {
        let interrupt = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::warn!(%error, "cannot listen for ctrl-c; episode interrupts disabled");
                    return;
                }
                tracing::info!("ctrl-c received, cancelling current episode");
                interrupt.trigger();
            }
        })
    }
}
