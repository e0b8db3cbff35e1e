use parking_lot::Mutex;
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delayed action that runs after a guild has been idle for `delay`.
///
/// Only the countdown is cancellable. Once the delay has elapsed the action
/// runs to completion even if `cancel` is called meanwhile.
#[derive(Debug)]
pub struct IdleTimer {
    delay: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl IdleTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Starts a fresh countdown, replacing any pending one.
    pub fn arm<F>(&self, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            previous.cancel();
        }

        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("⏱️ Idle countdown cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    on_fire.await;
                }
            }
        });
    }

    pub fn cancel(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
        }
    }
}
