use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Level-triggered, re-armable wake-up used for "skip the current track".
///
/// `raise` latches the flag and wakes every waiter; the flag stays up until
/// the playback loop calls `clear` at the start of its next cycle.
#[derive(Debug, Default)]
pub struct SkipSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl SkipSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Resolves once the signal is raised (immediately if it already is).
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent raise is seen
            // either by the load or by the registered waiter.
            notified.as_mut().enable();

            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
