//! Watch-channel backed cancellation tokens.

use async_trait::async_trait;
use ritual_core::effects::CancellationToken;
use tokio::sync::watch;

/// Cancellation token that can be fired once and observed by any number of
/// waiters, including waiters that subscribe after it fired.
#[derive(Debug, Clone)]
pub struct WatchCancellation {
    sender: watch::Sender<bool>,
}

impl WatchCancellation {
    /// New, untriggered token.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for WatchCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CancellationToken for WatchCancellation {
    async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so `wait_for` can only fail once we are gone.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}
