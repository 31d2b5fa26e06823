use async_trait::async_trait;
use ritual_core::effects::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Controllable time source for deterministic testing
///
/// Sleeping advances virtual time instead of blocking, then yields so other
/// tasks on the runtime get a turn.
#[derive(Clone, Debug)]
pub struct ControllableTimeSource {
    current_ms: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl ControllableTimeSource {
    /// Create new controllable time source starting at `initial_ms`
    pub fn new(initial_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(initial_ms)),
            sleeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance time by `ms` milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Current virtual time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Number of sleeps performed so far
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableTimeSource {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(PhysicalTime {
            ts_ms: self.now_ms(),
        })
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance_ms(ms);
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_virtual_time() {
        let time = ControllableTimeSource::new(1_000);
        time.sleep_ms(250).await.unwrap();
        time.sleep_ms(250).await.unwrap();
        assert_eq!(time.physical_time().await.unwrap().ts_ms, 1_500);
        assert_eq!(time.sleep_count(), 2);
    }
}
