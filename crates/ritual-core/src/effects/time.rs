//! Time effect traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for time operations.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    /// The clock could not be read
    #[error("Clock unavailable: {reason}")]
    ClockUnavailable {
        /// Why the clock is unavailable
        reason: String,
    },
    /// A sleep or other timed operation failed
    #[error("Operation failed: {reason}")]
    OperationFailed {
        /// What went wrong
        reason: String,
    },
}

impl From<TimeError> for crate::RitualError {
    fn from(err: TimeError) -> Self {
        crate::RitualError::internal(err.to_string())
    }
}

/// Wall-clock reading in milliseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Whole seconds since the unix epoch, as ledgers timestamp blocks.
    pub fn unix_secs(self) -> u64 {
        self.ts_ms / 1000
    }
}

/// Wall-clock reads and sleeps.
///
/// Every timeout in the engine is measured against this clock, so a
/// simulated implementation makes waiting loops deterministic.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time.
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;

    /// Suspend for `ms` milliseconds.
    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError>;
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        (**self).sleep_ms(ms).await
    }
}
