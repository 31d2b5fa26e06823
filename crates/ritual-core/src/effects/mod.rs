//! Effect trait definitions.
//!
//! Pure trait definitions for every side effect the engine performs. This
//! module defines **what** effects exist; handlers in `ritual-effects` (and
//! simulated handlers in `ritual-testkit`) define **how**.
//!
//! - **Chain**: ledger reads and transaction submission
//! - **Crypto**: opaque transcript generation and aggregation
//! - **Time**: wall-clock reads and sleeps
//! - **Storage**: key-value persistence
//! - **Task**: cooperative cancellation

pub mod chain;
pub mod crypto;
pub mod storage;
pub mod task;
pub mod time;

pub use chain::{ChainReadEffects, ChainWriteEffects};
pub use crypto::{AggregationOutput, DkgCryptoEffects};
pub use storage::{StorageEffects, StorageError};
pub use task::{CancellationToken, NeverCancel};
pub use time::{PhysicalTime, PhysicalTimeEffects, TimeError};
