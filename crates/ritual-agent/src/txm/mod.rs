//! Transaction Lifecycle Manager
//!
//! - `manager`: at-most-one pending action per phase key, outcome handling
//!   and resubmission
//! - `finality`: waits for a broadcast attempt to settle
//! - `store`: persistence of the latest outcome per phase key

pub mod finality;
pub mod manager;
pub mod store;

pub use finality::{FinalityTracker, Tracking};
pub use manager::{EventDisposition, PhaseAction, Submission, TransactionManager};
pub use store::{MemoryPendingActionStore, PendingActionStore, StoragePendingActionStore};
