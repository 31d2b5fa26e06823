#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Ritual Core (Layer 1) - Data Model and Effect Traits
//!
//! Effect-free foundation of the ritual engine.
//!
//! ## Architecture
//!
//! - **ritual**: Ritual and participant records, status derivation
//! - **phase**: Phase keys, snapshots and readiness predicates
//! - **tx**: Transaction handles, outcome events, pending-action records
//! - **effects**: Chain, crypto, time, storage and cancellation traits
//! - **errors**: Unified `RitualError`
//!
//! Nothing in this crate performs I/O. Every decision that depends on ledger
//! state takes a snapshot that the caller has just read.

pub mod effects;
pub mod errors;
pub mod phase;
pub mod ritual;
pub mod tx;
pub mod types;

pub use errors::{Result, RitualError};
pub use phase::{DkgPhase, Phase1Snapshot, Phase2Snapshot, PhaseKey};
pub use ritual::{Participant, Ritual, RitualStatus};
pub use tx::{
    PendingAction, PendingActionRecord, TxEvent, TxHandle, TxNotification, TxOutcome,
};
pub use types::{Address, BlockHash, BlockHeight, Receipt, RitualId, TxHash, TxId};
