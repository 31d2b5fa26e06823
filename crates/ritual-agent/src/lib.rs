#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Ritual Agent - Layer 6: Node Engine
//!
//! Composes the effect traits from `ritual-core` into the engine one node runs
//! to take part in DKG rituals.
//!
//! ## Purpose
//!
//! - **confirmation**: receipt waiting with confirmation counting and reorg
//!   detection
//! - **txm**: at-most-one pending transaction per ritual phase, outcome
//!   handling, resubmission and persistence
//! - **operator**: `perform_round_1` / `perform_round_2` entry points and the
//!   notification pump
//! - **config**: TOML configuration for all of the above
//!
//! ## Architecture Constraints
//!
//! This crate depends on:
//! - **ritual-core**: types, readiness predicates and effect traits
//! - **ritual-effects**: production handlers (cancellation, storage)
//! - **MUST NOT**: Talk to a chain or clock directly (use the effect traits)

pub mod config;
pub mod confirmation;
pub mod operator;
pub mod txm;

pub use config::{AgentConfig, ConfirmationConfig, LoggingConfig, NodeConfig, StorageConfig};
pub use confirmation::ConfirmationEngine;
pub use operator::{OperatorDeps, RitualOperator};
pub use txm::{
    EventDisposition, FinalityTracker, MemoryPendingActionStore, PendingActionStore, PhaseAction,
    StoragePendingActionStore, Submission, Tracking, TransactionManager,
};
