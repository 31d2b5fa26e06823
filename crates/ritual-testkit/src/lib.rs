#![allow(clippy::unwrap_used, clippy::expect_used)]
//! # Ritual Testkit (Layer 8)
//!
//! Simulated effect handlers for deterministic tests of the ritual engine:
//!
//! - [`MockChain`]: in-memory ledger implementing chain reads and, through
//!   [`MockChainWriter`], per-node transaction submission
//! - [`ControllableTimeSource`]: clock whose sleeps advance virtual time
//! - [`MemoryStorageHandler`]: `StorageEffects` over a hash map
//! - [`MockDkgCrypto`]: deterministic stand-in for transcript cryptography

pub mod chain;
pub mod crypto;
pub mod fixtures;
pub mod storage;
pub mod time;

pub use chain::{MockChain, MockChainWriter};
pub use crypto::MockDkgCrypto;
pub use fixtures::{cohort, provider};
pub use storage::MemoryStorageHandler;
pub use time::ControllableTimeSource;
