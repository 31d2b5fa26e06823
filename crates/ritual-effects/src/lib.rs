#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Ritual Effects (Layer 3) - Production Handlers
//!
//! Stateless implementations of the `ritual-core` effect traits that delegate
//! to the operating system and the tokio runtime. Simulated handlers for tests
//! live in `ritual-testkit`.

pub mod cancellation;
pub mod logging;
pub mod storage;
pub mod time;

pub use cancellation::WatchCancellation;
pub use logging::init_tracing;
pub use storage::FilesystemStorageHandler;
pub use time::RealTimeHandler;
