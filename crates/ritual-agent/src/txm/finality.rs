//! Finality tracking for broadcast attempts.
//!
//! Turns a broadcast handle into the terminal outcome the manager needs.
//! Only a receipt settles an attempt. A wait that runs out of budget or
//! keeps failing against the chain proves nothing about the transaction,
//! so the attempt stays broadcast and is tracked again.

use crate::confirmation::ConfirmationEngine;
use ritual_core::effects::CancellationToken;
use ritual_core::{RitualError, TxEvent, TxHandle, TxNotification};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How one finality wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracking {
    /// The attempt settled; deliver this outcome to the manager
    Settled(TxNotification),
    /// No deep-enough receipt within the budget; the attempt is still broadcast
    Unconfirmed,
    /// Nothing to wait for: no hash yet, or the wait was cancelled
    Abandoned,
}

impl Tracking {
    /// Outcome to deliver, if the attempt settled.
    pub fn into_notification(self) -> Option<TxNotification> {
        match self {
            Tracking::Settled(notification) => Some(notification),
            Tracking::Unconfirmed | Tracking::Abandoned => None,
        }
    }
}

/// Waits on the confirmation engine for one attempt at a time.
pub struct FinalityTracker {
    engine: Arc<ConfirmationEngine>,
    confirmations: u64,
    receipt_timeout: Duration,
}

impl FinalityTracker {
    /// Tracker requiring `confirmations` blocks of depth.
    pub fn new(engine: Arc<ConfirmationEngine>, confirmations: u64, receipt_timeout: Duration) -> Self {
        Self {
            engine,
            confirmations,
            receipt_timeout,
        }
    }

    /// Tracker using the engine's configured depth and receipt budget.
    pub fn from_engine(engine: Arc<ConfirmationEngine>) -> Self {
        let confirmations = engine.config().confirmations;
        let receipt_timeout = engine.config().receipt_timeout();
        Self::new(engine, confirmations, receipt_timeout)
    }

    /// One bounded wait for `handle` to settle.
    pub async fn track(&self, handle: &TxHandle, cancel: &dyn CancellationToken) -> Tracking {
        let Some(tx_hash) = handle.tx_hash else {
            return Tracking::Abandoned;
        };
        let result = self
            .engine
            .wait_for_receipt_cancellable(&tx_hash, self.receipt_timeout, self.confirmations, cancel)
            .await;

        match result {
            Ok(receipt) => {
                debug!(key = %handle.key, %tx_hash, success = receipt.success, "attempt settled");
                Tracking::Settled(TxNotification::new(
                    handle.tx_id,
                    TxEvent::Finalized {
                        success: receipt.success,
                    },
                ))
            }
            Err(RitualError::Cancelled { .. }) => {
                debug!(key = %handle.key, %tx_hash, "finality tracking cancelled");
                Tracking::Abandoned
            }
            Err(e) => {
                warn!(key = %handle.key, %tx_hash, error = %e, "attempt not confirmed yet; still broadcast");
                Tracking::Unconfirmed
            }
        }
    }
}
