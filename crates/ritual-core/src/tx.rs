//! Transaction handles, outcome events and pending-action bookkeeping.
//!
//! The submission layer reports exactly five kinds of outcome for a
//! transaction. They are modelled as the closed enum [`TxEvent`] so every
//! consumer has to say what each one means.

use crate::phase::PhaseKey;
use crate::types::{TxHash, TxId};
use serde::{Deserialize, Serialize};

/// Handle to one asynchronous submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHandle {
    /// Local identity of this attempt
    pub tx_id: TxId,
    /// Ritual phase the transaction performs
    pub key: PhaseKey,
    /// Ledger hash, known once broadcast
    pub tx_hash: Option<TxHash>,
}

impl TxHandle {
    /// Handle for an attempt that has not been broadcast yet.
    pub fn new(tx_id: TxId, key: PhaseKey) -> Self {
        Self {
            tx_id,
            key,
            tx_hash: None,
        }
    }
}

/// Outcome reported by the submission layer for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxEvent {
    /// Entered the ledger's pending pool
    Broadcast {
        /// Hash the transaction was broadcast under
        tx_hash: TxHash,
    },
    /// Rejected or dropped before inclusion
    BroadcastFailure {
        /// Reason reported by the network
        reason: String,
    },
    /// The signing account cannot pay for the transaction
    InsufficientFunds,
    /// Terminal fault inside the submission layer
    Fault {
        /// Reason reported by the submission layer
        reason: String,
    },
    /// Included on-chain; `success` is false for a revert
    Finalized {
        /// Whether execution succeeded
        success: bool,
    },
}

impl TxEvent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Broadcast { .. } => "broadcast",
            Self::BroadcastFailure { .. } => "broadcast_failure",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Fault { .. } => "fault",
            Self::Finalized { success: true } => "finalized_ok",
            Self::Finalized { success: false } => "finalized_failed",
        }
    }

    /// Outcome recorded for the pending action after this event.
    pub fn outcome(&self) -> TxOutcome {
        match self {
            Self::Broadcast { .. } => TxOutcome::Broadcast,
            Self::BroadcastFailure { .. } | Self::Fault { .. } => TxOutcome::Fault,
            Self::InsufficientFunds => TxOutcome::InsufficientFunds,
            Self::Finalized { success: true } => TxOutcome::FinalizedOk,
            Self::Finalized { success: false } => TxOutcome::FinalizedFailed,
        }
    }
}

/// Notification delivered by the submission layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxNotification {
    /// Attempt the event refers to
    pub tx_id: TxId,
    /// What happened
    pub event: TxEvent,
}

impl TxNotification {
    /// Pair an event with the attempt it belongs to.
    pub fn new(tx_id: TxId, event: TxEvent) -> Self {
        Self { tx_id, event }
    }
}

/// Last known state of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    /// Handed to the submission layer, nothing observed yet
    Pending,
    /// Seen in the pending pool
    Broadcast,
    /// Dropped or faulted
    Fault,
    /// Waiting for the operator to fund the account
    InsufficientFunds,
    /// Included and succeeded
    FinalizedOk,
    /// Included and reverted
    FinalizedFailed,
}

impl TxOutcome {
    /// Outcomes that may still resolve on their own.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Broadcast)
    }
}

/// In-flight submission for one [`PhaseKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Handle of the current attempt
    pub handle: TxHandle,
    /// Last observed outcome
    pub outcome: TxOutcome,
    /// 1-based attempt counter for this key
    pub attempt: u32,
}

impl PendingAction {
    /// Freshly submitted attempt.
    pub fn new(handle: TxHandle, attempt: u32) -> Self {
        Self {
            handle,
            outcome: TxOutcome::Pending,
            attempt,
        }
    }

    /// Key this action is stored under.
    pub fn key(&self) -> PhaseKey {
        self.handle.key
    }

    /// Persistable form of this action.
    pub fn record(&self) -> PendingActionRecord {
        PendingActionRecord {
            key: self.handle.key,
            tx_id: self.handle.tx_id,
            tx_hash: self.handle.tx_hash,
            outcome: self.outcome,
            attempt: self.attempt,
        }
    }
}

/// Durable form of a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingActionRecord {
    /// Ritual phase
    pub key: PhaseKey,
    /// Attempt id
    pub tx_id: TxId,
    /// Ledger hash if broadcast
    pub tx_hash: Option<TxHash>,
    /// Last observed outcome
    pub outcome: TxOutcome,
    /// Attempt counter
    pub attempt: u32,
}

impl PendingActionRecord {
    /// Rebuild the in-memory action from a stored record.
    pub fn into_action(self) -> PendingAction {
        PendingAction {
            handle: TxHandle {
                tx_id: self.tx_id,
                key: self.key,
                tx_hash: self.tx_hash,
            },
            outcome: self.outcome,
            attempt: self.attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RitualId;

    #[test]
    fn only_pending_and_broadcast_are_in_flight() {
        assert!(TxOutcome::Pending.is_in_flight());
        assert!(TxOutcome::Broadcast.is_in_flight());
        assert!(!TxOutcome::Fault.is_in_flight());
        assert!(!TxOutcome::InsufficientFunds.is_in_flight());
        assert!(!TxOutcome::FinalizedOk.is_in_flight());
        assert!(!TxOutcome::FinalizedFailed.is_in_flight());
    }

    #[test]
    fn events_map_to_outcomes() {
        let hash = TxHash([4; 32]);
        assert_eq!(TxEvent::Broadcast { tx_hash: hash }.outcome(), TxOutcome::Broadcast);
        assert_eq!(
            TxEvent::BroadcastFailure { reason: "dropped".into() }.outcome(),
            TxOutcome::Fault
        );
        assert_eq!(TxEvent::InsufficientFunds.outcome(), TxOutcome::InsufficientFunds);
        assert_eq!(TxEvent::Finalized { success: false }.outcome(), TxOutcome::FinalizedFailed);
        assert_eq!(TxEvent::Finalized { success: true }.label(), "finalized_ok");
    }

    #[test]
    fn record_round_trips_the_handle() {
        let mut action = PendingAction::new(
            TxHandle::new(TxId::from_u128(5), PhaseKey::round1(RitualId(2))),
            3,
        );
        action.handle.tx_hash = Some(TxHash([1; 32]));
        action.outcome = TxOutcome::Broadcast;
        assert_eq!(action.record().into_action(), action);
    }
}
