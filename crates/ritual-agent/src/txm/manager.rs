//! Transaction Lifecycle Manager
//!
//! Keeps at most one in-flight submission per `(ritual_id, phase)` and decides,
//! for every outcome the submission layer reports, whether the attempt is
//! still alive, definitely dead (resubmit), or done.
//!
//! All state sits behind one async mutex. Submissions, outcome handling and
//! resubmissions run with the lock held, so an old attempt is always cleared
//! before its replacement is installed.

use super::store::PendingActionStore;
use async_lock::Mutex;
use async_trait::async_trait;
use ritual_core::{
    PendingAction, PendingActionRecord, PhaseKey, Result, RitualError, RitualId, TxEvent,
    TxHandle, TxId, TxNotification, TxOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builds and broadcasts the transaction for one phase key.
///
/// `build` re-reads ledger state and returns `Ok(None)` when the phase no
/// longer calls for this node to act. It runs for the first submission and
/// for every resubmission.
#[async_trait]
pub trait PhaseAction: Send + Sync {
    /// Key the action submits under.
    fn key(&self) -> PhaseKey;

    /// Check readiness on fresh state and broadcast if ready.
    async fn build(&self) -> Result<Option<TxHandle>>;
}

/// Result of [`TransactionManager::submit_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new transaction was broadcast
    Submitted(TxHandle),
    /// An earlier attempt is still pending or broadcast
    InFlight(TxHandle),
    /// The phase already finalized successfully for this node
    Completed,
    /// Fresh state says the node should not act
    NotReady,
}

/// What the manager did with a delivered outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    /// Outcome recorded, nothing else to do
    Recorded,
    /// Broadcast recorded; the handle now carries a hash worth tracking
    Track(TxHandle),
    /// Attempt cleared; the replacement, if one was built
    Resubmitted(Option<TxHandle>),
    /// Phase finished for this node
    Completed,
    /// Unknown or superseded attempt
    Ignored,
}

#[derive(Default)]
struct ManagerState {
    actions: HashMap<PhaseKey, PendingAction>,
    keys_by_tx: HashMap<TxId, PhaseKey>,
    builders: HashMap<PhaseKey, Arc<dyn PhaseAction>>,
    attempts: HashMap<PhaseKey, u32>,
    completed: HashSet<PhaseKey>,
}

impl ManagerState {
    fn clear(&mut self, key: &PhaseKey) -> Option<PendingAction> {
        let action = self.actions.remove(key)?;
        self.keys_by_tx.remove(&action.handle.tx_id);
        Some(action)
    }

    fn install(&mut self, action: PendingAction, builder: Arc<dyn PhaseAction>) {
        let key = action.key();
        self.keys_by_tx.insert(action.handle.tx_id, key);
        self.actions.insert(key, action);
        self.builders.insert(key, builder);
    }
}

/// Owner of every pending action of one node.
pub struct TransactionManager {
    store: Arc<dyn PendingActionStore>,
    state: Mutex<ManagerState>,
}

impl TransactionManager {
    /// Manager persisting through `store`.
    pub fn new(store: Arc<dyn PendingActionStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Reload persisted records after a restart.
    ///
    /// Broadcast attempts come back as in-flight and are returned so their
    /// finality can be tracked again. Completed phases stay completed.
    /// Attempts that never reached the pending pool, or had already failed,
    /// are dropped so the next orchestrator call may submit afresh.
    pub async fn restore(&self) -> Result<Vec<TxHandle>> {
        let records = self.store.load_all().await?;
        let mut state = self.state.lock().await;
        let mut to_track = Vec::new();

        for record in records {
            let key = record.key;
            match (record.outcome, record.tx_hash) {
                (TxOutcome::FinalizedOk, _) => {
                    state.completed.insert(key);
                }
                (TxOutcome::Broadcast, Some(_)) => {
                    let action = record.into_action();
                    state.attempts.insert(key, action.attempt);
                    state.keys_by_tx.insert(action.handle.tx_id, key);
                    to_track.push(action.handle.clone());
                    state.actions.insert(key, action);
                }
                (outcome, _) => {
                    debug!(%key, ?outcome, "dropping stale pending record");
                    if let Err(e) = self.store.remove(&key).await {
                        warn!(%key, error = %e, "failed to drop stale pending record");
                    }
                }
            }
        }

        info!(
            in_flight = to_track.len(),
            completed = state.completed.len(),
            "restored pending actions"
        );
        Ok(to_track)
    }

    /// Submit `action` unless its key already has an attempt in flight.
    ///
    /// Errors from building the action are returned as-is and leave no
    /// pending action behind.
    pub async fn submit_if_needed(&self, action: Arc<dyn PhaseAction>) -> Result<Submission> {
        let mut state = self.state.lock().await;
        self.submit_locked(&mut state, action).await
    }

    /// Apply one outcome reported by the submission layer.
    ///
    /// Never fails. The outcome is always applied in memory; a record that
    /// cannot be persisted is logged and left for the next write. Any other
    /// failure while handling the outcome is treated as a fault.
    pub async fn handle_notification(&self, notification: TxNotification) -> EventDisposition {
        let TxNotification { tx_id, event } = notification;
        let mut state = self.state.lock().await;

        let Some(key) = state.keys_by_tx.get(&tx_id).copied() else {
            debug!(%tx_id, event = event.label(), "outcome for unknown attempt ignored");
            return EventDisposition::Ignored;
        };

        self.apply_event(&mut state, key, &event).await
    }

    /// Drop everything held for `ritual_id` once it can no longer change.
    ///
    /// Late outcomes for its attempts are ignored afterwards.
    pub async fn forget_ritual(&self, ritual_id: RitualId) {
        let mut state = self.state.lock().await;
        for key in [PhaseKey::round1(ritual_id), PhaseKey::round2(ritual_id)] {
            let dropped = state.clear(&key);
            state.builders.remove(&key);
            state.attempts.remove(&key);
            let was_completed = state.completed.remove(&key);
            if dropped.is_none() && !was_completed {
                continue;
            }
            debug!(%key, "forgetting settled ritual phase");
            if let Err(e) = self.store.remove(&key).await {
                warn!(%key, error = %e, "failed to drop pending record");
            }
        }
    }

    /// Current pending action for `key`.
    pub async fn pending(&self, key: &PhaseKey) -> Option<PendingAction> {
        self.state.lock().await.actions.get(key).cloned()
    }

    /// Handle of the in-flight attempt for `key`, if any.
    pub async fn in_flight(&self, key: &PhaseKey) -> Option<TxHandle> {
        self.state
            .lock()
            .await
            .actions
            .get(key)
            .filter(|a| a.outcome.is_in_flight())
            .map(|a| a.handle.clone())
    }

    /// Whether `key` finalized successfully.
    pub async fn is_completed(&self, key: &PhaseKey) -> bool {
        self.state.lock().await.completed.contains(key)
    }

    /// Number of keys with a recorded attempt.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.actions.len()
    }

    async fn apply_event(
        &self,
        state: &mut ManagerState,
        key: PhaseKey,
        event: &TxEvent,
    ) -> EventDisposition {
        match event {
            TxEvent::Broadcast { tx_hash } => {
                let Some(action) = state.actions.get_mut(&key) else {
                    return self.handling_failed(state, key).await;
                };
                action.handle.tx_hash = Some(*tx_hash);
                action.outcome = TxOutcome::Broadcast;
                let (record, handle) = (action.record(), action.handle.clone());
                debug!(%key, %tx_hash, "transaction broadcast");
                self.persist(&record).await;
                EventDisposition::Track(handle)
            }
            TxEvent::InsufficientFunds => {
                let Some(action) = state.actions.get_mut(&key) else {
                    return self.handling_failed(state, key).await;
                };
                action.outcome = TxOutcome::InsufficientFunds;
                let record = action.record();
                warn!(%key, "insufficient funds to submit transaction; top up the operator account");
                self.persist(&record).await;
                EventDisposition::Recorded
            }
            TxEvent::BroadcastFailure { reason } | TxEvent::Fault { reason } => {
                warn!(%key, event = event.label(), %reason, "transaction dead; resubmitting");
                self.resubmit_locked(state, key).await
            }
            TxEvent::Finalized { success: true } => {
                let Some(mut action) = state.clear(&key) else {
                    return self.handling_failed(state, key).await;
                };
                state.builders.remove(&key);
                state.completed.insert(key);
                action.outcome = TxOutcome::FinalizedOk;
                info!(%key, attempt = action.attempt, "phase finalized");
                self.persist(&action.record()).await;
                EventDisposition::Completed
            }
            TxEvent::Finalized { success: false } => {
                warn!(%key, "transaction reverted; resubmitting");
                self.resubmit_locked(state, key).await
            }
        }
    }

    async fn handling_failed(&self, state: &mut ManagerState, key: PhaseKey) -> EventDisposition {
        error!(%key, "attempt indexed without a pending action; treating as fault");
        self.resubmit_locked(state, key).await
    }

    /// Persistence trails the in-memory state; a failed write never changes
    /// what happens to the attempt.
    async fn persist(&self, record: &PendingActionRecord) {
        if let Err(e) = self.store.put(record).await {
            error!(key = %record.key, outcome = ?record.outcome, error = %e, "failed to persist pending action");
        }
    }

    async fn resubmit_locked(&self, state: &mut ManagerState, key: PhaseKey) -> EventDisposition {
        state.clear(&key);
        if let Err(e) = self.store.remove(&key).await {
            warn!(%key, error = %e, "failed to clear pending record");
        }

        let Some(builder) = state.builders.get(&key).cloned() else {
            info!(%key, "no builder for restored action; next round call will resubmit");
            return EventDisposition::Resubmitted(None);
        };

        match self.submit_locked(state, builder).await {
            Ok(Submission::Submitted(handle)) => EventDisposition::Resubmitted(Some(handle)),
            Ok(other) => {
                debug!(%key, ?other, "resubmission not needed");
                EventDisposition::Resubmitted(None)
            }
            Err(e) => {
                error!(%key, error = %e, "resubmission failed");
                EventDisposition::Resubmitted(None)
            }
        }
    }

    async fn submit_locked(
        &self,
        state: &mut ManagerState,
        action: Arc<dyn PhaseAction>,
    ) -> Result<Submission> {
        let key = action.key();

        if let Some(existing) = state.actions.get(&key) {
            if existing.outcome.is_in_flight() {
                debug!(%key, tx_id = %existing.handle.tx_id, "attempt already in flight");
                return Ok(Submission::InFlight(existing.handle.clone()));
            }
        }
        if state.completed.contains(&key) {
            debug!(%key, "phase already completed");
            return Ok(Submission::Completed);
        }

        if let Some(stale) = state.clear(&key) {
            debug!(%key, outcome = ?stale.outcome, "replacing settled attempt");
            if let Err(e) = self.store.remove(&key).await {
                warn!(%key, error = %e, "failed to clear pending record");
            }
        }

        let Some(handle) = action.build().await? else {
            return Ok(Submission::NotReady);
        };
        if handle.key != key {
            return Err(RitualError::internal(format!(
                "action for {key} returned a handle for {}",
                handle.key
            )));
        }

        let attempt = {
            let counter = state.attempts.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };
        let pending = PendingAction::new(handle.clone(), attempt);
        self.persist(&pending.record()).await;
        info!(%key, tx_id = %handle.tx_id, attempt, "submitted transaction");
        state.install(pending, action);

        Ok(Submission::Submitted(handle))
    }
}
