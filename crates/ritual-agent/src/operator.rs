//! Ritual Orchestrator
//!
//! Per-node entry points that read a fresh ledger snapshot, evaluate the
//! phase readiness predicates and hand the resulting transaction to the
//! [`TransactionManager`]. Both rounds are safe to call repeatedly and
//! concurrently with outcome delivery.

use crate::config::ConfirmationConfig;
use crate::confirmation::ConfirmationEngine;
use crate::txm::{
    EventDisposition, FinalityTracker, PendingActionStore, PhaseAction, Submission, Tracking,
    TransactionManager,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use ritual_core::effects::{
    ChainReadEffects, ChainWriteEffects, DkgCryptoEffects, PhysicalTimeEffects,
};
use ritual_core::{
    Address, Phase1Snapshot, Phase2Snapshot, PhaseKey, Result, RitualId, TxHandle, TxNotification,
};
use ritual_effects::WatchCancellation;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Capabilities one node's operator is built from.
pub struct OperatorDeps {
    /// Address this node participates as
    pub node: Address,
    /// Ledger reads
    pub reader: Arc<dyn ChainReadEffects>,
    /// Submission layer, signing as `node`
    pub writer: Arc<dyn ChainWriteEffects>,
    /// Transcript generation and aggregation
    pub crypto: Arc<dyn DkgCryptoEffects>,
    /// Clock for confirmation waits
    pub time: Arc<dyn PhysicalTimeEffects>,
    /// Persistence for pending actions
    pub store: Arc<dyn PendingActionStore>,
}

#[derive(Clone)]
struct Ledger {
    node: Address,
    reader: Arc<dyn ChainReadEffects>,
    writer: Arc<dyn ChainWriteEffects>,
    crypto: Arc<dyn DkgCryptoEffects>,
}

struct Round1Action {
    ledger: Ledger,
    ritual_id: RitualId,
    participants: Vec<Address>,
}

#[async_trait]
impl PhaseAction for Round1Action {
    fn key(&self) -> PhaseKey {
        PhaseKey::round1(self.ritual_id)
    }

    async fn build(&self) -> Result<Option<TxHandle>> {
        let Ledger {
            node,
            reader,
            writer,
            crypto,
        } = &self.ledger;
        let ritual = reader.get_ritual(self.ritual_id).await?;
        let status = reader.get_ritual_status(self.ritual_id).await?;
        let snapshot = Phase1Snapshot::new(ritual, status);
        if !snapshot.ready(&self.participants, node)? {
            return Ok(None);
        }

        let transcript = crypto.generate_transcript(&snapshot.ritual, node).await?;
        let handle = writer.submit_transcript(self.ritual_id, transcript).await?;
        Ok(Some(handle))
    }
}

struct Round2Action {
    ledger: Ledger,
    ritual_id: RitualId,
}

#[async_trait]
impl PhaseAction for Round2Action {
    fn key(&self) -> PhaseKey {
        PhaseKey::round2(self.ritual_id)
    }

    async fn build(&self) -> Result<Option<TxHandle>> {
        let Ledger {
            node,
            reader,
            writer,
            crypto,
        } = &self.ledger;
        let ritual = reader.get_ritual(self.ritual_id).await?;
        let status = reader.get_ritual_status(self.ritual_id).await?;
        let snapshot = Phase2Snapshot::new(ritual, status);
        if !snapshot.ready(node) {
            return Ok(None);
        }

        let transcripts = snapshot.ritual.transcripts();
        let aggregation = crypto
            .aggregate_transcripts(&snapshot.ritual, &transcripts)
            .await?;
        let handle = writer
            .submit_aggregation(self.ritual_id, aggregation)
            .await?;
        Ok(Some(handle))
    }
}

/// Drives one node's participation in any number of rituals.
pub struct RitualOperator {
    ledger: Ledger,
    txm: TransactionManager,
    finality: Arc<FinalityTracker>,
    halted: Mutex<HashSet<RitualId>>,
    cancellations: Mutex<HashMap<RitualId, WatchCancellation>>,
    notifier: Option<UnboundedSender<TxNotification>>,
}

impl RitualOperator {
    /// Operator over `deps`, confirming transactions per `confirmation`.
    pub fn new(deps: OperatorDeps, confirmation: &ConfirmationConfig) -> Self {
        let OperatorDeps {
            node,
            reader,
            writer,
            crypto,
            time,
            store,
        } = deps;
        let engine = Arc::new(ConfirmationEngine::new(
            reader.clone(),
            time,
            confirmation.clone(),
        ));
        Self {
            ledger: Ledger {
                node,
                reader,
                writer,
                crypto,
            },
            txm: TransactionManager::new(store),
            finality: Arc::new(FinalityTracker::from_engine(engine)),
            halted: Mutex::new(HashSet::new()),
            cancellations: Mutex::new(HashMap::new()),
            notifier: None,
        }
    }

    /// Send outcomes of background finality tracking to `notifier`.
    ///
    /// Without a notifier, broadcast attempts are only tracked through
    /// [`Self::track`].
    pub fn with_notifier(mut self, notifier: UnboundedSender<TxNotification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Address this operator acts for.
    pub fn node(&self) -> Address {
        self.ledger.node
    }

    /// Pending-action bookkeeping.
    pub fn transactions(&self) -> &TransactionManager {
        &self.txm
    }

    /// Reload persisted pending actions and resume tracking broadcast ones.
    pub async fn start(&self) -> Result<Vec<TxHandle>> {
        let handles = self.txm.restore().await?;
        for handle in &handles {
            self.spawn_tracking(handle.clone());
        }
        Ok(handles)
    }

    /// Post this node's transcript for `ritual_id` if the ledger calls for it.
    ///
    /// `authority` and `timestamp` come with the triggering event and are
    /// only recorded for diagnostics. Returns `None` when nothing was
    /// submitted, including when an earlier attempt is still in flight.
    /// A participant list that disagrees with the ledger halts this node's
    /// participation in the ritual and is returned as an error.
    #[tracing::instrument(skip(self, participants), fields(node = %self.ledger.node))]
    pub async fn perform_round_1(
        &self,
        ritual_id: RitualId,
        authority: Address,
        participants: &[Address],
        timestamp: u64,
    ) -> Result<Option<TxHandle>> {
        if !self.should_act(ritual_id).await {
            return Ok(None);
        }
        let action = Arc::new(Round1Action {
            ledger: self.ledger.clone(),
            ritual_id,
            participants: participants.to_vec(),
        });
        self.submit(action).await
    }

    /// Post this node's aggregation for `ritual_id` if the ledger calls for it.
    #[tracing::instrument(skip(self), fields(node = %self.ledger.node))]
    pub async fn perform_round_2(
        &self,
        ritual_id: RitualId,
        timestamp: u64,
    ) -> Result<Option<TxHandle>> {
        if !self.should_act(ritual_id).await {
            return Ok(None);
        }
        let action = Arc::new(Round2Action {
            ledger: self.ledger.clone(),
            ritual_id,
        });
        self.submit(action).await
    }

    /// Apply an outcome from the submission layer or a finality tracker.
    pub async fn handle_notification(&self, notification: TxNotification) -> EventDisposition {
        let disposition = self.txm.handle_notification(notification).await;
        if let EventDisposition::Track(handle) = &disposition {
            self.spawn_tracking(handle.clone());
        }
        disposition
    }

    /// One bounded wait for a broadcast attempt to settle.
    ///
    /// Returns `None` when the attempt did not settle: its ritual reached a
    /// terminal status, or no deep-enough receipt appeared within the
    /// receipt budget. In the latter case the attempt stays broadcast and
    /// may be tracked again.
    pub async fn track(&self, handle: &TxHandle) -> Option<TxNotification> {
        let ritual_id = handle.key.ritual_id;
        if !self.ritual_is_live(ritual_id).await {
            return None;
        }
        let token = self.token_for(ritual_id);
        self.finality.track(handle, &token).await.into_notification()
    }

    /// Apply every notification from `events` until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: UnboundedReceiver<TxNotification>) {
        info!(node = %self.ledger.node, "ritual operator running");
        while let Some(notification) = events.recv().await {
            self.handle_notification(notification).await;
        }
        info!(node = %self.ledger.node, "notification channel closed; operator stopping");
    }

    /// Whether participation in `ritual_id` was halted by a fatal error.
    pub fn is_halted(&self, ritual_id: RitualId) -> bool {
        self.halted.lock().contains(&ritual_id)
    }

    async fn should_act(&self, ritual_id: RitualId) -> bool {
        if !self.ritual_is_live(ritual_id).await {
            return false;
        }
        if self.is_halted(ritual_id) {
            warn!(%ritual_id, "participation halted; ignoring request");
            return false;
        }
        true
    }

    /// Read the ritual's status, releasing everything held for it once it
    /// is terminal.
    async fn ritual_is_live(&self, ritual_id: RitualId) -> bool {
        let status = match self.ledger.reader.get_ritual_status(ritual_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(%ritual_id, error = %e, "could not read ritual status");
                return false;
            }
        };
        if status.is_terminal() {
            debug!(%ritual_id, ?status, finalized = status.is_finalized(), "ritual is terminal");
            self.release(ritual_id).await;
            return false;
        }
        true
    }

    async fn release(&self, ritual_id: RitualId) {
        // Waiters hold their own clone of the token, so firing it before
        // removal still reaches them.
        if let Some(token) = self.cancellations.lock().remove(&ritual_id) {
            token.cancel();
        }
        self.halted.lock().remove(&ritual_id);
        self.txm.forget_ritual(ritual_id).await;
    }

    async fn submit(&self, action: Arc<dyn PhaseAction>) -> Result<Option<TxHandle>> {
        let key = action.key();
        match self.txm.submit_if_needed(action).await {
            Ok(Submission::Submitted(handle)) => Ok(Some(handle)),
            Ok(Submission::InFlight(_) | Submission::Completed | Submission::NotReady) => Ok(None),
            Err(e) if e.is_fatal() => {
                error!(%key, error = %e, "halting participation in ritual");
                self.halted.lock().insert(key.ritual_id);
                self.token_for(key.ritual_id).cancel();
                Err(e)
            }
            Err(e) => {
                warn!(%key, error = %e, "could not act on ritual; will retry on next call");
                Ok(None)
            }
        }
    }

    fn token_for(&self, ritual_id: RitualId) -> WatchCancellation {
        self.cancellations
            .lock()
            .entry(ritual_id)
            .or_default()
            .clone()
    }

    fn spawn_tracking(&self, handle: TxHandle) {
        let Some(notifier) = self.notifier.clone() else {
            debug!(key = %handle.key, "no notifier; finality must be tracked by the caller");
            return;
        };
        let finality = self.finality.clone();
        let reader = self.ledger.reader.clone();
        let token = self.token_for(handle.key.ritual_id);
        tokio::spawn(async move {
            loop {
                match finality.track(&handle, &token).await {
                    Tracking::Settled(notification) => {
                        if notifier.send(notification).is_err() {
                            debug!(key = %handle.key, "operator gone; dropping finality outcome");
                        }
                        return;
                    }
                    Tracking::Abandoned => return,
                    Tracking::Unconfirmed => {}
                }
                // Stop once the ritual no longer needs the attempt, even if
                // no orchestrator call has noticed yet.
                match reader.get_ritual_status(handle.key.ritual_id).await {
                    Ok(status) if status.is_terminal() => {
                        debug!(key = %handle.key, ?status, "ritual is terminal; stopping finality tracking");
                        return;
                    }
                    Ok(_) => debug!(key = %handle.key, "tracking unconfirmed attempt again"),
                    Err(e) => warn!(key = %handle.key, error = %e, "could not read ritual status; tracking again"),
                }
                if notifier.is_closed() {
                    return;
                }
            }
        });
    }
}
