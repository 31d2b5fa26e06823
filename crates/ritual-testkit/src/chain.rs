//! In-memory ledger for deterministic tests.
//!
//! `MockChain` keeps rituals, blocks and receipts behind one lock and applies
//! the coordinator's transcript and aggregation rules when a queued
//! transaction is included. Tests drive inclusion, broadcasts and reorgs
//! explicitly.

use async_trait::async_trait;
use parking_lot::Mutex;
use ritual_core::effects::{AggregationOutput, ChainReadEffects, ChainWriteEffects};
use ritual_core::{
    Address, BlockHash, BlockHeight, DkgPhase, Participant, PhaseKey, Receipt, Result, Ritual,
    RitualError, RitualId, RitualStatus, TxEvent, TxHandle, TxHash, TxId, TxNotification,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
enum ChainCall {
    PostTranscript {
        ritual_id: RitualId,
        transcript: Vec<u8>,
    },
    PostAggregation {
        ritual_id: RitualId,
        aggregation: AggregationOutput,
    },
}

#[derive(Debug, Clone)]
struct QueuedTx {
    tx_hash: TxHash,
    sender: Address,
    call: ChainCall,
}

#[derive(Debug, Default)]
struct ChainState {
    now_secs: u64,
    height: BlockHeight,
    fork: u64,
    next_ritual_id: u32,
    next_tx: u128,
    rituals: BTreeMap<RitualId, Ritual>,
    queued: HashMap<TxId, QueuedTx>,
    receipts: HashMap<TxHash, Receipt>,
    submissions: HashMap<PhaseKey, usize>,
    auto_mine: bool,
    height_queries: usize,
    fail_next_submit: Option<RitualError>,
}

impl ChainState {
    fn block_hash(&self, height: BlockHeight) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update(b"MOCK_BLOCK");
        hasher.update(self.fork.to_be_bytes());
        hasher.update(height.to_be_bytes());
        BlockHash(hasher.finalize().into())
    }

    fn mine(&mut self) -> BlockHeight {
        self.height += 1;
        self.height
    }

    fn ritual_mut(&mut self, ritual_id: RitualId) -> Result<&mut Ritual> {
        self.rituals
            .get_mut(&ritual_id)
            .ok_or_else(|| RitualError::not_found(format!("ritual {ritual_id}")))
    }

    /// Apply a call; `Ok(false)` is a revert.
    fn execute(&mut self, sender: Address, call: ChainCall) -> Result<bool> {
        let now = self.now_secs;
        match call {
            ChainCall::PostTranscript {
                ritual_id,
                transcript,
            } => {
                let ritual = self.ritual_mut(ritual_id)?;
                if ritual.status_at(now)? != RitualStatus::DkgAwaitingTranscripts {
                    return Ok(false);
                }
                let Some(participant) = ritual.participant_mut(&sender) else {
                    return Ok(false);
                };
                if participant.has_transcript() {
                    return Ok(false);
                }
                participant.transcript = transcript;
                ritual.total_transcripts += 1;
                Ok(true)
            }
            ChainCall::PostAggregation {
                ritual_id,
                aggregation,
            } => {
                let ritual = self.ritual_mut(ritual_id)?;
                if ritual.status_at(now)? != RitualStatus::DkgAwaitingAggregations {
                    return Ok(false);
                }
                match ritual.participant(&sender) {
                    Some(participant) if !participant.aggregated => {}
                    _ => return Ok(false),
                }

                if ritual.aggregated_transcript.is_empty() {
                    ritual.aggregated_transcript = aggregation.aggregated_transcript.clone();
                } else if ritual.aggregated_transcript != aggregation.aggregated_transcript {
                    ritual.aggregation_mismatch = true;
                    return Ok(true);
                }

                if let Some(participant) = ritual.participant_mut(&sender) {
                    participant.aggregated = true;
                    participant.decryption_request_static_key =
                        aggregation.decryption_request_static_key;
                }
                ritual.total_aggregations += 1;
                if ritual.total_aggregations == ritual.dkg_size {
                    ritual.public_key = Some(aggregation.public_key);
                }
                Ok(true)
            }
        }
    }
}

/// In-memory ledger implementing [`ChainReadEffects`].
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    /// Ledger at unix time `now_secs` and height 0.
    pub fn new(now_secs: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.state.lock().now_secs = now_secs;
        Arc::new(chain)
    }

    /// Submission handle bound to `provider`'s account.
    pub fn writer(self: &Arc<Self>, provider: Address) -> MockChainWriter {
        MockChainWriter {
            chain: Arc::clone(self),
            provider,
        }
    }

    /// Create a ritual; the DKG window lasts `duration_secs`.
    pub fn initiate_ritual(
        &self,
        authority: Address,
        providers: &[Address],
        threshold: u32,
        duration_secs: u64,
    ) -> RitualId {
        let mut state = self.state.lock();
        let id = RitualId(state.next_ritual_id);
        state.next_ritual_id += 1;
        let now = state.now_secs;
        let ritual = Ritual {
            id,
            initiator: authority,
            authority,
            access_controller: Address::default(),
            dkg_size: providers.len() as u32,
            threshold,
            init_timestamp: now,
            end_timestamp: now + duration_secs,
            expiry_timestamp: 0,
            total_transcripts: 0,
            total_aggregations: 0,
            public_key: None,
            aggregation_mismatch: false,
            aggregated_transcript: Vec::new(),
            participants: providers
                .iter()
                .enumerate()
                .map(|(i, p)| Participant::new(i as u32, *p))
                .collect(),
        };
        state.rituals.insert(id, ritual);
        id
    }

    /// Current copy of a ritual.
    pub fn ritual(&self, ritual_id: RitualId) -> Option<Ritual> {
        self.state.lock().rituals.get(&ritual_id).cloned()
    }

    /// Ledger status of a ritual at the chain's current time.
    pub fn status(&self, ritual_id: RitualId) -> Option<RitualStatus> {
        let state = self.state.lock();
        let now = state.now_secs;
        state
            .rituals
            .get(&ritual_id)
            .and_then(|r| r.status_at(now).ok())
    }

    /// Move ledger time forward.
    pub fn advance_time(&self, secs: u64) {
        self.state.lock().now_secs += secs;
    }

    /// Current chain height.
    pub fn height(&self) -> BlockHeight {
        self.state.lock().height
    }

    /// Mine `n` empty blocks, returning the new height.
    pub fn mine_blocks(&self, n: u64) -> BlockHeight {
        let mut state = self.state.lock();
        for _ in 0..n {
            state.mine();
        }
        state.height
    }

    /// Mine one block per height query.
    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.state.lock().auto_mine = auto_mine;
    }

    /// Number of `current_block_height` calls served.
    pub fn height_queries(&self) -> usize {
        self.state.lock().height_queries
    }

    /// Fail the next submission from any writer with `err`.
    pub fn fail_next_submit(&self, err: RitualError) {
        self.state.lock().fail_next_submit = Some(err);
    }

    /// Number of submissions accepted for `key` across all writers.
    pub fn submissions(&self, key: PhaseKey) -> usize {
        self.state.lock().submissions.get(&key).copied().unwrap_or(0)
    }

    /// Hash a queued or included attempt was assigned.
    pub fn tx_hash_of(&self, tx_id: TxId) -> Option<TxHash> {
        self.state.lock().queued.get(&tx_id).map(|q| q.tx_hash)
    }

    /// Broadcast notification for a queued attempt.
    pub fn broadcast(&self, tx_id: TxId) -> Option<TxNotification> {
        self.tx_hash_of(tx_id)
            .map(|tx_hash| TxNotification::new(tx_id, TxEvent::Broadcast { tx_hash }))
    }

    /// Include a queued attempt in a new block and apply its effects.
    pub fn include(&self, tx_id: TxId) -> Result<Receipt> {
        let mut state = self.state.lock();
        let queued = state
            .queued
            .remove(&tx_id)
            .ok_or_else(|| RitualError::not_found(format!("queued tx {tx_id}")))?;
        let success = state.execute(queued.sender, queued.call)?;
        let block_number = state.mine();
        let receipt = Receipt {
            tx_hash: queued.tx_hash,
            block_hash: state.block_hash(block_number),
            block_number,
            success,
        };
        debug!(%tx_id, block_number, success, "included mock transaction");
        state.receipts.insert(queued.tx_hash, receipt.clone());
        Ok(receipt)
    }

    /// Move an included transaction to another block, or forget it entirely.
    pub fn reorg(&self, tx_hash: &TxHash, new_block: Option<(BlockHash, BlockHeight)>) {
        let mut state = self.state.lock();
        state.fork += 1;
        match new_block {
            Some((block_hash, block_number)) => {
                if let Some(receipt) = state.receipts.get_mut(tx_hash) {
                    receipt.block_hash = block_hash;
                    receipt.block_number = block_number;
                }
            }
            None => {
                state.receipts.remove(tx_hash);
            }
        }
    }

    fn queue(&self, sender: Address, key: PhaseKey, call: ChainCall) -> Result<TxHandle> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }
        state.next_tx += 1;
        let tx_id = TxId::from_u128(state.next_tx);
        let mut hasher = Sha256::new();
        hasher.update(b"MOCK_TX");
        hasher.update(state.next_tx.to_be_bytes());
        let tx_hash = TxHash(hasher.finalize().into());
        state.queued.insert(
            tx_id,
            QueuedTx {
                tx_hash,
                sender,
                call,
            },
        );
        *state.submissions.entry(key).or_insert(0) += 1;
        Ok(TxHandle::new(tx_id, key))
    }
}

#[async_trait]
impl ChainReadEffects for MockChain {
    async fn get_ritual(&self, ritual_id: RitualId) -> Result<Ritual> {
        self.ritual(ritual_id)
            .ok_or_else(|| RitualError::not_found(format!("ritual {ritual_id}")))
    }

    async fn get_ritual_status(&self, ritual_id: RitualId) -> Result<RitualStatus> {
        let state = self.state.lock();
        match state.rituals.get(&ritual_id) {
            Some(ritual) => ritual.status_at(state.now_secs),
            None => Ok(RitualStatus::NonInitiated),
        }
    }

    async fn get_participant(
        &self,
        ritual_id: RitualId,
        provider: &Address,
    ) -> Result<Participant> {
        self.ritual(ritual_id)
            .and_then(|r| r.participant(provider).cloned())
            .ok_or_else(|| {
                RitualError::not_found(format!("participant {provider} in ritual {ritual_id}"))
            })
    }

    async fn current_block_height(&self) -> Result<BlockHeight> {
        let mut state = self.state.lock();
        state.height_queries += 1;
        if state.auto_mine {
            state.mine();
        }
        Ok(state.height)
    }

    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>> {
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }
}

/// Submission layer for one node's account on a [`MockChain`].
#[derive(Debug, Clone)]
pub struct MockChainWriter {
    chain: Arc<MockChain>,
    provider: Address,
}

impl MockChainWriter {
    /// Account this writer signs for.
    pub fn provider(&self) -> Address {
        self.provider
    }
}

#[async_trait]
impl ChainWriteEffects for MockChainWriter {
    async fn submit_transcript(
        &self,
        ritual_id: RitualId,
        transcript: Vec<u8>,
    ) -> Result<TxHandle> {
        self.chain.queue(
            self.provider,
            PhaseKey {
                ritual_id,
                phase: DkgPhase::Round1,
            },
            ChainCall::PostTranscript {
                ritual_id,
                transcript,
            },
        )
    }

    async fn submit_aggregation(
        &self,
        ritual_id: RitualId,
        aggregation: AggregationOutput,
    ) -> Result<TxHandle> {
        self.chain.queue(
            self.provider,
            PhaseKey {
                ritual_id,
                phase: DkgPhase::Round2,
            },
            ChainCall::PostAggregation {
                ritual_id,
                aggregation,
            },
        )
    }
}
