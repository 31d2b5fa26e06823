//! Ledger read and write capabilities.

use crate::effects::crypto::AggregationOutput;
use crate::errors::Result;
use crate::ritual::{Participant, Ritual, RitualStatus};
use crate::tx::TxHandle;
use crate::types::{Address, BlockHeight, Receipt, RitualId, TxHash};
use async_trait::async_trait;

/// Read access to the coordinator contract and chain head.
#[async_trait]
pub trait ChainReadEffects: Send + Sync {
    /// Full ritual record.
    async fn get_ritual(&self, ritual_id: RitualId) -> Result<Ritual>;

    /// Status as derived by the ledger at its current time.
    async fn get_ritual_status(&self, ritual_id: RitualId) -> Result<RitualStatus>;

    /// One participant's record.
    async fn get_participant(&self, ritual_id: RitualId, provider: &Address)
        -> Result<Participant>;

    /// Height of the current chain head.
    async fn current_block_height(&self) -> Result<BlockHeight>;

    /// Receipt for `tx_hash`, `None` when the chain does not know it.
    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>>;
}

/// Transaction submission on behalf of this node.
///
/// Implementations own the signer; outcomes for the returned handle are
/// delivered later as [`crate::tx::TxNotification`]s.
#[async_trait]
pub trait ChainWriteEffects: Send + Sync {
    /// Queue a round-1 transcript post.
    async fn submit_transcript(&self, ritual_id: RitualId, transcript: Vec<u8>)
        -> Result<TxHandle>;

    /// Queue a round-2 aggregation post.
    async fn submit_aggregation(
        &self,
        ritual_id: RitualId,
        aggregation: AggregationOutput,
    ) -> Result<TxHandle>;
}
