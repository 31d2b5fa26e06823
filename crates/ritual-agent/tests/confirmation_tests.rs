//! Confirmation Engine Integration Tests
//!
//! Drives `ConfirmationEngine` against `MockChain` on a virtual clock:
//! - zero-confirmation receipts
//! - confirmation counting against the chain head
//! - reorg detection and recovery
//! - timeouts and cancellation
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_matches::assert_matches;
use async_trait::async_trait;
use ritual_agent::{ConfirmationConfig, ConfirmationEngine};
use ritual_core::effects::{ChainReadEffects, ChainWriteEffects, NeverCancel};
use ritual_core::{
    Address, BlockHash, BlockHeight, Participant, Receipt, Result, Ritual, RitualError, RitualId,
    RitualStatus, TxHash,
};
use ritual_effects::WatchCancellation;
use ritual_testkit::{cohort, ControllableTimeSource, MockChain};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> ConfirmationConfig {
    ConfirmationConfig {
        average_block_time_ms: 1_000,
        cooling_interval_ms: 1_000,
        poll_interval_ms: 1_000,
        timeout_multiplier: 3,
        receipt_timeout_ms: 5_000,
        confirmations: 0,
    }
}

fn engine(chain: Arc<dyn ChainReadEffects>) -> (ConfirmationEngine, ControllableTimeSource) {
    let time = ControllableTimeSource::new(1_000_000);
    let engine = ConfirmationEngine::new(chain, Arc::new(time.clone()), config());
    (engine, time)
}

/// Chain with one ritual and one included transcript post at height `at`.
async fn mined_at(at: BlockHeight) -> (Arc<MockChain>, Receipt) {
    let chain = MockChain::new(1_000);
    let nodes = cohort(2);
    let ritual_id = chain.initiate_ritual(Address([1; 20]), &nodes, 2, 3_600);
    chain.mine_blocks(at - 1);
    let handle = chain
        .writer(nodes[0])
        .submit_transcript(ritual_id, vec![1, 2, 3])
        .await
        .unwrap();
    let receipt = chain.include(handle.tx_id).unwrap();
    assert_eq!(receipt.block_number, at);
    (chain, receipt)
}

#[tokio::test]
async fn test_zero_confirmations_returns_first_receipt() {
    let (chain, receipt) = mined_at(5).await;
    let (engine, _) = engine(chain.clone());

    let got = engine
        .wait_for_receipt(&receipt.tx_hash, Duration::from_secs(5), 0)
        .await
        .unwrap();
    assert_eq!(got, receipt);
    assert_eq!(chain.height_queries(), 0);
}

#[tokio::test]
async fn test_confirmation_counting_waits_for_depth() {
    let (chain, receipt) = mined_at(10).await;
    chain.set_auto_mine(true);
    let (engine, _) = engine(chain.clone());

    let got = engine
        .block_until_enough_confirmations(&receipt.tx_hash, Duration::from_secs(5), 3)
        .await
        .unwrap();
    assert_eq!(got, receipt);
    // One block per height query: 11, 12, then 13 == 10 + 3.
    assert_eq!(chain.height_queries(), 3);
    assert_eq!(chain.height(), 13);
}

#[tokio::test]
async fn test_shallow_inclusion_reports_not_enough_confirmations() {
    let (chain, receipt) = mined_at(10).await;
    chain.mine_blocks(2);
    let (engine, time) = engine(chain.clone());
    let start = time.now_ms();

    let err = engine
        .block_until_enough_confirmations(&receipt.tx_hash, Duration::from_secs(5), 3)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        RitualError::NotEnoughConfirmations {
            confirmations: 2,
            required: 3,
            ..
        }
    );
    assert!(err.is_transient());
    assert!(time.now_ms() - start >= 9_000);
}

#[tokio::test]
async fn test_moved_receipt_is_a_reorg() {
    let (chain, receipt) = mined_at(3).await;
    let (engine, _) = engine(chain.clone());
    assert!(engine.check_transaction_is_on_chain(&receipt).await.unwrap());

    let moved = BlockHash([9; 32]);
    chain.reorg(&receipt.tx_hash, Some((moved, 4)));
    let err = engine.check_transaction_is_on_chain(&receipt).await.unwrap_err();
    assert_matches!(
        err,
        RitualError::ChainReorganizationDetected { original_block, new_block: Some(new), .. }
            if original_block == receipt.block_hash && new == moved
    );
}

#[tokio::test]
async fn test_missing_receipt_is_a_reorg() {
    let (chain, receipt) = mined_at(3).await;
    let (engine, _) = engine(chain.clone());

    chain.reorg(&receipt.tx_hash, None);
    let err = engine.check_transaction_is_on_chain(&receipt).await.unwrap_err();
    assert_matches!(
        err,
        RitualError::ChainReorganizationDetected { new_block: None, .. }
    );
    assert!(err.is_transient());
}

/// Moves one transaction to another block the first time the head is read.
struct ReorgOnFirstHeight {
    inner: Arc<MockChain>,
    tx_hash: TxHash,
    moved_to: (BlockHash, BlockHeight),
    fired: AtomicBool,
}

#[async_trait]
impl ChainReadEffects for ReorgOnFirstHeight {
    async fn get_ritual(&self, ritual_id: RitualId) -> Result<Ritual> {
        self.inner.get_ritual(ritual_id).await
    }

    async fn get_ritual_status(&self, ritual_id: RitualId) -> Result<RitualStatus> {
        self.inner.get_ritual_status(ritual_id).await
    }

    async fn get_participant(
        &self,
        ritual_id: RitualId,
        provider: &Address,
    ) -> Result<Participant> {
        self.inner.get_participant(ritual_id, provider).await
    }

    async fn current_block_height(&self) -> Result<BlockHeight> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.reorg(&self.tx_hash, Some(self.moved_to));
        }
        self.inner.current_block_height().await
    }

    async fn get_receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>> {
        self.inner.get_receipt(tx_hash).await
    }
}

#[tokio::test]
async fn test_reorg_during_counting_is_absorbed() {
    let (chain, receipt) = mined_at(1).await;
    chain.set_auto_mine(true);
    let moved = BlockHash([7; 32]);
    let scripted = Arc::new(ReorgOnFirstHeight {
        inner: chain.clone(),
        tx_hash: receipt.tx_hash,
        moved_to: (moved, 1),
        fired: AtomicBool::new(false),
    });
    let (engine, _) = engine(scripted);

    let got = engine
        .wait_for_receipt(&receipt.tx_hash, Duration::from_secs(5), 2)
        .await
        .unwrap();
    assert_eq!(got.block_hash, moved);
    assert_eq!(got.tx_hash, receipt.tx_hash);
}

#[tokio::test]
async fn test_unmined_transaction_times_out() {
    let chain = MockChain::new(1_000);
    let (engine, _) = engine(chain);
    let unknown = TxHash([5; 32]);

    let err = engine
        .wait_for_receipt(&unknown, Duration::from_secs(5), 0)
        .await
        .unwrap_err();
    assert_matches!(err, RitualError::Timeout { timeout_ms: 5_000, .. });

    let err = engine
        .wait_for_receipt(&unknown, Duration::from_secs(5), 2)
        .await
        .unwrap_err();
    // Budget is 3 x 1000ms x 2 confirmations.
    assert_matches!(err, RitualError::Timeout { timeout_ms: 6_000, .. });
}

#[tokio::test]
async fn test_uncancelled_wait_completes() {
    let (chain, receipt) = mined_at(2).await;
    chain.set_auto_mine(true);
    let (engine, _) = engine(chain);

    let got = engine
        .wait_for_receipt_cancellable(&receipt.tx_hash, Duration::from_secs(5), 1, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(got, receipt);
}

#[tokio::test]
async fn test_cancelled_wait_is_abandoned() {
    let chain = MockChain::new(1_000);
    let (engine, _) = engine(chain);
    let unknown = TxHash([5; 32]);

    let token = WatchCancellation::new();
    token.cancel();
    let err = engine
        .wait_for_receipt_cancellable(&unknown, Duration::from_secs(3_600), 0, &token)
        .await
        .unwrap_err();
    assert_matches!(err, RitualError::Cancelled { .. });

    let token = WatchCancellation::new();
    let (result, ()) = tokio::join!(
        engine.wait_for_receipt_cancellable(&unknown, Duration::from_secs(3_600), 2, &token),
        async {
            tokio::task::yield_now().await;
            token.cancel();
        }
    );
    assert_matches!(result, Err(RitualError::Cancelled { .. }));
}
