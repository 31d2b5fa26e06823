//! Ritual Operator Integration Tests
//!
//! Full rituals across several simulated nodes sharing one `MockChain`:
//! - four honest nodes reach ACTIVE with a public key
//! - one corrupt aggregation invalidates the ritual
//! - a diverged participant list halts participation
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_matches::assert_matches;
use ritual_agent::{
    ConfirmationConfig, EventDisposition, MemoryPendingActionStore, OperatorDeps, RitualOperator,
};
use ritual_core::{Address, PhaseKey, RitualError, RitualId, RitualStatus, TxHandle};
use ritual_testkit::{cohort, provider, ControllableTimeSource, MockChain, MockDkgCrypto};
use std::sync::Arc;

const AUTHORITY: Address = Address([0xbb; 20]);

fn config() -> ConfirmationConfig {
    ConfirmationConfig {
        average_block_time_ms: 1_000,
        cooling_interval_ms: 100,
        poll_interval_ms: 100,
        timeout_multiplier: 3,
        receipt_timeout_ms: 5_000,
        confirmations: 2,
    }
}

fn operator(chain: &Arc<MockChain>, node: Address, crypto: MockDkgCrypto) -> RitualOperator {
    RitualOperator::new(
        OperatorDeps {
            node,
            reader: chain.clone(),
            writer: Arc::new(chain.writer(node)),
            crypto: Arc::new(crypto),
            time: Arc::new(ControllableTimeSource::new(0)),
            store: Arc::new(MemoryPendingActionStore::new()),
        },
        &config(),
    )
}

fn honest(chain: &Arc<MockChain>, nodes: &[Address]) -> Vec<RitualOperator> {
    nodes
        .iter()
        .map(|n| operator(chain, *n, MockDkgCrypto::new(*n)))
        .collect()
}

/// Deliver the broadcast, include the transaction and feed back its outcome.
async fn settle(chain: &MockChain, op: &RitualOperator, handle: &TxHandle) -> EventDisposition {
    let broadcast = chain.broadcast(handle.tx_id).unwrap();
    let EventDisposition::Track(tracked) = op.handle_notification(broadcast).await else {
        panic!("broadcast should be tracked");
    };
    chain.include(handle.tx_id).unwrap();
    let outcome = op.track(&tracked).await.unwrap();
    op.handle_notification(outcome).await
}

#[tokio::test]
async fn test_four_nodes_reach_active() {
    let chain = MockChain::new(1_000);
    chain.set_auto_mine(true);
    let nodes = cohort(4);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 3, 3_600);
    let ops = honest(&chain, &nodes);

    assert_eq!(chain.status(ritual_id), Some(RitualStatus::DkgAwaitingTranscripts));
    for op in &ops {
        let handle = op
            .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_000)
            .await
            .unwrap()
            .expect("transcript should be posted");
        assert_eq!(settle(&chain, op, &handle).await, EventDisposition::Completed);
    }
    assert_eq!(chain.status(ritual_id), Some(RitualStatus::DkgAwaitingAggregations));

    // Round 1 is done for everyone.
    for op in &ops {
        assert!(op
            .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_001)
            .await
            .unwrap()
            .is_none());
    }

    for op in &ops {
        let handle = op
            .perform_round_2(ritual_id, 1_002)
            .await
            .unwrap()
            .expect("aggregation should be posted");
        assert_eq!(settle(&chain, op, &handle).await, EventDisposition::Completed);
    }

    let ritual = chain.ritual(ritual_id).unwrap();
    assert_eq!(chain.status(ritual_id), Some(RitualStatus::Active));
    assert_eq!(ritual.total_aggregations, 4);
    assert!(ritual.public_key.is_some());
    assert!(!ritual.aggregation_mismatch);
    assert!(ritual.participants.iter().all(|p| p.aggregated));
    for op in &ops {
        assert!(op.perform_round_2(ritual_id, 1_003).await.unwrap().is_none());
        assert_eq!(chain.submissions(PhaseKey::round2(ritual_id)), 4);
    }
}

#[tokio::test]
async fn test_round_2_waits_for_all_transcripts() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(2);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 2, 3_600);
    let ops = honest(&chain, &nodes);

    let handle = ops[0]
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_000)
        .await
        .unwrap()
        .unwrap();
    chain.include(handle.tx_id).unwrap();

    assert!(ops[0].perform_round_2(ritual_id, 1_001).await.unwrap().is_none());
    assert_eq!(chain.submissions(PhaseKey::round2(ritual_id)), 0);
}

#[tokio::test]
async fn test_corrupt_aggregation_invalidates_ritual() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(4);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 3, 3_600);
    let mut ops = honest(&chain, &nodes[..3]);
    ops.push(operator(&chain, nodes[3], MockDkgCrypto::corrupt(nodes[3])));

    for op in &ops {
        let handle = op
            .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_000)
            .await
            .unwrap()
            .unwrap();
        chain.include(handle.tx_id).unwrap();
    }

    let mut handles = Vec::new();
    for op in &ops {
        handles.push(op.perform_round_2(ritual_id, 1_001).await.unwrap().unwrap());
    }

    chain.include(handles[0].tx_id).unwrap();
    let corrupt = chain.include(handles[3].tx_id).unwrap();
    assert!(corrupt.success);

    let ritual = chain.ritual(ritual_id).unwrap();
    assert!(ritual.aggregation_mismatch);
    assert!(ritual.total_aggregations < 4);
    assert_eq!(chain.status(ritual_id), Some(RitualStatus::DkgInvalid));

    // Later aggregations revert and are not retried against an invalid ritual.
    let broadcast = chain.broadcast(handles[1].tx_id).unwrap();
    let EventDisposition::Track(tracked) = ops[1].handle_notification(broadcast).await else {
        panic!("broadcast should be tracked");
    };
    let reverted = chain.include(handles[1].tx_id).unwrap();
    assert!(!reverted.success);
    chain.mine_blocks(2);
    let outcome = ops[1].track(&tracked).await.unwrap();
    assert_eq!(
        ops[1].handle_notification(outcome).await,
        EventDisposition::Resubmitted(None)
    );
    assert_eq!(chain.submissions(PhaseKey::round2(ritual_id)), 4);
    assert!(ops[2].perform_round_2(ritual_id, 1_002).await.unwrap().is_none());
}

#[tokio::test]
async fn test_participant_mismatch_halts_ritual() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(3);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 2, 3_600);
    let op = operator(&chain, nodes[0], MockDkgCrypto::new(nodes[0]));

    let announced = [nodes[0], nodes[1], provider(9)];
    let err = op
        .perform_round_1(ritual_id, AUTHORITY, &announced, 1_000)
        .await
        .unwrap_err();
    assert_matches!(err, RitualError::ParticipantMismatch { ritual_id: id, .. } if id == ritual_id);
    assert!(op.is_halted(ritual_id));

    // Even the correct list no longer gets this node to act.
    assert!(op
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_001)
        .await
        .unwrap()
        .is_none());
    assert_eq!(chain.submissions(PhaseKey::round1(ritual_id)), 0);

    // Other rituals are unaffected.
    let other = chain.initiate_ritual(AUTHORITY, &nodes, 2, 3_600);
    assert_ne!(other, ritual_id);
    assert!(op
        .perform_round_1(other, AUTHORITY, &nodes, 1_002)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_non_participant_does_nothing() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(3);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 2, 3_600);
    let outsider = provider(42);
    let op = operator(&chain, outsider, MockDkgCrypto::new(outsider));

    assert!(op
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_000)
        .await
        .unwrap()
        .is_none());
    assert!(op.perform_round_2(ritual_id, 1_000).await.unwrap().is_none());
    assert!(!op.is_halted(ritual_id));
}

#[tokio::test]
async fn test_terminal_ritual_abandons_tracking() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(2);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 2, 60);
    let op = operator(&chain, nodes[0], MockDkgCrypto::new(nodes[0]));

    let handle = op
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_000)
        .await
        .unwrap()
        .unwrap();
    let EventDisposition::Track(tracked) = op
        .handle_notification(chain.broadcast(handle.tx_id).unwrap())
        .await
    else {
        panic!("broadcast should be tracked");
    };

    chain.advance_time(120);
    assert_eq!(chain.status(ritual_id), Some(RitualStatus::DkgTimeout));
    assert!(op
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_120)
        .await
        .unwrap()
        .is_none());

    assert!(op.track(&tracked).await.is_none());
    assert!(op.transactions().pending(&PhaseKey::round1(ritual_id)).await.is_none());
}

#[tokio::test]
async fn test_terminal_ritual_clears_halt() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(3);
    let ritual_id = chain.initiate_ritual(AUTHORITY, &nodes, 2, 60);
    let op = operator(&chain, nodes[0], MockDkgCrypto::new(nodes[0]));

    let announced = [nodes[0], nodes[1], provider(9)];
    assert!(op
        .perform_round_1(ritual_id, AUTHORITY, &announced, 1_000)
        .await
        .is_err());
    assert!(op.is_halted(ritual_id));

    chain.advance_time(120);
    assert!(op
        .perform_round_1(ritual_id, AUTHORITY, &nodes, 1_120)
        .await
        .unwrap()
        .is_none());
    assert!(!op.is_halted(ritual_id));
    assert_eq!(chain.submissions(PhaseKey::round1(ritual_id)), 0);
}

#[tokio::test]
async fn test_unknown_ritual_is_not_acted_on() {
    let chain = MockChain::new(1_000);
    let nodes = cohort(2);
    let op = operator(&chain, nodes[0], MockDkgCrypto::new(nodes[0]));

    assert!(op
        .perform_round_1(RitualId(99), AUTHORITY, &nodes, 1_000)
        .await
        .unwrap()
        .is_none());
}
