//! Opaque DKG cryptography.
//!
//! Transcript generation and aggregation are consumed as black boxes; the
//! engine only moves their byte strings between the ledger and these calls.

use crate::errors::Result;
use crate::ritual::Ritual;
use crate::types::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a node posts in round 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationOutput {
    /// Aggregate of every participant's transcript
    pub aggregated_transcript: Vec<u8>,
    /// Public key the aggregate commits to
    pub public_key: Vec<u8>,
    /// Key other parties use to address decryption requests to this node
    pub decryption_request_static_key: Vec<u8>,
}

/// Transcript generation and aggregation for one node.
#[async_trait]
pub trait DkgCryptoEffects: Send + Sync {
    /// Produce `node`'s round-1 transcript for `ritual`.
    async fn generate_transcript(&self, ritual: &Ritual, node: &Address) -> Result<Vec<u8>>;

    /// Verify and aggregate every posted transcript for `ritual`.
    async fn aggregate_transcripts(
        &self,
        ritual: &Ritual,
        transcripts: &[(Address, Vec<u8>)],
    ) -> Result<AggregationOutput>;
}
