//! Deterministic stand-in for DKG cryptography.

use async_trait::async_trait;
use ritual_core::effects::{AggregationOutput, DkgCryptoEffects};
use ritual_core::{Address, Result, Ritual, RitualError};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hash-based transcripts: every honest node aggregating the same transcripts
/// produces the same output, a corrupt node produces a different one.
#[derive(Debug)]
pub struct MockDkgCrypto {
    node: Address,
    corrupt: bool,
    transcripts_generated: AtomicUsize,
}

impl MockDkgCrypto {
    /// Honest crypto for `node`.
    pub fn new(node: Address) -> Self {
        Self {
            node,
            corrupt: false,
            transcripts_generated: AtomicUsize::new(0),
        }
    }

    /// Crypto for `node` that aggregates to a non-matching transcript.
    pub fn corrupt(node: Address) -> Self {
        Self {
            corrupt: true,
            ..Self::new(node)
        }
    }

    /// Number of transcripts generated so far.
    pub fn transcripts_generated(&self) -> usize {
        self.transcripts_generated.load(Ordering::SeqCst)
    }
}

fn digest(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

#[async_trait]
impl DkgCryptoEffects for MockDkgCrypto {
    async fn generate_transcript(&self, ritual: &Ritual, node: &Address) -> Result<Vec<u8>> {
        self.transcripts_generated.fetch_add(1, Ordering::SeqCst);
        Ok(digest(&[
            b"RITUAL_TRANSCRIPT".as_slice(),
            ritual.id.0.to_be_bytes().as_slice(),
            node.as_bytes().as_slice(),
        ]))
    }

    async fn aggregate_transcripts(
        &self,
        ritual: &Ritual,
        transcripts: &[(Address, Vec<u8>)],
    ) -> Result<AggregationOutput> {
        if transcripts.len() != ritual.dkg_size as usize {
            return Err(RitualError::crypto(format!(
                "expected {} transcripts, got {}",
                ritual.dkg_size,
                transcripts.len()
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(b"RITUAL_AGGREGATE");
        for (provider, transcript) in transcripts {
            hasher.update(provider.as_bytes());
            hasher.update(transcript);
        }
        if self.corrupt {
            hasher.update(self.node.as_bytes());
        }
        let aggregated_transcript = hasher.finalize().to_vec();

        Ok(AggregationOutput {
            public_key: digest(&[b"RITUAL_PUBLIC_KEY".as_slice(), aggregated_transcript.as_slice()]),
            decryption_request_static_key: digest(&[
                b"RITUAL_STATIC_KEY".as_slice(),
                self.node.as_bytes().as_slice(),
            ]),
            aggregated_transcript,
        })
    }
}
