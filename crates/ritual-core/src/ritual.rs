//! Ritual data model and status derivation.
//!
//! A [`Ritual`] is a point-in-time copy of one DKG ceremony as recorded on the
//! ledger. Status is never stored: it is derived from timestamps, counters and
//! the mismatch flag every time it is needed.

use crate::errors::{Result, RitualError};
use crate::types::{Address, RitualId};
use serde::{Deserialize, Serialize};

/// One cohort member's contribution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Position within the ritual, stable for its lifetime
    pub index: u32,
    /// Node address
    pub provider: Address,
    /// Whether this node's aggregation has been accepted
    #[serde(default)]
    pub aggregated: bool,
    /// Phase-1 transcript, empty until submitted
    #[serde(default)]
    pub transcript: Vec<u8>,
    /// Static key published alongside the aggregation
    #[serde(default)]
    pub decryption_request_static_key: Vec<u8>,
}

impl Participant {
    /// Fresh enrollment record with no contributions.
    pub fn new(index: u32, provider: Address) -> Self {
        Self {
            index,
            provider,
            aggregated: false,
            transcript: Vec::new(),
            decryption_request_static_key: Vec::new(),
        }
    }

    /// True once a phase-1 transcript has been posted.
    pub fn has_transcript(&self) -> bool {
        !self.transcript.is_empty()
    }
}

/// Derived lifecycle state of a ritual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RitualStatus {
    /// Never initiated
    NonInitiated,
    /// Waiting for phase-1 transcripts
    DkgAwaitingTranscripts,
    /// Waiting for phase-2 aggregations
    DkgAwaitingAggregations,
    /// The DKG window elapsed before completion
    DkgTimeout,
    /// Two aggregations disagreed
    DkgInvalid,
    /// Finalized and usable
    Active,
    /// Finalized but past its expiry
    Expired,
}

impl RitualStatus {
    /// Derive the status of `ritual` at unix time `now` (seconds).
    ///
    /// Rules are evaluated in order and the first match wins. The trailing arm
    /// is unreachable for a ritual that satisfies [`Ritual::check_invariants`].
    pub fn derive(ritual: &Ritual, now: u64) -> Result<Self> {
        let dkg_size = ritual.dkg_size;
        let evidence = (
            ritual.init_timestamp == 0,
            ritual.total_aggregations == dkg_size,
            ritual.aggregation_mismatch,
            now > ritual.end_timestamp,
            ritual.total_transcripts < dkg_size,
            ritual.total_aggregations < dkg_size,
        );

        match evidence {
            (true, _, _, _, _, _) => Ok(Self::NonInitiated),
            (_, true, _, _, _, _) => {
                if ritual.expiry_timestamp != 0 && now >= ritual.expiry_timestamp {
                    Ok(Self::Expired)
                } else {
                    Ok(Self::Active)
                }
            }
            (_, _, true, _, _, _) => Ok(Self::DkgInvalid),
            (_, _, _, true, _, _) => Ok(Self::DkgTimeout),
            (_, _, _, _, true, _) => Ok(Self::DkgAwaitingTranscripts),
            (_, _, _, _, _, true) => Ok(Self::DkgAwaitingAggregations),
            _ => Err(RitualError::internal(format!(
                "ritual {} has no derivable status: {} aggregations for dkg size {dkg_size}",
                ritual.id, ritual.total_aggregations
            ))),
        }
    }

    /// Statuses after which the ritual no longer changes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Active | Self::DkgTimeout | Self::DkgInvalid | Self::Expired
        )
    }

    /// The DKG completed and produced a public key.
    pub fn is_finalized(self) -> bool {
        matches!(self, Self::Active | Self::Expired)
    }
}

/// Snapshot of one DKG ceremony's on-chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ritual {
    /// Ledger-assigned identifier
    pub id: RitualId,
    /// Account that initiated the ritual
    pub initiator: Address,
    /// Account that owns the resulting key
    pub authority: Address,
    /// Contract gating decryption requests
    pub access_controller: Address,
    /// Number of participants
    pub dkg_size: u32,
    /// Minimum shares for decryption
    pub threshold: u32,
    /// Unix time of initiation, 0 when not initiated
    pub init_timestamp: u64,
    /// Unix time after which the DKG has timed out
    pub end_timestamp: u64,
    /// Unix time after which a finalized ritual is expired, 0 for never
    #[serde(default)]
    pub expiry_timestamp: u64,
    /// Transcripts submitted so far
    pub total_transcripts: u32,
    /// Aggregations submitted so far
    pub total_aggregations: u32,
    /// Present only once finalized
    #[serde(default)]
    pub public_key: Option<Vec<u8>>,
    /// Set when two aggregations disagree
    #[serde(default)]
    pub aggregation_mismatch: bool,
    /// Empty until the first aggregation lands
    #[serde(default)]
    pub aggregated_transcript: Vec<u8>,
    /// Participants in enrollment order
    pub participants: Vec<Participant>,
}

impl Ritual {
    /// Providers in on-chain enrollment order.
    pub fn providers(&self) -> Vec<Address> {
        self.participants.iter().map(|p| p.provider).collect()
    }

    /// Participant record for `provider`, if enrolled.
    pub fn participant(&self, provider: &Address) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.provider == provider)
    }

    /// Mutable participant record for `provider`, if enrolled.
    pub fn participant_mut(&mut self, provider: &Address) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.provider == provider)
    }

    /// Number of participants that have not posted a transcript.
    pub fn missing_transcripts(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| !p.has_transcript())
            .count()
    }

    /// Posted transcripts in enrollment order.
    pub fn transcripts(&self) -> Vec<(Address, Vec<u8>)> {
        self.participants
            .iter()
            .filter(|p| p.has_transcript())
            .map(|p| (p.provider, p.transcript.clone()))
            .collect()
    }

    /// Derive status at unix time `now`.
    pub fn status_at(&self, now: u64) -> Result<RitualStatus> {
        RitualStatus::derive(self, now)
    }

    /// Validate the structural invariants of a ritual snapshot.
    pub fn check_invariants(&self) -> Result<()> {
        if self.participants.len() != self.dkg_size as usize {
            return Err(RitualError::invalid(format!(
                "ritual {} has {} participants for dkg size {}",
                self.id,
                self.participants.len(),
                self.dkg_size
            )));
        }
        if self.total_transcripts > self.dkg_size {
            return Err(RitualError::invalid(format!(
                "ritual {} counts {} transcripts for dkg size {}",
                self.id, self.total_transcripts, self.dkg_size
            )));
        }
        if self.total_aggregations > self.dkg_size {
            return Err(RitualError::invalid(format!(
                "ritual {} counts {} aggregations for dkg size {}",
                self.id, self.total_aggregations, self.dkg_size
            )));
        }
        if self.threshold == 0 || self.threshold > self.dkg_size {
            return Err(RitualError::invalid(format!(
                "ritual {} threshold {} outside 1..={}",
                self.id, self.threshold, self.dkg_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ritual(dkg_size: u32) -> Ritual {
        Ritual {
            id: RitualId(7),
            initiator: Address([1; 20]),
            authority: Address([2; 20]),
            access_controller: Address([3; 20]),
            dkg_size,
            threshold: dkg_size.max(1),
            init_timestamp: 1_000,
            end_timestamp: 2_000,
            expiry_timestamp: 0,
            total_transcripts: 0,
            total_aggregations: 0,
            public_key: None,
            aggregation_mismatch: false,
            aggregated_transcript: Vec::new(),
            participants: (0..dkg_size)
                .map(|i| Participant::new(i, Address([10 + i as u8; 20])))
                .collect(),
        }
    }

    #[test]
    fn uninitiated_wins_over_everything() {
        let mut r = ritual(4);
        r.init_timestamp = 0;
        r.total_aggregations = 4;
        r.aggregation_mismatch = true;
        assert_eq!(r.status_at(5_000).unwrap(), RitualStatus::NonInitiated);
    }

    #[test]
    fn full_aggregation_is_active_even_after_deadline() {
        let mut r = ritual(4);
        r.total_transcripts = 4;
        r.total_aggregations = 4;
        assert_eq!(r.status_at(1_500).unwrap(), RitualStatus::Active);
        assert_eq!(r.status_at(9_000).unwrap(), RitualStatus::Active);
    }

    #[test]
    fn expiry_applies_only_to_finalized_rituals() {
        let mut r = ritual(4);
        r.expiry_timestamp = 3_000;
        r.total_transcripts = 4;
        r.total_aggregations = 4;
        assert_eq!(r.status_at(2_999).unwrap(), RitualStatus::Active);
        assert_eq!(r.status_at(3_000).unwrap(), RitualStatus::Expired);

        r.total_aggregations = 2;
        assert_eq!(r.status_at(1_500).unwrap(), RitualStatus::DkgAwaitingAggregations);
    }

    #[test]
    fn mismatch_precedes_timeout() {
        let mut r = ritual(4);
        r.total_transcripts = 4;
        r.total_aggregations = 1;
        r.aggregation_mismatch = true;
        assert_eq!(r.status_at(9_000).unwrap(), RitualStatus::DkgInvalid);
    }

    #[test]
    fn timeout_is_strictly_after_end() {
        let r = ritual(4);
        assert_eq!(r.status_at(2_000).unwrap(), RitualStatus::DkgAwaitingTranscripts);
        assert_eq!(r.status_at(2_001).unwrap(), RitualStatus::DkgTimeout);
    }

    #[test]
    fn awaiting_phases_follow_counters() {
        let mut r = ritual(4);
        r.total_transcripts = 3;
        assert_eq!(r.status_at(1_500).unwrap(), RitualStatus::DkgAwaitingTranscripts);
        r.total_transcripts = 4;
        assert_eq!(r.status_at(1_500).unwrap(), RitualStatus::DkgAwaitingAggregations);
    }

    #[test]
    fn over_counted_aggregations_fail_loudly() {
        let mut r = ritual(4);
        r.total_transcripts = 4;
        r.total_aggregations = 5;
        assert!(matches!(
            r.status_at(1_500),
            Err(RitualError::Internal { .. })
        ));
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn invariants_reject_participant_count_drift() {
        let mut r = ritual(4);
        assert!(r.check_invariants().is_ok());
        r.participants.pop();
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn missing_transcripts_counts_empty_records() {
        let mut r = ritual(3);
        assert_eq!(r.missing_transcripts(), 3);
        r.participants[1].transcript = vec![1, 2, 3];
        assert_eq!(r.missing_transcripts(), 2);
        assert_eq!(r.transcripts(), vec![(Address([11; 20]), vec![1, 2, 3])]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RitualStatus::Active.is_terminal());
        assert!(RitualStatus::DkgTimeout.is_terminal());
        assert!(RitualStatus::DkgInvalid.is_terminal());
        assert!(RitualStatus::Expired.is_terminal());
        assert!(!RitualStatus::DkgAwaitingTranscripts.is_terminal());
        assert!(!RitualStatus::DkgAwaitingAggregations.is_terminal());
        assert!(!RitualStatus::NonInitiated.is_terminal());
    }

    proptest! {
        #[test]
        fn derivation_matches_precedence(
            dkg_size in 1u32..8,
            transcripts in 0u32..8,
            aggregations in 0u32..8,
            mismatch in any::<bool>(),
            initiated in any::<bool>(),
            now in 0u64..4_000,
        ) {
            let mut r = ritual(dkg_size);
            r.init_timestamp = if initiated { 1_000 } else { 0 };
            r.total_transcripts = transcripts.min(dkg_size);
            r.total_aggregations = aggregations.min(dkg_size);
            r.aggregation_mismatch = mismatch;

            let status = r.status_at(now).unwrap();
            let expected = if !initiated {
                RitualStatus::NonInitiated
            } else if r.total_aggregations == dkg_size {
                RitualStatus::Active
            } else if mismatch {
                RitualStatus::DkgInvalid
            } else if now > r.end_timestamp {
                RitualStatus::DkgTimeout
            } else if r.total_transcripts < dkg_size {
                RitualStatus::DkgAwaitingTranscripts
            } else {
                RitualStatus::DkgAwaitingAggregations
            };
            prop_assert_eq!(status, expected);
        }
    }
}
