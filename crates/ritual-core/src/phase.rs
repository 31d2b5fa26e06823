//! Phase snapshots and readiness predicates.
//!
//! A snapshot bundles a ritual with the status read alongside it. Snapshots are
//! built from a fresh ledger read immediately before each decision and dropped
//! afterwards; the predicates here are pure functions of that snapshot.

use crate::errors::{Result, RitualError};
use crate::ritual::{Ritual, RitualStatus};
use crate::types::{Address, RitualId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info};

/// Ritual round a node may act in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DkgPhase {
    /// Post this node's transcript
    Round1,
    /// Post this node's aggregation
    Round2,
}

impl DkgPhase {
    /// Stable lowercase label used in storage keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Round1 => "round1",
            Self::Round2 => "round2",
        }
    }
}

impl fmt::Display for DkgPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(ritual_id, phase)` key under which at most one submission is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhaseKey {
    /// Ritual the action belongs to
    pub ritual_id: RitualId,
    /// Round the action performs
    pub phase: DkgPhase,
}

impl PhaseKey {
    /// Key for phase-1 work on `ritual_id`.
    pub fn round1(ritual_id: RitualId) -> Self {
        Self {
            ritual_id,
            phase: DkgPhase::Round1,
        }
    }

    /// Key for phase-2 work on `ritual_id`.
    pub fn round2(ritual_id: RitualId) -> Self {
        Self {
            ritual_id,
            phase: DkgPhase::Round2,
        }
    }

    /// Path-like rendering, `"<ritual>/<phase>"`.
    pub fn storage_suffix(&self) -> String {
        format!("{}/{}", self.ritual_id, self.phase)
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ritual {} {}", self.ritual_id, self.phase)
    }
}

/// Snapshot used to decide whether to post a transcript.
#[derive(Debug, Clone)]
pub struct Phase1Snapshot {
    /// Ritual as read from the ledger
    pub ritual: Ritual,
    /// Status read alongside the ritual
    pub status: RitualStatus,
}

impl Phase1Snapshot {
    /// Bundle a freshly read ritual and status.
    pub fn new(ritual: Ritual, status: RitualStatus) -> Self {
        Self { ritual, status }
    }

    /// Whether `node` should post its transcript now.
    ///
    /// `participants` is the cohort announced by the enrollment notification.
    /// If it differs from the ledger's provider list the two sources have
    /// diverged, which is returned as [`RitualError::ParticipantMismatch`].
    pub fn ready(&self, participants: &[Address], node: &Address) -> Result<bool> {
        let ritual_id = self.ritual.id;
        let providers = self.ritual.providers();
        if providers.as_slice() != participants {
            error!(
                %ritual_id,
                ledger = ?providers,
                observed = ?participants,
                "participant set diverged from ledger"
            );
            return Err(RitualError::ParticipantMismatch {
                ritual_id,
                expected: providers,
                observed: participants.to_vec(),
            });
        }

        let Some(participant) = self.ritual.participant(node) else {
            info!(%ritual_id, %node, "node is not a participant; skipping round 1");
            return Ok(false);
        };

        if self.status != RitualStatus::DkgAwaitingTranscripts {
            debug!(%ritual_id, status = ?self.status, "ritual not awaiting transcripts");
            return Ok(false);
        }

        if participant.has_transcript() {
            debug!(%ritual_id, %node, "transcript already posted");
            return Ok(false);
        }

        Ok(true)
    }
}

/// Snapshot used to decide whether to post an aggregation.
#[derive(Debug, Clone)]
pub struct Phase2Snapshot {
    /// Ritual as read from the ledger
    pub ritual: Ritual,
    /// Status read alongside the ritual
    pub status: RitualStatus,
    /// Participants whose transcript is still empty
    pub missing_transcripts: usize,
}

impl Phase2Snapshot {
    /// Bundle a freshly read ritual and status.
    pub fn new(ritual: Ritual, status: RitualStatus) -> Self {
        let missing_transcripts = ritual.missing_transcripts();
        Self {
            ritual,
            status,
            missing_transcripts,
        }
    }

    /// Whether `node` should post its aggregation now.
    pub fn ready(&self, node: &Address) -> bool {
        let ritual_id = self.ritual.id;
        if self.status != RitualStatus::DkgAwaitingAggregations {
            debug!(%ritual_id, status = ?self.status, "ritual not awaiting aggregations");
            return false;
        }

        let Some(participant) = self.ritual.participant(node) else {
            info!(%ritual_id, %node, "node is not a participant; skipping round 2");
            return false;
        };

        if participant.aggregated {
            debug!(%ritual_id, %node, "aggregation already posted");
            return false;
        }

        if self.missing_transcripts > 0 {
            error!(
                %ritual_id,
                missing = self.missing_transcripts,
                "aggregation requested while transcripts are missing"
            );
            return false;
        }

        true
    }
}
