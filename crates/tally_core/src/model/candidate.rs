//! Candidate domain model and results read models.

use serde::{Deserialize, Serialize};

/// Storage-assigned candidate identifier.
pub type CandidateId = i64;

/// Registered candidate together with its running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: CandidateId,
    pub name: String,
    pub party: String,
    /// Number of committed votes. Only the ledger's atomic append mutates it.
    pub votes_count: u64,
}

/// Optional filters for candidate listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Exact, case-sensitive party match.
    pub party: Option<String>,
}

impl CandidateFilter {
    pub fn by_party(party: impl Into<String>) -> Self {
        Self {
            party: Some(party.into()),
        }
    }
}

/// Vote total for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVoteCount {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// Projection of a candidate holding the maximum tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub candidate_id: CandidateId,
    pub name: String,
    pub votes_count: u64,
}

impl From<&Candidate> for Winner {
    fn from(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.candidate_id,
            name: candidate.name.clone(),
            votes_count: candidate.votes_count,
        }
    }
}
