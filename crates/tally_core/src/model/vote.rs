//! Vote ledger records.
//!
//! # Invariants
//! - `vote_id` is generated once and never reused.
//! - A vote is never updated or deleted after commit.
//! - `weight` is an audit field; the candidate tally moves by exactly one
//!   per vote regardless of weight.

use crate::model::candidate::CandidateId;
use crate::model::voter::VoterId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable vote identifier.
pub type VoteId = Uuid;

/// One committed vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub vote_id: VoteId,
    pub voter_id: VoterId,
    pub candidate_id: CandidateId,
    /// Demographic weight recorded at cast time.
    pub weight: u32,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// One entry of a candidate's vote timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTimelineEntry {
    pub vote_id: VoteId,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl From<&Vote> for VoteTimelineEntry {
    fn from(vote: &Vote) -> Self {
        Self {
            vote_id: vote.vote_id,
            timestamp: vote.created_at,
        }
    }
}

/// Votes gained by a candidate within an inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeVoteCount {
    pub candidate_id: CandidateId,
    /// Unix epoch milliseconds, inclusive.
    pub from: i64,
    /// Unix epoch milliseconds, inclusive.
    pub to: i64,
    pub votes_gained: u64,
}
