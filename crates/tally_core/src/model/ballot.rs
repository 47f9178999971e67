//! Ranked ballots and Schulze tabulation read models.
//!
//! # Invariants
//! - `ranking` lists distinct candidate ids, most preferred first.
//! - A voter casts at most one ranked ballot per election.
//! - Ranked ballots never touch `Candidate::votes_count`.

use crate::model::candidate::CandidateId;
use crate::model::voter::VoterId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable ranked ballot identifier.
pub type BallotId = Uuid;

/// One committed ranked ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedBallot {
    pub ballot_id: BallotId,
    pub election_id: String,
    pub voter_id: VoterId,
    /// Candidate ids, rank 1 first.
    pub ranking: Vec<CandidateId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Position of one candidate in the Schulze order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchulzeRank {
    pub candidate_id: CandidateId,
    /// 1 for winners. Candidates no other candidate separates share a rank.
    pub rank: u32,
    /// Number of opponents this candidate beats on strongest paths.
    pub path_wins: u32,
}

/// Outcome of the Schulze method over a set of ranked ballots.
///
/// Matrices are indexed by position in `candidates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchulzeTally {
    /// Every candidate ranked on at least one ballot, ascending id.
    pub candidates: Vec<CandidateId>,
    /// `pairwise[i][j]`: ballots ranking `candidates[i]` above `candidates[j]`.
    pub pairwise: Vec<Vec<u64>>,
    /// `strongest_paths[i][j]`: strength of the strongest path from i to j.
    pub strongest_paths: Vec<Vec<u64>>,
    /// Ascending candidate id.
    pub winners: Vec<CandidateId>,
    /// Ordered by `rank ASC, candidate_id ASC`.
    pub rankings: Vec<SchulzeRank>,
}

/// Schulze results for one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchulzeResult {
    pub election_id: String,
    pub ballots_counted: u64,
    pub tally: SchulzeTally,
}
