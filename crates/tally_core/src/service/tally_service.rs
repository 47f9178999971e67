//! Vote tally use-case service.
//!
//! # Responsibility
//! - Orchestrate cast-vote: resolve candidate and voter, derive the
//!   demographic weight, append atomically through the ledger.
//! - Expose per-candidate read queries (count, votes, timeline, range).
//! - Accept ranked ballots for Schulze elections.
//!
//! # Invariants
//! - Ledger errors propagate unchanged; nothing is logged-and-dropped.
//! - A rejected cast-vote leaves every tally and vote row untouched.
//! - The tally moves by one per vote; weight is recorded on the vote only.
//! - The recorded weight matches the voter's age at commit time.

use crate::model::ballot::RankedBallot;
use crate::model::candidate::{Candidate, CandidateFilter, CandidateId, CandidateVoteCount};
use crate::model::vote::{RangeVoteCount, Vote, VoteTimelineEntry};
use crate::model::voter::VoterId;
use crate::policy::weight::{self, WeightPolicyError};
use crate::repo::ledger_repo::{ErrorKind, LedgerError, LedgerStore};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Tally service error.
#[derive(Debug)]
pub enum TallyError {
    /// Ledger failure, passed through as-is.
    Ledger(LedgerError),
    /// Voter exists but carries no vote weight.
    Ineligible { voter_id: VoterId, age: u32 },
    /// Range query with `from > to`.
    InvalidRange { from: i64, to: i64 },
}

impl TallyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(err) => err.kind(),
            Self::Ineligible { .. } | Self::InvalidRange { .. } => ErrorKind::InvalidInput,
        }
    }
}

impl Display for TallyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Ineligible { voter_id, age } => write!(
                f,
                "voter {voter_id} is not eligible: {}",
                WeightPolicyError::Underage { age: *age }
            ),
            Self::InvalidRange { from, to } => {
                write!(f, "invalid interval: from {from} is after to {to}")
            }
        }
    }
}

impl Error for TallyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LedgerError> for TallyError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

pub type TallyResult<T> = Result<T, TallyError>;

/// Reads of the voter row before a vote is cast, when it keeps changing.
const MAX_WEIGHT_READS: u32 = 2;

/// Cast-vote orchestration over a ledger implementation.
pub struct TallyEngine<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> TallyEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records one vote for `candidate_id` on behalf of `voter_id`.
    ///
    /// # Errors
    /// - `NotFound` kind when the candidate or voter is unknown.
    /// - `Ineligible` when the voter is younger than the minimum voting age.
    /// - `StorageFailure` kind when the transaction cannot commit.
    pub fn cast_vote(&self, voter_id: VoterId, candidate_id: CandidateId) -> TallyResult<Vote> {
        let started_at = Instant::now();
        let result = self.cast_vote_inner(voter_id, candidate_id);

        match &result {
            Ok(vote) => info!(
                "event=vote_cast module=tally status=ok vote_id={} candidate_id={} weight={} duration_ms={}",
                vote.vote_id,
                candidate_id,
                vote.weight,
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.kind() == ErrorKind::StorageFailure => error!(
                "event=vote_cast module=tally status=error candidate_id={} duration_ms={} error_kind=storage_failure error={}",
                candidate_id,
                started_at.elapsed().as_millis(),
                err
            ),
            Err(err) => warn!(
                "event=vote_cast module=tally status=rejected candidate_id={} duration_ms={} error={}",
                candidate_id,
                started_at.elapsed().as_millis(),
                err
            ),
        }

        result
    }

    fn cast_vote_inner(&self, voter_id: VoterId, candidate_id: CandidateId) -> TallyResult<Vote> {
        self.store.get_candidate(candidate_id)?;
        let mut reads = 1;
        loop {
            let voter = self.store.get_voter(voter_id)?;
            let weight = weight::weight(voter.age).map_err(
                |WeightPolicyError::Underage { age }| TallyError::Ineligible { voter_id, age },
            )?;

            match self.store.append_vote(voter_id, candidate_id, weight) {
                Ok(vote) => return Ok(vote),
                Err(LedgerError::StaleWeight { .. }) if reads < MAX_WEIGHT_READS => reads += 1,
                Err(LedgerError::VoterIneligible { voter_id, age }) => {
                    return Err(TallyError::Ineligible { voter_id, age })
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Records a ranked ballot for `election_id`, most preferred candidate first.
    ///
    /// # Errors
    /// - `InvalidInput` kind for a blank or short election id, an empty or
    ///   repeating ranking, an underage voter, or a second ballot in the same
    ///   election.
    /// - `NotFound` kind when the voter or a ranked candidate is unknown.
    pub fn cast_ranked_ballot(
        &self,
        election_id: &str,
        voter_id: VoterId,
        ranking: &[CandidateId],
    ) -> TallyResult<RankedBallot> {
        let started_at = Instant::now();
        let result = self
            .store
            .append_ranked_ballot(election_id, voter_id, ranking)
            .map_err(|err| match err {
                LedgerError::VoterIneligible { voter_id, age } => {
                    TallyError::Ineligible { voter_id, age }
                }
                other => TallyError::Ledger(other),
            });

        match &result {
            Ok(ballot) => info!(
                "event=ballot_cast module=tally status=ok ballot_id={} ranked={} duration_ms={}",
                ballot.ballot_id,
                ballot.ranking.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.kind() == ErrorKind::StorageFailure => error!(
                "event=ballot_cast module=tally status=error duration_ms={} error_kind=storage_failure error={}",
                started_at.elapsed().as_millis(),
                err
            ),
            Err(err) => warn!(
                "event=ballot_cast module=tally status=rejected duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }

        result
    }

    /// Lists ranked ballots cast in one election, oldest first.
    pub fn ranked_ballots(&self, election_id: &str) -> TallyResult<Vec<RankedBallot>> {
        Ok(self.store.list_ranked_ballots(election_id)?)
    }

    /// Returns the running tally for one candidate. Zero votes is not an error.
    pub fn get_candidate_vote_count(
        &self,
        candidate_id: CandidateId,
    ) -> TallyResult<CandidateVoteCount> {
        let candidate = self.store.get_candidate(candidate_id)?;
        Ok(CandidateVoteCount {
            candidate_id,
            votes: candidate.votes_count,
        })
    }

    /// Registers a candidate; blank name or party is rejected.
    pub fn register_candidate(&self, name: &str, party: &str) -> TallyResult<Candidate> {
        let candidate = self.store.create_candidate(name, party)?;
        info!(
            "event=candidate_register module=tally status=ok candidate_id={}",
            candidate.candidate_id
        );
        Ok(candidate)
    }

    /// Lists candidates, optionally restricted to one party.
    pub fn list_candidates(&self, party: Option<&str>) -> TallyResult<Vec<Candidate>> {
        let filter = CandidateFilter {
            party: party.map(str::to_string),
        };
        Ok(self.store.list_candidates(&filter)?)
    }

    /// Lists committed votes for an existing candidate, oldest first.
    pub fn votes_for_candidate(&self, candidate_id: CandidateId) -> TallyResult<Vec<Vote>> {
        self.store.get_candidate(candidate_id)?;
        Ok(self.store.list_votes_by_candidate(candidate_id)?)
    }

    /// Returns `(vote_id, timestamp)` pairs for a candidate, oldest first.
    pub fn vote_timeline(&self, candidate_id: CandidateId) -> TallyResult<Vec<VoteTimelineEntry>> {
        let votes = self.votes_for_candidate(candidate_id)?;
        Ok(votes.iter().map(VoteTimelineEntry::from).collect())
    }

    /// Counts votes gained in the inclusive window `[from_ms, to_ms]`.
    pub fn votes_in_range(
        &self,
        candidate_id: CandidateId,
        from_ms: i64,
        to_ms: i64,
    ) -> TallyResult<RangeVoteCount> {
        if from_ms > to_ms {
            return Err(TallyError::InvalidRange {
                from: from_ms,
                to: to_ms,
            });
        }
        self.store.get_candidate(candidate_id)?;
        let votes_gained = self
            .store
            .count_votes_in_range(candidate_id, from_ms, to_ms)?;

        Ok(RangeVoteCount {
            candidate_id,
            from: from_ms,
            to: to_ms,
            votes_gained,
        })
    }
}
