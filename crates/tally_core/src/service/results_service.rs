//! Results views over the candidate tally snapshot.
//!
//! # Invariants
//! - Full results are ordered `votes_count DESC, candidate_id ASC`.
//! - Winners are every candidate at the maximum tally, ordered
//!   `name ASC, candidate_id ASC`.
//! - No candidates means no winners; a winner is never fabricated.
//! - Schulze winners are every candidate no opponent beats on strongest
//!   paths, ordered by `candidate_id ASC`. No ballots means no winners.

use crate::model::ballot::{SchulzeRank, SchulzeResult, SchulzeTally};
use crate::model::candidate::{Candidate, CandidateFilter, CandidateId, Winner};
use crate::repo::ledger_repo::{normalize_label, LedgerResult, LedgerStore};

/// Read-only results service.
pub struct ResultsRanker<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> ResultsRanker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// All candidates, highest tally first.
    pub fn all_results_descending(&self) -> LedgerResult<Vec<Candidate>> {
        let snapshot = self.store.list_candidates(&CandidateFilter::default())?;
        Ok(rank_descending(snapshot))
    }

    /// Candidates sharing the maximum tally, by name.
    pub fn winners(&self) -> LedgerResult<Vec<Winner>> {
        let snapshot = self.store.list_candidates(&CandidateFilter::default())?;
        Ok(select_winners(&snapshot))
    }

    /// Candidates whose party equals `party_name` exactly.
    pub fn filter_by_party(&self, party_name: &str) -> LedgerResult<Vec<Candidate>> {
        self.store.list_candidates(&CandidateFilter::by_party(party_name))
    }

    /// Tabulates every ranked ballot of `election_id` with the Schulze method.
    pub fn schulze_results(&self, election_id: &str) -> LedgerResult<SchulzeResult> {
        let ballots = self.store.list_ranked_ballots(election_id)?;
        let rankings: Vec<&[CandidateId]> = ballots
            .iter()
            .map(|ballot| ballot.ranking.as_slice())
            .collect();

        Ok(SchulzeResult {
            election_id: normalize_label(election_id).unwrap_or_default(),
            ballots_counted: ballots.len() as u64,
            tally: schulze_tally(&rankings),
        })
    }
}

/// Sorts a snapshot by tally, ties broken by ascending id.
pub fn rank_descending(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|left, right| {
        right
            .votes_count
            .cmp(&left.votes_count)
            .then(left.candidate_id.cmp(&right.candidate_id))
    });
    candidates
}

/// Picks every candidate at the maximum tally.
pub fn select_winners(candidates: &[Candidate]) -> Vec<Winner> {
    let Some(max_votes) = candidates.iter().map(|candidate| candidate.votes_count).max() else {
        return Vec::new();
    };

    let mut winners: Vec<Winner> = candidates
        .iter()
        .filter(|candidate| candidate.votes_count == max_votes)
        .map(Winner::from)
        .collect();
    winners.sort_by(|left, right| {
        left.name
            .cmp(&right.name)
            .then(left.candidate_id.cmp(&right.candidate_id))
    });
    winners
}

/// Schulze winners for a set of rankings, ascending candidate id.
pub fn schulze_winners<R: AsRef<[CandidateId]>>(rankings: &[R]) -> Vec<CandidateId> {
    schulze_tally(rankings).winners
}

/// Runs the Schulze method over rankings listed most preferred first.
///
/// A ballot expresses a preference between two candidates only when it
/// ranks both of them.
pub fn schulze_tally<R: AsRef<[CandidateId]>>(rankings: &[R]) -> SchulzeTally {
    let mut candidates: Vec<CandidateId> = rankings
        .iter()
        .flat_map(|ranking| ranking.as_ref().iter().copied())
        .collect();
    candidates.sort_unstable();
    candidates.dedup();
    let n = candidates.len();
    if n == 0 {
        return SchulzeTally::default();
    }

    let mut pairwise = vec![vec![0_u64; n]; n];
    for ranking in rankings {
        // Candidate indexes in ballot order.
        let positions: Vec<usize> = ranking
            .as_ref()
            .iter()
            .filter_map(|candidate_id| candidates.binary_search(candidate_id).ok())
            .collect();
        for (offset, preferred) in positions.iter().enumerate() {
            for other in &positions[offset + 1..] {
                pairwise[*preferred][*other] += 1;
            }
        }
    }

    let mut paths = vec![vec![0_u64; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j && pairwise[i][j] > pairwise[j][i] {
                paths[i][j] = pairwise[i][j];
            }
        }
    }
    for k in 0..n {
        for i in 0..n {
            if i == k {
                continue;
            }
            for j in 0..n {
                if j != i && j != k {
                    paths[i][j] = paths[i][j].max(paths[i][k].min(paths[k][j]));
                }
            }
        }
    }

    let mut order: Vec<SchulzeRank> = (0..n)
        .map(|i| {
            let beaten_by = (0..n).filter(|&j| paths[j][i] > paths[i][j]).count();
            let path_wins = (0..n).filter(|&j| paths[i][j] > paths[j][i]).count();
            SchulzeRank {
                candidate_id: candidates[i],
                rank: beaten_by as u32 + 1,
                path_wins: path_wins as u32,
            }
        })
        .collect();
    order.sort_by(|left, right| {
        left.rank
            .cmp(&right.rank)
            .then(left.candidate_id.cmp(&right.candidate_id))
    });
    let winners = order
        .iter()
        .filter(|entry| entry.rank == 1)
        .map(|entry| entry.candidate_id)
        .collect();

    SchulzeTally {
        candidates,
        pairwise,
        strongest_paths: paths,
        winners,
        rankings: order,
    }
}
