//! Core vote tallying logic.
//! This crate is the single source of truth for ledger and tally invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::ballot::{BallotId, RankedBallot, SchulzeRank, SchulzeResult, SchulzeTally};
pub use model::candidate::{Candidate, CandidateFilter, CandidateId, CandidateVoteCount, Winner};
pub use model::vote::{RangeVoteCount, Vote, VoteId, VoteTimelineEntry};
pub use model::voter::{NewVoter, Voter, VoterId};
pub use policy::weight::{weight, WeightPolicyError, MAX_WEIGHT, MIN_VOTING_AGE};
pub use repo::ledger_repo::{
    ErrorKind, LedgerError, LedgerResult, LedgerStore, SqliteLedgerStore,
};
pub use repo::voter_repo::{SqliteVoterDirectory, VoterDirectory};
pub use service::results_service::{schulze_tally, schulze_winners, ResultsRanker};
pub use service::tally_service::{TallyEngine, TallyError, TallyResult};
pub use service::voter_service::{VoterService, VoterServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
