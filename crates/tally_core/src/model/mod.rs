//! Domain model for candidates, voters, the append-only vote ledger and
//! ranked ballots.
//!
//! # Responsibility
//! - Define canonical records shared by repositories and services.
//! - Define read models returned by tally/results queries.
//!
//! # Invariants
//! - `Candidate::votes_count` equals the number of committed votes that
//!   reference the candidate.
//! - Votes are immutable once created.

pub mod ballot;
pub mod candidate;
pub mod vote;
pub mod voter;
