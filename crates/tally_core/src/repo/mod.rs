//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`CandidateNotFound`,
//!   `VoterNotFound`) in addition to DB transport errors.
//! - Multi-statement writes run inside one IMMEDIATE transaction.

pub mod ledger_repo;
pub mod voter_repo;
