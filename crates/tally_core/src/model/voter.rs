//! Voter domain model.
//!
//! Voters are owned by the voter directory; the tally path only reads them.

use serde::{Deserialize, Serialize};

/// Voter identifier, either caller-supplied or storage-assigned.
pub type VoterId = i64;

/// Registered voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub voter_id: VoterId,
    pub name: String,
    pub age: u32,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Equal to `created_at` until first update.
    pub updated_at: i64,
}

/// Input for voter registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVoter {
    /// `None` lets storage assign the next free id.
    pub voter_id: Option<VoterId>,
    pub name: String,
    pub age: u32,
}

impl NewVoter {
    pub fn new(name: impl Into<String>, age: u32) -> Self {
        Self {
            voter_id: None,
            name: name.into(),
            age,
        }
    }

    pub fn with_id(voter_id: VoterId, name: impl Into<String>, age: u32) -> Self {
        Self {
            voter_id: Some(voter_id),
            name: name.into(),
            age,
        }
    }
}
