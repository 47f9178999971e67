//! Voter management use-case service.
//!
//! # Responsibility
//! - Validate voter input before it reaches the directory.
//! - Delegate persistence to any `VoterDirectory` implementation.
//!
//! # Invariants
//! - Created or updated voters have a non-blank name and are at least
//!   `MIN_VOTING_AGE` years old.

use crate::model::voter::{NewVoter, Voter, VoterId};
use crate::policy::weight::{is_eligible, MIN_VOTING_AGE};
use crate::repo::ledger_repo::{normalize_label, ErrorKind, LedgerError};
use crate::repo::voter_repo::VoterDirectory;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for voter use-cases.
#[derive(Debug)]
pub enum VoterServiceError {
    /// Name is empty after trimming.
    InvalidName,
    /// Age is below `MIN_VOTING_AGE`.
    Underage { age: u32 },
    /// Directory failure.
    Ledger(LedgerError),
}

impl VoterServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName | Self::Underage { .. } => ErrorKind::InvalidInput,
            Self::Ledger(err) => err.kind(),
        }
    }
}

impl Display for VoterServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "voter name is required"),
            Self::Underage { age } => {
                write!(f, "invalid age: {age}, must be {MIN_VOTING_AGE} or older")
            }
            Self::Ledger(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VoterServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LedgerError> for VoterServiceError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

/// Voter service facade over a directory implementation.
pub struct VoterService<D: VoterDirectory> {
    directory: D,
}

impl<D: VoterDirectory> VoterService<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Registers a voter after eligibility checks.
    pub fn create_voter(&self, request: NewVoter) -> Result<Voter, VoterServiceError> {
        let name = validate(&request.name, request.age)?;
        Ok(self.directory.create_voter(&NewVoter { name, ..request })?)
    }

    pub fn get_voter(&self, voter_id: VoterId) -> Result<Voter, VoterServiceError> {
        Ok(self.directory.get_voter(voter_id)?)
    }

    pub fn list_voters(&self) -> Result<Vec<Voter>, VoterServiceError> {
        Ok(self.directory.list_voters()?)
    }

    /// Replaces name and age; identity and creation time are preserved.
    pub fn update_voter(
        &self,
        voter_id: VoterId,
        name: &str,
        age: u32,
    ) -> Result<Voter, VoterServiceError> {
        let name = validate(name, age)?;
        Ok(self.directory.update_voter(voter_id, &name, age)?)
    }

    pub fn delete_voter(&self, voter_id: VoterId) -> Result<(), VoterServiceError> {
        Ok(self.directory.delete_voter(voter_id)?)
    }
}

fn validate(name: &str, age: u32) -> Result<String, VoterServiceError> {
    let name = normalize_label(name).ok_or(VoterServiceError::InvalidName)?;
    if !is_eligible(age) {
        return Err(VoterServiceError::Underage { age });
    }
    Ok(name)
}
