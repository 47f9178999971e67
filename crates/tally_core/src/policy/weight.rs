//! Age-bucketed vote weighting.
//!
//! # Invariants
//! - Bands are half-open on the lower bound: `[18,30) -> 1`, `[30,40) -> 2`,
//!   `[40,50) -> 3`, `[50,..) -> 4`.
//! - Ages below `MIN_VOTING_AGE` have no weight and are rejected.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Youngest age that carries a vote weight.
pub const MIN_VOTING_AGE: u32 = 18;
/// Weight of the oldest band.
pub const MAX_WEIGHT: u32 = 4;

const WEIGHT_BANDS: &[(u32, u32)] = &[(18, 1), (30, 2), (40, 3), (50, MAX_WEIGHT)];

/// Weight policy rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightPolicyError {
    /// Voter is younger than `MIN_VOTING_AGE`.
    Underage { age: u32 },
}

impl Display for WeightPolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Underage { age } => write!(
                f,
                "voter age {age} is below minimum voting age {MIN_VOTING_AGE}"
            ),
        }
    }
}

impl Error for WeightPolicyError {}

/// Maps a voter age to its vote weight.
///
/// Age 50 belongs to the top band.
pub fn weight(age: u32) -> Result<u32, WeightPolicyError> {
    WEIGHT_BANDS
        .iter()
        .rev()
        .find(|(lower_bound, _)| age >= *lower_bound)
        .map(|(_, band_weight)| *band_weight)
        .ok_or(WeightPolicyError::Underage { age })
}

/// Returns whether `age` is old enough to vote.
pub fn is_eligible(age: u32) -> bool {
    age >= MIN_VOTING_AGE
}

#[cfg(test)]
mod tests {
    use super::{is_eligible, weight, WeightPolicyError, MAX_WEIGHT, MIN_VOTING_AGE};

    #[test]
    fn maps_each_band_to_its_weight() {
        assert_eq!(weight(25), Ok(1));
        assert_eq!(weight(35), Ok(2));
        assert_eq!(weight(45), Ok(3));
        assert_eq!(weight(55), Ok(4));
    }

    #[test]
    fn lower_bounds_are_inclusive() {
        assert_eq!(weight(18), Ok(1));
        assert_eq!(weight(29), Ok(1));
        assert_eq!(weight(30), Ok(2));
        assert_eq!(weight(40), Ok(3));
        assert_eq!(weight(49), Ok(3));
    }

    #[test]
    fn age_fifty_joins_top_band() {
        assert_eq!(weight(50), Ok(MAX_WEIGHT));
        assert_eq!(weight(120), Ok(MAX_WEIGHT));
    }

    #[test]
    fn rejects_underage_voters() {
        assert_eq!(weight(17), Err(WeightPolicyError::Underage { age: 17 }));
        assert_eq!(weight(0), Err(WeightPolicyError::Underage { age: 0 }));
        assert!(!is_eligible(MIN_VOTING_AGE - 1));
        assert!(is_eligible(MIN_VOTING_AGE));
    }
}
