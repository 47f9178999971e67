//! Vote ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store candidates and the append-only vote ledger.
//! - Own the atomic "insert vote + bump candidate tally" write.
//!
//! # Invariants
//! - `append_vote` inserts exactly one vote row and increments exactly one
//!   `votes_count` by one, inside one IMMEDIATE transaction, or changes
//!   nothing.
//! - The weight passed to `append_vote` must match the voter's age as read
//!   inside that transaction.
//! - A ranked ballot and all of its rankings commit together or not at all.
//! - The increment is computed by SQL inside the transaction, never from a
//!   value read earlier by the caller.
//! - Transient lock failures are retried a bounded number of times.

use crate::db::{now_epoch_ms, DbError};
use crate::model::ballot::{BallotId, RankedBallot};
use crate::model::candidate::{Candidate, CandidateFilter, CandidateId};
use crate::model::vote::{Vote, VoteId};
use crate::model::voter::{Voter, VoterId};
use crate::policy::weight::{self, WeightPolicyError};
use crate::repo::voter_repo::load_voter;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Default number of attempts for one ledger write.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(20);

/// Shortest accepted election id, in characters.
pub const MIN_ELECTION_ID_CHARS: usize = 3;

const CANDIDATE_SELECT_SQL: &str = "SELECT
    candidate_id,
    name,
    party,
    votes_count
FROM candidates";

const VOTE_SELECT_SQL: &str = "SELECT
    vote_id,
    voter_id,
    candidate_id,
    weight,
    created_at
FROM votes";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Caller-facing failure class, used to pick client vs server responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced candidate or voter does not exist.
    NotFound,
    /// Input was rejected before any write happened.
    InvalidInput,
    /// Storage could not complete the operation.
    StorageFailure,
}

/// Errors from ledger and voter persistence.
#[derive(Debug)]
pub enum LedgerError {
    CandidateNotFound(CandidateId),
    VoterNotFound(VoterId),
    /// Explicit voter id is already registered.
    DuplicateVoter(VoterId),
    /// Voter is referenced by committed votes and cannot be removed.
    VoterHasVotes(VoterId),
    /// Voter is below the minimum voting age at commit time.
    VoterIneligible { voter_id: VoterId, age: u32 },
    /// Weight was derived from a voter row that changed before commit.
    StaleWeight {
        voter_id: VoterId,
        expected: u32,
        current: u32,
    },
    /// Voter already holds a ranked ballot for this election.
    DuplicateBallot { voter_id: VoterId, election_id: String },
    InvalidInput(String),
    Db(DbError),
    /// Persisted row cannot be converted to a valid read model.
    InvalidData(String),
    /// Lock contention outlasted every retry.
    CommitConflict { attempts: u32, last: DbError },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CandidateNotFound(_) | Self::VoterNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateVoter(_)
            | Self::VoterHasVotes(_)
            | Self::VoterIneligible { .. }
            | Self::StaleWeight { .. }
            | Self::DuplicateBallot { .. }
            | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Db(_) | Self::InvalidData(_) | Self::CommitConflict { .. } => {
                ErrorKind::StorageFailure
            }
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_transient())
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CandidateNotFound(id) => write!(f, "candidate not found: {id}"),
            Self::VoterNotFound(id) => write!(f, "voter not found: {id}"),
            Self::DuplicateVoter(id) => write!(f, "voter already exists: {id}"),
            Self::VoterHasVotes(id) => write!(f, "voter {id} has recorded votes"),
            Self::VoterIneligible { voter_id, age } => write!(
                f,
                "voter {voter_id} is not eligible: {}",
                WeightPolicyError::Underage { age: *age }
            ),
            Self::StaleWeight {
                voter_id,
                expected,
                current,
            } => write!(
                f,
                "voter {voter_id} changed before commit: weight {expected} is now {current}"
            ),
            Self::DuplicateBallot {
                voter_id,
                election_id,
            } => write!(
                f,
                "voter {voter_id} has already voted in election {election_id}"
            ),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
            Self::CommitConflict { attempts, last } => {
                write!(f, "commit failed after {attempts} attempts: {last}")
            }
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::CommitConflict { last, .. } => Some(last),
            _ => None,
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable storage for candidates and the vote ledger.
pub trait LedgerStore {
    /// Registers a candidate with a zero tally.
    fn create_candidate(&self, name: &str, party: &str) -> LedgerResult<Candidate>;
    fn get_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Candidate>;
    /// Lists candidates ordered by `candidate_id ASC`.
    fn list_candidates(&self, filter: &CandidateFilter) -> LedgerResult<Vec<Candidate>>;
    fn get_voter(&self, voter_id: VoterId) -> LedgerResult<Voter>;
    /// Atomically records one vote and bumps the candidate tally by one.
    fn append_vote(
        &self,
        voter_id: VoterId,
        candidate_id: CandidateId,
        weight: u32,
    ) -> LedgerResult<Vote>;
    /// Lists votes for one candidate, oldest first.
    fn list_votes_by_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Vec<Vote>>;
    /// Counts votes with `from_ms <= created_at <= to_ms`.
    fn count_votes_in_range(
        &self,
        candidate_id: CandidateId,
        from_ms: i64,
        to_ms: i64,
    ) -> LedgerResult<u64>;
    /// Stores one ranked ballot with its rankings. Tallies are not touched.
    fn append_ranked_ballot(
        &self,
        election_id: &str,
        voter_id: VoterId,
        ranking: &[CandidateId],
    ) -> LedgerResult<RankedBallot>;
    /// Lists ranked ballots for one election, oldest first.
    fn list_ranked_ballots(&self, election_id: &str) -> LedgerResult<Vec<RankedBallot>>;
}

/// SQLite-backed ledger.
#[derive(Clone, Copy)]
pub struct SqliteLedgerStore<'conn> {
    conn: &'conn Connection,
    commit_attempts: u32,
}

impl<'conn> SqliteLedgerStore<'conn> {
    /// Constructs a ledger over a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    /// Overrides how many times a busy vote append is attempted (min 1).
    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    fn try_append_vote(
        &self,
        voter_id: VoterId,
        candidate_id: CandidateId,
        weight: u32,
    ) -> LedgerResult<Vote> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !candidate_exists_in_tx(&tx, candidate_id)? {
            return Err(LedgerError::CandidateNotFound(candidate_id));
        }
        let voter = load_voter(&tx, voter_id)?.ok_or(LedgerError::VoterNotFound(voter_id))?;
        let current = weight::weight(voter.age).map_err(|WeightPolicyError::Underage { age }| {
            LedgerError::VoterIneligible { voter_id, age }
        })?;
        if current != weight {
            return Err(LedgerError::StaleWeight {
                voter_id,
                expected: weight,
                current,
            });
        }

        let vote = Vote {
            vote_id: Uuid::new_v4(),
            voter_id,
            candidate_id,
            weight,
            created_at: now_epoch_ms(),
        };
        tx.execute(
            "INSERT INTO votes (
                vote_id,
                voter_id,
                candidate_id,
                weight,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                vote.vote_id.to_string(),
                vote.voter_id,
                vote.candidate_id,
                i64::from(vote.weight),
                vote.created_at,
            ],
        )?;

        let changed = tx.execute(
            "UPDATE candidates
             SET votes_count = votes_count + 1
             WHERE candidate_id = ?1;",
            [candidate_id],
        )?;
        if changed != 1 {
            return Err(LedgerError::InvalidData(format!(
                "tally update touched {changed} rows for candidate {candidate_id}"
            )));
        }

        tx.commit()?;
        Ok(vote)
    }

    fn try_append_ranked_ballot(
        &self,
        election_id: &str,
        voter_id: VoterId,
        ranking: &[CandidateId],
    ) -> LedgerResult<RankedBallot> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let voter = load_voter(&tx, voter_id)?.ok_or(LedgerError::VoterNotFound(voter_id))?;
        if !weight::is_eligible(voter.age) {
            return Err(LedgerError::VoterIneligible {
                voter_id,
                age: voter.age,
            });
        }
        for candidate_id in ranking {
            if !candidate_exists_in_tx(&tx, *candidate_id)? {
                return Err(LedgerError::CandidateNotFound(*candidate_id));
            }
        }
        let already_voted: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM ranked_ballots WHERE election_id = ?1 AND voter_id = ?2
            );",
            params![election_id, voter_id],
            |row| row.get(0),
        )?;
        if already_voted == 1 {
            return Err(LedgerError::DuplicateBallot {
                voter_id,
                election_id: election_id.to_string(),
            });
        }

        let ballot = RankedBallot {
            ballot_id: Uuid::new_v4(),
            election_id: election_id.to_string(),
            voter_id,
            ranking: ranking.to_vec(),
            created_at: now_epoch_ms(),
        };
        let ballot_id = ballot.ballot_id.to_string();
        tx.execute(
            "INSERT INTO ranked_ballots (ballot_id, election_id, voter_id, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                ballot_id.as_str(),
                ballot.election_id.as_str(),
                voter_id,
                ballot.created_at
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO ballot_rankings (ballot_id, rank_position, candidate_id)
                 VALUES (?1, ?2, ?3);",
            )?;
            for (position, candidate_id) in (1_i64..).zip(ranking) {
                insert.execute(params![ballot_id.as_str(), position, candidate_id])?;
            }
        }

        tx.commit()?;
        Ok(ballot)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    fn with_commit_retry<T>(
        &self,
        event: &str,
        mut op: impl FnMut() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.commit_attempts => {
                    warn!(
                        "event={} module=ledger status=retry attempt={} error={}",
                        event, attempt, err
                    );
                    thread::sleep(RETRY_BACKOFF_BASE * attempt);
                    attempt += 1;
                }
                Err(LedgerError::Db(last)) if last.is_transient() => {
                    return Err(LedgerError::CommitConflict {
                        attempts: attempt,
                        last,
                    });
                }
                other => return other,
            }
        }
    }
}

impl LedgerStore for SqliteLedgerStore<'_> {
    fn create_candidate(&self, name: &str, party: &str) -> LedgerResult<Candidate> {
        let name = normalize_label(name)
            .ok_or_else(|| LedgerError::InvalidInput("candidate name is required".to_string()))?;
        let party = normalize_label(party)
            .ok_or_else(|| LedgerError::InvalidInput("candidate party is required".to_string()))?;

        self.conn.execute(
            "INSERT INTO candidates (name, party, votes_count, created_at)
             VALUES (?1, ?2, 0, ?3);",
            params![name.as_str(), party.as_str(), now_epoch_ms()],
        )?;

        Ok(Candidate {
            candidate_id: self.conn.last_insert_rowid(),
            name,
            party,
            votes_count: 0,
        })
    }

    fn get_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Candidate> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CANDIDATE_SELECT_SQL} WHERE candidate_id = ?1;"))?;
        let mut rows = stmt.query([candidate_id])?;
        if let Some(row) = rows.next()? {
            return parse_candidate_row(row);
        }

        Err(LedgerError::CandidateNotFound(candidate_id))
    }

    fn list_candidates(&self, filter: &CandidateFilter) -> LedgerResult<Vec<Candidate>> {
        let mut sql = format!("{CANDIDATE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(party) = filter.party.as_ref() {
            sql.push_str(" AND party = ?");
            bind_values.push(Value::Text(party.clone()));
        }
        sql.push_str(" ORDER BY candidate_id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(parse_candidate_row(row)?);
        }

        Ok(candidates)
    }

    fn get_voter(&self, voter_id: VoterId) -> LedgerResult<Voter> {
        load_voter(self.conn, voter_id)?.ok_or(LedgerError::VoterNotFound(voter_id))
    }

    fn append_vote(
        &self,
        voter_id: VoterId,
        candidate_id: CandidateId,
        weight: u32,
    ) -> LedgerResult<Vote> {
        self.with_commit_retry("vote_append", || {
            self.try_append_vote(voter_id, candidate_id, weight)
        })
    }

    fn list_votes_by_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Vec<Vote>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VOTE_SELECT_SQL}
             WHERE candidate_id = ?1
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([candidate_id])?;
        let mut votes = Vec::new();
        while let Some(row) = rows.next()? {
            votes.push(parse_vote_row(row)?);
        }

        Ok(votes)
    }

    fn count_votes_in_range(
        &self,
        candidate_id: CandidateId,
        from_ms: i64,
        to_ms: i64,
    ) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM votes
             WHERE candidate_id = ?1
               AND created_at >= ?2
               AND created_at <= ?3;",
            params![candidate_id, from_ms, to_ms],
            |row| row.get(0),
        )?;
        non_negative(count, "COUNT(votes)")
    }

    fn append_ranked_ballot(
        &self,
        election_id: &str,
        voter_id: VoterId,
        ranking: &[CandidateId],
    ) -> LedgerResult<RankedBallot> {
        let election_id = normalize_election_id(election_id)?;
        validate_ranking(ranking)?;
        self.with_commit_retry("ballot_append", || {
            self.try_append_ranked_ballot(&election_id, voter_id, ranking)
        })
    }

    fn list_ranked_ballots(&self, election_id: &str) -> LedgerResult<Vec<RankedBallot>> {
        let election_id = normalize_election_id(election_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT
                b.ballot_id,
                b.voter_id,
                b.created_at,
                r.candidate_id
             FROM ranked_ballots b
             JOIN ballot_rankings r ON r.ballot_id = b.ballot_id
             WHERE b.election_id = ?1
             ORDER BY b.created_at ASC, b.rowid ASC, r.rank_position ASC;",
        )?;
        let mut rows = stmt.query([election_id.as_str()])?;
        let mut ballots: Vec<RankedBallot> = Vec::new();
        while let Some(row) = rows.next()? {
            let ballot_id = parse_uuid(row.get("ballot_id")?, "ranked_ballots.ballot_id")?;
            let candidate_id: CandidateId = row.get("candidate_id")?;
            if let Some(ballot) = ballots.last_mut() {
                if ballot.ballot_id == ballot_id {
                    ballot.ranking.push(candidate_id);
                    continue;
                }
            }
            ballots.push(RankedBallot {
                ballot_id,
                election_id: election_id.clone(),
                voter_id: row.get("voter_id")?,
                ranking: vec![candidate_id],
                created_at: row.get("created_at")?,
            });
        }

        Ok(ballots)
    }
}

/// Trims a display label and collapses internal whitespace runs.
///
/// Returns `None` when nothing but whitespace remains.
pub fn normalize_label(value: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

fn normalize_election_id(election_id: &str) -> LedgerResult<String> {
    let election_id = normalize_label(election_id)
        .ok_or_else(|| LedgerError::InvalidInput("election_id is required".to_string()))?;
    if election_id.chars().count() < MIN_ELECTION_ID_CHARS {
        return Err(LedgerError::InvalidInput(format!(
            "election_id `{election_id}` is shorter than {MIN_ELECTION_ID_CHARS} characters"
        )));
    }
    Ok(election_id)
}

fn validate_ranking(ranking: &[CandidateId]) -> LedgerResult<()> {
    if ranking.is_empty() {
        return Err(LedgerError::InvalidInput(
            "ranking cannot be empty".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(ranking.len());
    for candidate_id in ranking {
        if !seen.insert(*candidate_id) {
            return Err(LedgerError::InvalidInput(format!(
                "candidate {candidate_id} appears more than once in ranking"
            )));
        }
    }
    Ok(())
}

fn parse_uuid(value: String, column: &str) -> LedgerResult<BallotId> {
    Uuid::parse_str(&value)
        .map_err(|_| LedgerError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_candidate_row(row: &Row<'_>) -> LedgerResult<Candidate> {
    Ok(Candidate {
        candidate_id: row.get("candidate_id")?,
        name: row.get("name")?,
        party: row.get("party")?,
        votes_count: non_negative(row.get("votes_count")?, "candidates.votes_count")?,
    })
}

fn parse_vote_row(row: &Row<'_>) -> LedgerResult<Vote> {
    let vote_id: VoteId = parse_uuid(row.get("vote_id")?, "votes.vote_id")?;
    let weight: i64 = row.get("weight")?;
    let weight = u32::try_from(weight).map_err(|_| {
        LedgerError::InvalidData(format!("invalid weight `{weight}` in votes.weight"))
    })?;

    Ok(Vote {
        vote_id,
        voter_id: row.get("voter_id")?,
        candidate_id: row.get("candidate_id")?,
        weight,
        created_at: row.get("created_at")?,
    })
}

fn non_negative(value: i64, column: &str) -> LedgerResult<u64> {
    u64::try_from(value)
        .map_err(|_| LedgerError::InvalidData(format!("negative value `{value}` in {column}")))
}

fn candidate_exists_in_tx(tx: &Transaction<'_>, candidate_id: CandidateId) -> LedgerResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM candidates WHERE candidate_id = ?1);",
        [candidate_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
