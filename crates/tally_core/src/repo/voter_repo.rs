//! Voter directory contract and SQLite implementation.
//!
//! # Responsibility
//! - Expose voter create/get/list/update/delete as a capability trait so the
//!   directory can live in-process or behind any remote transport.
//! - Keep SQL for the `voters` table in one place; the ledger reuses
//!   `load_voter` for its read path.
//!
//! # Invariants
//! - Updates never change `voter_id` or `created_at`.
//! - Voters referenced by committed votes or ranked ballots cannot be deleted.

use crate::db::now_epoch_ms;
use crate::model::voter::{NewVoter, Voter, VoterId};
use crate::repo::ledger_repo::{LedgerError, LedgerResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const VOTER_SELECT_SQL: &str = "SELECT
    voter_id,
    name,
    age,
    created_at,
    updated_at
FROM voters";

/// Capability set for voter management.
pub trait VoterDirectory {
    fn create_voter(&self, voter: &NewVoter) -> LedgerResult<Voter>;
    fn get_voter(&self, voter_id: VoterId) -> LedgerResult<Voter>;
    /// Lists voters ordered by `voter_id ASC`.
    fn list_voters(&self) -> LedgerResult<Vec<Voter>>;
    fn update_voter(&self, voter_id: VoterId, name: &str, age: u32) -> LedgerResult<Voter>;
    fn delete_voter(&self, voter_id: VoterId) -> LedgerResult<()>;
}

/// SQLite-backed voter directory sharing the ledger database.
pub struct SqliteVoterDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVoterDirectory<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl VoterDirectory for SqliteVoterDirectory<'_> {
    fn create_voter(&self, voter: &NewVoter) -> LedgerResult<Voter> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if let Some(voter_id) = voter.voter_id {
            if load_voter(&tx, voter_id)?.is_some() {
                return Err(LedgerError::DuplicateVoter(voter_id));
            }
        }

        let now = now_epoch_ms();
        tx.execute(
            "INSERT INTO voters (voter_id, name, age, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4);",
            params![voter.voter_id, voter.name.as_str(), i64::from(voter.age), now],
        )?;
        let voter_id = voter.voter_id.unwrap_or_else(|| tx.last_insert_rowid());
        tx.commit()?;

        Ok(Voter {
            voter_id,
            name: voter.name.clone(),
            age: voter.age,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_voter(&self, voter_id: VoterId) -> LedgerResult<Voter> {
        load_voter(self.conn, voter_id)?.ok_or(LedgerError::VoterNotFound(voter_id))
    }

    fn list_voters(&self) -> LedgerResult<Vec<Voter>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{VOTER_SELECT_SQL} ORDER BY voter_id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut voters = Vec::new();
        while let Some(row) = rows.next()? {
            voters.push(parse_voter_row(row)?);
        }
        Ok(voters)
    }

    fn update_voter(&self, voter_id: VoterId, name: &str, age: u32) -> LedgerResult<Voter> {
        let changed = self.conn.execute(
            "UPDATE voters
             SET name = ?2,
                 age = ?3,
                 updated_at = ?4
             WHERE voter_id = ?1;",
            params![voter_id, name, i64::from(age), now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(LedgerError::VoterNotFound(voter_id));
        }

        self.get_voter(voter_id)
    }

    fn delete_voter(&self, voter_id: VoterId) -> LedgerResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let has_votes: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM votes WHERE voter_id = ?1)
                 OR EXISTS(SELECT 1 FROM ranked_ballots WHERE voter_id = ?1);",
            [voter_id],
            |row| row.get(0),
        )?;
        if has_votes == 1 {
            return Err(LedgerError::VoterHasVotes(voter_id));
        }

        let changed = tx.execute("DELETE FROM voters WHERE voter_id = ?1;", [voter_id])?;
        if changed == 0 {
            return Err(LedgerError::VoterNotFound(voter_id));
        }

        tx.commit()?;
        Ok(())
    }
}

/// Loads one voter row, or `None` when the id is unknown.
pub(crate) fn load_voter(conn: &Connection, voter_id: VoterId) -> LedgerResult<Option<Voter>> {
    let row = conn
        .query_row(
            &format!("{VOTER_SELECT_SQL} WHERE voter_id = ?1;"),
            [voter_id],
            |row| Ok(parse_voter_row(row)),
        )
        .optional()?;
    row.transpose()
}

fn parse_voter_row(row: &Row<'_>) -> LedgerResult<Voter> {
    let age: i64 = row.get("age")?;
    let age = u32::try_from(age)
        .map_err(|_| LedgerError::InvalidData(format!("invalid age `{age}` in voters.age")))?;

    Ok(Voter {
        voter_id: row.get("voter_id")?,
        name: row.get("name")?,
        age,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
