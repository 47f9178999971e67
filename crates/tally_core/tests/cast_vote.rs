use rusqlite::Connection;
use std::cell::Cell;
use tally_core::db::open_db_in_memory;
use tally_core::{
    Candidate, CandidateFilter, CandidateId, ErrorKind, LedgerError, LedgerResult, LedgerStore,
    NewVoter, RankedBallot, SqliteLedgerStore, SqliteVoterDirectory, TallyEngine, TallyError,
    Vote, Voter, VoterDirectory, VoterId,
};

fn add_voter(conn: &Connection, age: u32) -> i64 {
    SqliteVoterDirectory::new(conn)
        .create_voter(&NewVoter::new("voter", age))
        .unwrap()
        .voter_id
}

fn vote_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM votes;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn cast_vote_records_vote_and_increments_tally() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 25);

    let vote = engine.cast_vote(voter_id, candidate.candidate_id).unwrap();
    assert_eq!(vote.voter_id, voter_id);
    assert_eq!(vote.candidate_id, candidate.candidate_id);
    assert!(vote.created_at > 0);

    let count = engine
        .get_candidate_vote_count(candidate.candidate_id)
        .unwrap();
    assert_eq!(count.candidate_id, candidate.candidate_id);
    assert_eq!(count.votes, 1);
}

#[test]
fn returned_vote_is_listed_for_candidate() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 33);

    let vote = engine.cast_vote(voter_id, candidate.candidate_id).unwrap();
    let listed = SqliteLedgerStore::new(&conn)
        .list_votes_by_candidate(candidate.candidate_id)
        .unwrap();
    assert_eq!(listed, vec![vote]);
}

#[test]
fn weight_is_recorded_but_tally_moves_by_one() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Grace", "Compiler").unwrap();
    let senior = add_voter(&conn, 50);
    let middle = add_voter(&conn, 41);

    let first = engine.cast_vote(senior, candidate.candidate_id).unwrap();
    let second = engine.cast_vote(middle, candidate.candidate_id).unwrap();
    assert_eq!(first.weight, 4);
    assert_eq!(second.weight, 3);

    let count = engine
        .get_candidate_vote_count(candidate.candidate_id)
        .unwrap();
    assert_eq!(count.votes, 2);
}

#[test]
fn zero_votes_is_a_count_not_an_error() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();

    let count = engine
        .get_candidate_vote_count(candidate.candidate_id)
        .unwrap();
    assert_eq!(count.votes, 0);
}

#[test]
fn vote_count_for_missing_candidate_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));

    let err = engine.get_candidate_vote_count(404).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn unknown_candidate_or_voter_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let first = engine.register_candidate("Ada", "Analytical").unwrap();
    let second = engine.register_candidate("Grace", "Compiler").unwrap();
    let voter_id = add_voter(&conn, 28);
    engine.cast_vote(voter_id, first.candidate_id).unwrap();

    let missing_candidate = engine.cast_vote(voter_id, 999).unwrap_err();
    assert!(matches!(
        missing_candidate,
        TallyError::Ledger(LedgerError::CandidateNotFound(999))
    ));
    assert_eq!(missing_candidate.kind(), ErrorKind::NotFound);

    let missing_voter = engine.cast_vote(777, second.candidate_id).unwrap_err();
    assert!(matches!(
        missing_voter,
        TallyError::Ledger(LedgerError::VoterNotFound(777))
    ));
    assert_eq!(missing_voter.kind(), ErrorKind::NotFound);

    let tallies: Vec<u64> = engine
        .list_candidates(None)
        .unwrap()
        .iter()
        .map(|candidate| candidate.votes_count)
        .collect();
    assert_eq!(tallies, vec![1, 0]);
    assert_eq!(vote_rows(&conn), 1);
}

#[test]
fn ledger_append_rejects_unknown_references_without_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let candidate = store.create_candidate("Ada", "Analytical").unwrap();

    let err = store.append_vote(12, candidate.candidate_id, 1).unwrap_err();
    assert!(matches!(err, LedgerError::VoterNotFound(12)));
    assert_eq!(
        store
            .get_candidate(candidate.candidate_id)
            .unwrap()
            .votes_count,
        0
    );
    assert_eq!(vote_rows(&conn), 0);
}

#[test]
fn underage_voter_is_rejected_as_invalid_input() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 17);

    let err = engine.cast_vote(voter_id, candidate.candidate_id).unwrap_err();
    assert!(matches!(err, TallyError::Ineligible { age: 17, .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(vote_rows(&conn), 0);
}

#[test]
fn register_candidate_rejects_blank_fields_and_normalizes_labels() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));

    let missing_name = engine.register_candidate("   ", "Analytical").unwrap_err();
    assert_eq!(missing_name.kind(), ErrorKind::InvalidInput);
    let missing_party = engine.register_candidate("Ada", "").unwrap_err();
    assert_eq!(missing_party.kind(), ErrorKind::InvalidInput);
    assert!(engine.list_candidates(None).unwrap().is_empty());

    let candidate = engine
        .register_candidate("  Ada   Lovelace ", " Analytical  Engine")
        .unwrap();
    assert_eq!(candidate.name, "Ada Lovelace");
    assert_eq!(candidate.party, "Analytical Engine");
    assert_eq!(candidate.votes_count, 0);
}

#[test]
fn list_candidates_filters_by_exact_party() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let ada = store.create_candidate("Ada", "Blue").unwrap();
    store.create_candidate("Grace", "Green").unwrap();
    let alan = store.create_candidate("Alan", "Blue").unwrap();
    store.create_candidate("Edsger", "blue").unwrap();

    let blue = store
        .list_candidates(&CandidateFilter::by_party("Blue"))
        .unwrap();
    let ids: Vec<i64> = blue.iter().map(|candidate| candidate.candidate_id).collect();
    assert_eq!(ids, vec![ada.candidate_id, alan.candidate_id]);

    let engine = TallyEngine::new(store);
    assert_eq!(engine.list_candidates(None).unwrap().len(), 4);
    assert!(engine.list_candidates(Some("Red")).unwrap().is_empty());
}

#[test]
fn timeline_lists_votes_oldest_first() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 60);

    let cast: Vec<_> = (0..3)
        .map(|_| engine.cast_vote(voter_id, candidate.candidate_id).unwrap())
        .collect();

    let timeline = engine.vote_timeline(candidate.candidate_id).unwrap();
    let timeline_ids: Vec<_> = timeline.iter().map(|entry| entry.vote_id).collect();
    let cast_ids: Vec<_> = cast.iter().map(|vote| vote.vote_id).collect();
    assert_eq!(timeline_ids, cast_ids);
    assert!(timeline
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));

    let err = engine.vote_timeline(31337).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn range_counts_are_inclusive_and_validated() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 22);
    let vote = engine.cast_vote(voter_id, candidate.candidate_id).unwrap();

    let exact = engine
        .votes_in_range(candidate.candidate_id, vote.created_at, vote.created_at)
        .unwrap();
    assert_eq!(exact.votes_gained, 1);
    assert_eq!(exact.from, vote.created_at);
    assert_eq!(exact.to, vote.created_at);

    let before = engine
        .votes_in_range(candidate.candidate_id, 0, vote.created_at - 1)
        .unwrap();
    assert_eq!(before.votes_gained, 0);

    let inverted = engine
        .votes_in_range(candidate.candidate_id, 10, 5)
        .unwrap_err();
    assert!(matches!(inverted, TallyError::InvalidRange { from: 10, to: 5 }));
    assert_eq!(inverted.kind(), ErrorKind::InvalidInput);
}

#[test]
fn failed_tally_update_rolls_back_vote_row() {
    let conn = open_db_in_memory().unwrap();
    let engine = TallyEngine::new(SqliteLedgerStore::new(&conn));
    let candidate = engine.register_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 44);
    conn.execute_batch(
        "CREATE TRIGGER reject_tally_update BEFORE UPDATE ON candidates
         BEGIN
             SELECT RAISE(ABORT, 'tally update rejected');
         END;",
    )
    .unwrap();

    let err = engine.cast_vote(voter_id, candidate.candidate_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(err.to_string().contains("tally update rejected"));
    assert_eq!(vote_rows(&conn), 0);

    conn.execute_batch("DROP TRIGGER reject_tally_update;").unwrap();
    let count = engine
        .get_candidate_vote_count(candidate.candidate_id)
        .unwrap();
    assert_eq!(count.votes, 0);
}

#[test]
fn append_rejects_weight_that_no_longer_matches_voter_age() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let candidate = store.create_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 35);

    let err = store.append_vote(voter_id, candidate.candidate_id, 1).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::StaleWeight {
            expected: 1,
            current: 2,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(vote_rows(&conn), 0);
    assert_eq!(
        store
            .get_candidate(candidate.candidate_id)
            .unwrap()
            .votes_count,
        0
    );
}

#[test]
fn append_rechecks_eligibility_inside_transaction() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::new(&conn);
    let candidate = store.create_candidate("Ada", "Analytical").unwrap();
    let voter_id = add_voter(&conn, 20);
    conn.execute("UPDATE voters SET age = 16 WHERE voter_id = ?1;", [voter_id])
        .unwrap();

    let err = store.append_vote(voter_id, candidate.candidate_id, 1).unwrap_err();
    assert!(matches!(err, LedgerError::VoterIneligible { age: 16, .. }));
    assert_eq!(vote_rows(&conn), 0);
}

/// Ledger that changes the voter's age right before the first append.
struct AgeChangingStore<'conn> {
    inner: SqliteLedgerStore<'conn>,
    conn: &'conn Connection,
    new_age: u32,
    appends: Cell<u32>,
}

impl LedgerStore for AgeChangingStore<'_> {
    fn create_candidate(&self, name: &str, party: &str) -> LedgerResult<Candidate> {
        self.inner.create_candidate(name, party)
    }

    fn get_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Candidate> {
        self.inner.get_candidate(candidate_id)
    }

    fn list_candidates(&self, filter: &CandidateFilter) -> LedgerResult<Vec<Candidate>> {
        self.inner.list_candidates(filter)
    }

    fn get_voter(&self, voter_id: VoterId) -> LedgerResult<Voter> {
        self.inner.get_voter(voter_id)
    }

    fn append_vote(
        &self,
        voter_id: VoterId,
        candidate_id: CandidateId,
        weight: u32,
    ) -> LedgerResult<Vote> {
        if self.appends.get() == 0 {
            SqliteVoterDirectory::new(self.conn).update_voter(voter_id, "voter", self.new_age)?;
        }
        self.appends.set(self.appends.get() + 1);
        self.inner.append_vote(voter_id, candidate_id, weight)
    }

    fn list_votes_by_candidate(&self, candidate_id: CandidateId) -> LedgerResult<Vec<Vote>> {
        self.inner.list_votes_by_candidate(candidate_id)
    }

    fn count_votes_in_range(
        &self,
        candidate_id: CandidateId,
        from_ms: i64,
        to_ms: i64,
    ) -> LedgerResult<u64> {
        self.inner.count_votes_in_range(candidate_id, from_ms, to_ms)
    }

    fn append_ranked_ballot(
        &self,
        election_id: &str,
        voter_id: VoterId,
        ranking: &[CandidateId],
    ) -> LedgerResult<RankedBallot> {
        self.inner.append_ranked_ballot(election_id, voter_id, ranking)
    }

    fn list_ranked_ballots(&self, election_id: &str) -> LedgerResult<Vec<RankedBallot>> {
        self.inner.list_ranked_ballots(election_id)
    }
}

#[test]
fn cast_vote_records_weight_of_voter_as_committed() {
    let conn = open_db_in_memory().unwrap();
    let candidate = SqliteLedgerStore::new(&conn)
        .create_candidate("Ada", "Analytical")
        .unwrap();
    let voter_id = add_voter(&conn, 25);
    let engine = TallyEngine::new(AgeChangingStore {
        inner: SqliteLedgerStore::new(&conn),
        conn: &conn,
        new_age: 52,
        appends: Cell::new(0),
    });

    let vote = engine.cast_vote(voter_id, candidate.candidate_id).unwrap();
    assert_eq!(vote.weight, 4);
    assert_eq!(vote_rows(&conn), 1);
}

#[test]
fn cast_vote_rejects_voter_who_became_underage_before_commit() {
    let conn = open_db_in_memory().unwrap();
    let candidate = SqliteLedgerStore::new(&conn)
        .create_candidate("Ada", "Analytical")
        .unwrap();
    let voter_id = add_voter(&conn, 25);
    let engine = TallyEngine::new(AgeChangingStore {
        inner: SqliteLedgerStore::new(&conn),
        conn: &conn,
        new_age: 17,
        appends: Cell::new(0),
    });

    let err = engine.cast_vote(voter_id, candidate.candidate_id).unwrap_err();
    assert!(matches!(err, TallyError::Ineligible { age: 17, .. }));
    assert_eq!(vote_rows(&conn), 0);
}
