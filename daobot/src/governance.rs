//! Governance proposals and token-weighted voting.
//!
//! Proposals and votes live in SQLite. A vote's weight is the voter's token
//! balance at cast time; one row per (proposal, voter) with the last vote
//! overwriting both choice and weight. Zero-balance votes are accepted and
//! recorded with weight 0 — they count a voter, not influence.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::wallet::{BalanceSource, WalletError};

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    UnknownProposal(i64),
    #[error("proposal {0} is closed")]
    ProposalClosed(i64),
    #[error("insufficient balance to propose: need {required}, have {held}")]
    InsufficientBalance { required: u64, held: u64 },
    #[error("only the proposer can close proposal {0}")]
    NotProposer(i64),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    Yes,
    No,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::Yes => "yes",
            VoteChoice::No => "no",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(VoteChoice::Yes),
            "no" => Some(VoteChoice::No),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Open,
    Closed,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Open => "open",
            ProposalStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub proposer: String,
    pub status: ProposalStatus,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub proposal_id: i64,
    pub voter: String,
    pub choice: VoteChoice,
    pub weight: u64,
    pub cast_at: String,
}

/// Aggregate vote weights for a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub yes_weight: u64,
    pub no_weight: u64,
    pub voters: u64,
}

impl Tally {
    pub fn total_weight(&self) -> u64 {
        self.yes_weight + self.no_weight
    }
}

/// Result of closing a proposal.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub passed: bool,
    pub tally: Tally,
}

/// SQLite-backed proposal and vote storage.
pub struct VoteStore {
    db: Mutex<Connection>,
}

impl VoteStore {
    /// Open or create the governance database.
    pub fn open(path: &Path) -> Result<Self, GovernanceError> {
        let db = Connection::open(path)?;
        Self::init(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, GovernanceError> {
        let db = Connection::open_in_memory()?;
        Self::init(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init(db: &Connection) -> Result<(), GovernanceError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS proposals (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                proposer    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'open',
                created_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS votes (
                proposal_id INTEGER NOT NULL,
                voter       TEXT NOT NULL,
                choice      TEXT NOT NULL,
                weight      INTEGER NOT NULL,
                cast_at     TEXT NOT NULL,
                PRIMARY KEY (proposal_id, voter)
            );",
        )?;
        Ok(())
    }

    pub fn create(
        &self,
        title: &str,
        description: &str,
        proposer: &str,
    ) -> Result<Proposal, GovernanceError> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO proposals (title, description, proposer, status, created_at)
             VALUES (?1, ?2, ?3, 'open', ?4)",
            params![title, description, proposer, now],
        )?;
        let id = db.last_insert_rowid();
        Ok(Proposal {
            id,
            title: title.to_string(),
            description: description.to_string(),
            proposer: proposer.to_string(),
            status: ProposalStatus::Open,
            created_at: now,
        })
    }

    pub fn proposal(&self, id: i64) -> Result<Option<Proposal>, GovernanceError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT id, title, description, proposer, status, created_at
                 FROM proposals WHERE id = ?1",
                params![id],
                row_to_proposal,
            )
            .optional()?;
        Ok(row)
    }

    /// All proposals, newest first.
    pub fn proposals(&self) -> Result<Vec<Proposal>, GovernanceError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, title, description, proposer, status, created_at
             FROM proposals ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_proposal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record a vote. Replaces any prior vote by the same voter.
    pub fn record_vote(
        &self,
        proposal_id: i64,
        voter: &str,
        choice: VoteChoice,
        weight: u64,
    ) -> Result<Vote, GovernanceError> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT OR REPLACE INTO votes (proposal_id, voter, choice, weight, cast_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![proposal_id, voter, choice.as_str(), weight as i64, now],
        )?;
        Ok(Vote {
            proposal_id,
            voter: voter.to_string(),
            choice,
            weight,
            cast_at: now,
        })
    }

    pub fn vote(&self, proposal_id: i64, voter: &str) -> Result<Option<Vote>, GovernanceError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT proposal_id, voter, choice, weight, cast_at
                 FROM votes WHERE proposal_id = ?1 AND voter = ?2",
                params![proposal_id, voter],
                |row| {
                    Ok(Vote {
                        proposal_id: row.get(0)?,
                        voter: row.get(1)?,
                        choice: VoteChoice::parse(&row.get::<_, String>(2)?)
                            .unwrap_or(VoteChoice::No),
                        weight: row.get::<_, i64>(3)? as u64,
                        cast_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn tally(&self, proposal_id: i64) -> Result<Tally, GovernanceError> {
        let db = self.db.lock().unwrap();
        let (yes, no, voters) = db.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN choice = 'yes' THEN weight ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN choice = 'no' THEN weight ELSE 0 END), 0),
                COUNT(*)
             FROM votes WHERE proposal_id = ?1",
            params![proposal_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;
        Ok(Tally {
            yes_weight: yes as u64,
            no_weight: no as u64,
            voters: voters as u64,
        })
    }

    fn set_closed(&self, proposal_id: i64) -> Result<(), GovernanceError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE proposals SET status = 'closed' WHERE id = ?1",
            params![proposal_id],
        )?;
        Ok(())
    }
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Proposal> {
    let status: String = row.get(4)?;
    Ok(Proposal {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        proposer: row.get(3)?,
        status: if status == "closed" {
            ProposalStatus::Closed
        } else {
            ProposalStatus::Open
        },
        created_at: row.get(5)?,
    })
}

/// Governance service: proposal lifecycle plus balance-weighted voting.
pub struct Governance<B> {
    store: Arc<VoteStore>,
    balances: B,
    min_propose_balance: u64,
    quorum_weight: u64,
}

impl<B: BalanceSource> Governance<B> {
    pub fn new(store: Arc<VoteStore>, balances: B, min_propose_balance: u64, quorum_weight: u64) -> Self {
        Self {
            store,
            balances,
            min_propose_balance,
            quorum_weight,
        }
    }

    /// Create a proposal. Requires the proposer to hold the configured
    /// minimum balance.
    pub async fn propose(
        &self,
        title: &str,
        description: &str,
        proposer: &str,
    ) -> Result<Proposal, GovernanceError> {
        let held = self.balances.balance(proposer).await?;
        if held < self.min_propose_balance {
            return Err(GovernanceError::InsufficientBalance {
                required: self.min_propose_balance,
                held,
            });
        }
        let proposal = self.store.create(title, description, proposer)?;
        tracing::info!(id = proposal.id, proposer, "Created proposal");
        Ok(proposal)
    }

    /// Cast a vote weighted by the voter's balance at cast time.
    ///
    /// Fails closed: a wallet lookup error records nothing. Voting again
    /// replaces the prior vote with the new choice and a fresh weight.
    pub async fn cast_vote(
        &self,
        proposal_id: i64,
        voter: &str,
        choice: VoteChoice,
    ) -> Result<Vote, GovernanceError> {
        let proposal = self
            .store
            .proposal(proposal_id)?
            .ok_or(GovernanceError::UnknownProposal(proposal_id))?;
        if proposal.status == ProposalStatus::Closed {
            return Err(GovernanceError::ProposalClosed(proposal_id));
        }

        let weight = self.balances.balance(voter).await?;
        let vote = self.store.record_vote(proposal_id, voter, choice, weight)?;
        tracing::info!(proposal_id, voter, choice = choice.as_str(), weight, "Recorded vote");
        Ok(vote)
    }

    pub fn proposal(&self, id: i64) -> Result<Proposal, GovernanceError> {
        self.store
            .proposal(id)?
            .ok_or(GovernanceError::UnknownProposal(id))
    }

    pub fn tally(&self, proposal_id: i64) -> Result<Tally, GovernanceError> {
        // Distinguish "no votes" from "no such proposal".
        self.store
            .proposal(proposal_id)?
            .ok_or(GovernanceError::UnknownProposal(proposal_id))?;
        self.store.tally(proposal_id)
    }

    /// Close an open proposal and compute its outcome: passed when total
    /// weight meets quorum and yes outweighs no.
    pub fn close(&self, proposal_id: i64, caller: &str) -> Result<Outcome, GovernanceError> {
        let proposal = self
            .store
            .proposal(proposal_id)?
            .ok_or(GovernanceError::UnknownProposal(proposal_id))?;
        if proposal.status == ProposalStatus::Closed {
            return Err(GovernanceError::ProposalClosed(proposal_id));
        }
        if proposal.proposer != caller {
            return Err(GovernanceError::NotProposer(proposal_id));
        }

        let tally = self.store.tally(proposal_id)?;
        self.store.set_closed(proposal_id)?;
        let passed = tally.total_weight() >= self.quorum_weight && tally.yes_weight > tally.no_weight;
        tracing::info!(proposal_id, passed, "Closed proposal");
        Ok(Outcome { passed, tally })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Balance source with per-user balances; missing users error like a
    /// provider outage.
    struct Balances(HashMap<String, u64>);

    impl BalanceSource for Balances {
        async fn balance(&self, user_id: &str) -> Result<u64, WalletError> {
            self.0
                .get(user_id)
                .copied()
                .ok_or_else(|| WalletError::Provider("down".into()))
        }
    }

    /// Balance source whose answer can change between calls.
    struct Shifting(AtomicU64);

    impl BalanceSource for Shifting {
        async fn balance(&self, _user_id: &str) -> Result<u64, WalletError> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn gov(balances: Vec<(&str, u64)>) -> Governance<Balances> {
        let map = balances
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Governance::new(
            Arc::new(VoteStore::open_memory().unwrap()),
            Balances(map),
            100,
            0,
        )
    }

    #[tokio::test]
    async fn empty_proposal_tallies_zero() {
        let gov = gov(vec![("alice", 500)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();
        let tally = gov.tally(p.id).unwrap();
        assert_eq!(tally, Tally::default());
    }

    #[tokio::test]
    async fn votes_are_balance_weighted() {
        let gov = gov(vec![("alice", 500), ("bob", 200), ("carol", 50)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();

        gov.cast_vote(p.id, "alice", VoteChoice::Yes).await.unwrap();
        gov.cast_vote(p.id, "bob", VoteChoice::No).await.unwrap();
        gov.cast_vote(p.id, "carol", VoteChoice::Yes).await.unwrap();

        let tally = gov.tally(p.id).unwrap();
        assert_eq!(tally.yes_weight, 550);
        assert_eq!(tally.no_weight, 200);
        assert_eq!(tally.voters, 3);
    }

    #[tokio::test]
    async fn revote_replaces_choice_and_weight() {
        let store = Arc::new(VoteStore::open_memory().unwrap());
        let balances = Shifting(AtomicU64::new(500));
        let gov = Governance::new(store, balances, 100, 0);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();

        gov.cast_vote(p.id, "alice", VoteChoice::Yes).await.unwrap();
        // Balance changed before the second vote; the new weight applies.
        gov.balances.0.store(300, Ordering::SeqCst);
        gov.cast_vote(p.id, "alice", VoteChoice::No).await.unwrap();

        let tally = gov.tally(p.id).unwrap();
        assert_eq!(tally.yes_weight, 0);
        assert_eq!(tally.no_weight, 300);
        assert_eq!(tally.voters, 1);
    }

    #[tokio::test]
    async fn zero_balance_vote_is_recorded_with_zero_weight() {
        let gov = gov(vec![("alice", 500), ("pauper", 0)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();

        let vote = gov.cast_vote(p.id, "pauper", VoteChoice::Yes).await.unwrap();
        assert_eq!(vote.weight, 0);

        let tally = gov.tally(p.id).unwrap();
        assert_eq!(tally.yes_weight, 0);
        assert_eq!(tally.voters, 1);
    }

    #[tokio::test]
    async fn wallet_outage_records_nothing() {
        let gov = gov(vec![("alice", 500)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();

        let err = gov.cast_vote(p.id, "ghost", VoteChoice::Yes).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Wallet(_)));
        assert_eq!(gov.tally(p.id).unwrap().voters, 0);
    }

    #[tokio::test]
    async fn unknown_proposal_is_rejected() {
        let gov = gov(vec![("alice", 500)]);
        assert!(matches!(
            gov.cast_vote(42, "alice", VoteChoice::Yes).await,
            Err(GovernanceError::UnknownProposal(42))
        ));
        assert!(matches!(gov.tally(42), Err(GovernanceError::UnknownProposal(42))));
    }

    #[tokio::test]
    async fn closed_proposal_rejects_votes() {
        let gov = gov(vec![("alice", 500), ("bob", 200)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();
        gov.cast_vote(p.id, "alice", VoteChoice::Yes).await.unwrap();
        gov.close(p.id, "alice").unwrap();

        assert!(matches!(
            gov.cast_vote(p.id, "bob", VoteChoice::No).await,
            Err(GovernanceError::ProposalClosed(_))
        ));
    }

    #[tokio::test]
    async fn proposing_requires_minimum_balance() {
        let gov = gov(vec![("pauper", 99)]);
        assert!(matches!(
            gov.propose("fees", "cut fees", "pauper").await,
            Err(GovernanceError::InsufficientBalance { required: 100, held: 99 })
        ));
    }

    #[tokio::test]
    async fn close_outcome_respects_quorum_and_majority() {
        let store = Arc::new(VoteStore::open_memory().unwrap());
        let map = [("alice", 500u64), ("bob", 200)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let gov = Governance::new(store, Balances(map), 100, 1000);

        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();
        gov.cast_vote(p.id, "alice", VoteChoice::Yes).await.unwrap();
        gov.cast_vote(p.id, "bob", VoteChoice::No).await.unwrap();

        // 700 total weight < 1000 quorum: defeated even with yes majority.
        let outcome = gov.close(p.id, "alice").unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.tally.total_weight(), 700);

        // Closing again fails.
        assert!(matches!(
            gov.close(p.id, "alice"),
            Err(GovernanceError::ProposalClosed(_))
        ));
    }

    #[tokio::test]
    async fn only_proposer_closes() {
        let gov = gov(vec![("alice", 500), ("bob", 200)]);
        let p = gov.propose("fees", "cut fees", "alice").await.unwrap();
        assert!(matches!(
            gov.close(p.id, "bob"),
            Err(GovernanceError::NotProposer(_))
        ));
    }

    #[test]
    fn votes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gov.db");

        {
            let store = VoteStore::open(&path).unwrap();
            let p = store.create("fees", "cut fees", "alice").unwrap();
            store.record_vote(p.id, "alice", VoteChoice::Yes, 500).unwrap();
        }

        let store = VoteStore::open(&path).unwrap();
        let p = store.proposals().unwrap().pop().unwrap();
        assert_eq!(p.title, "fees");
        let tally = store.tally(p.id).unwrap();
        assert_eq!(tally.yes_weight, 500);
        assert_eq!(tally.voters, 1);
    }
}
