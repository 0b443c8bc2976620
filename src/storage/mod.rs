//! Persistence layer.
//!
//! Defines the `Store` trait the ledger and settlement engine talk to,
//! and a SQLite implementation on `sqlx`. The trait is deliberately
//! narrow: plain row access plus two guarded writes (`compare_and_set_balance`
//! and `settle_bet`) that never overwrite a balance they did not read.

pub mod sqlite;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Bet, NewBet, NewUser, User};

pub use sqlite::SqliteStore;

/// Failures from the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {column} value {value:?}: {reason}")]
    Decode {
        column: &'static str,
        value: String,
        reason: String,
    },
}

/// Result of a user deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Bets reference the user; history is append-only so the row stays.
    HasBets,
}

/// Abstraction over the user/bet tables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> Result<User, StorageError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    async fn delete_user(&self, id: i64) -> Result<DeleteOutcome, StorageError>;

    /// Set `balance = new` only if it still equals `expected`.
    /// Returns false when the row is missing or was changed by someone else.
    async fn compare_and_set_balance(
        &self,
        id: i64,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, StorageError>;

    /// Move the owner's balance from `expected_balance` to `new_balance`
    /// and append the bet, in one transaction. Returns `None` (and writes
    /// nothing) when the balance no longer equals `expected_balance`.
    async fn settle_bet(
        &self,
        expected_balance: Decimal,
        new_balance: Decimal,
        bet: &NewBet,
    ) -> Result<Option<Bet>, StorageError>;

    async fn get_bet(&self, id: i64) -> Result<Option<Bet>, StorageError>;

    /// All bets, ordered by id.
    async fn list_bets(&self) -> Result<Vec<Bet>, StorageError>;

    /// Bets that can be the best bet of a user ranked in the top `limit`
    /// by best payout. A superset of the exact answer, bounded by roughly
    /// one row per ranked user; `engine::leaderboard` picks the winners.
    async fn best_bet_candidates(&self, limit: usize) -> Result<Vec<Bet>, StorageError>;

    async fn health_check(&self) -> Result<(), StorageError>;
}
