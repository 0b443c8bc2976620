//! Shared types for DICEBET.
//!
//! These types form the data model used across all modules: the two
//! persisted records (users and bets), their insert shapes, and the
//! error taxonomy surfaced at the API boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::StorageError;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account holder with a single-currency cash balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Spendable balance. Never negative after a completed operation.
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} (balance: {})", self.id, self.name, self.balance)
    }
}

/// Insert shape for a user row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// A settled bet. Append-only: created once with its balance update,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: i64,
    pub user_id: i64,
    pub bet_amount: Decimal,
    /// Declared win probability in [0, 1].
    pub chance: Decimal,
    /// `bet_amount / chance` on a win, zero on a loss.
    pub payout: Decimal,
    pub win: bool,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    /// Balance delta this bet applied to its owner.
    pub fn net(&self) -> Decimal {
        self.payout - self.bet_amount
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bet #{} user={} stake={} chance={} payout={} {}",
            self.id,
            self.user_id,
            self.bet_amount,
            self.chance,
            self.payout,
            if self.win { "WIN" } else { "LOSS" },
        )
    }
}

/// Insert shape for a bet row, with the outcome already decided.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBet {
    pub user_id: i64,
    pub bet_amount: Decimal,
    pub chance: Decimal,
    pub payout: Decimal,
    pub win: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Request-scoped failures. None of these are fatal to the server and
/// every one of them leaves persisted state untouched.
#[derive(Debug, thiserror::Error)]
pub enum DicebetError {
    #[error("User not found")]
    UserNotFound(i64),

    #[error("Bet not found")]
    BetNotFound(i64),

    #[error("Chance must be between 0 and 1")]
    InvalidChance(Decimal),

    #[error("Bet amount must be greater than 0")]
    InvalidStake(Decimal),

    #[error("Insufficient balance")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User has bet history and cannot be deleted")]
    UserHasBets(i64),

    #[error("Balance changed concurrently, please retry")]
    StaleBalance(i64),

    #[error("Payout exceeds the representable amount")]
    PayoutOverflow,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DicebetError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::BetNotFound(_) => "BET_NOT_FOUND",
            Self::InvalidChance(_) => "INVALID_CHANCE",
            Self::InvalidStake(_) => "INVALID_STAKE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UserHasBets(_) => "USER_HAS_BETS",
            Self::StaleBalance(_) => "STALE_BALANCE",
            Self::PayoutOverflow => "PAYOUT_OVERFLOW",
            Self::Storage(_) => "INTERNAL",
        }
    }
}

pub type Result<T, E = DicebetError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
