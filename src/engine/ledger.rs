//! Account ledger — the only writer of user balances.
//!
//! Every balance change goes through a guarded write against the balance
//! that was read, and every writer for a given user first takes that
//! user's async lock, so read-modify-write cycles never interleave.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::storage::{DeleteOutcome, Store};
use crate::types::{Bet, DicebetError, NewBet, NewUser, Result, User};

/// Idle lock entries are swept once the map grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

// ---------------------------------------------------------------------------
// Per-user locks
// ---------------------------------------------------------------------------

/// One async mutex per user id, created on demand.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= LOCK_PRUNE_THRESHOLD {
                // Only the map holds an Arc with count 1: no guard, no waiter.
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct AccountLedger {
    store: Arc<dyn Store>,
    locks: UserLocks,
    settle_attempts: u32,
}

impl AccountLedger {
    /// `settle_attempts` bounds how often a guarded write is retried after
    /// losing a race with a writer outside this process.
    pub fn new(store: Arc<dyn Store>, settle_attempts: u32) -> Self {
        Self {
            store,
            locks: UserLocks::default(),
            settle_attempts: settle_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn settle_attempts(&self) -> u32 {
        self.settle_attempts
    }

    /// Serialize balance work for one user. Hold the guard for the whole
    /// read → decide → write cycle.
    pub async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
        self.locks.acquire(user_id).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        match self.store.get_user(id).await? {
            Some(user) => {
                debug!(user_id = id, balance = %user.balance, "Fetched user");
                Ok(user)
            }
            None => {
                warn!(user_id = id, "User not found");
                Err(DicebetError::UserNotFound(id))
            }
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = self.store.list_users().await?;
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    pub async fn create_user(&self, name: &str, balance: Decimal) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DicebetError::InvalidInput("name must not be empty".into()));
        }
        if balance < Decimal::ZERO {
            return Err(DicebetError::InvalidInput(
                "balance must not be negative".into(),
            ));
        }

        let user = self
            .store
            .create_user(&NewUser {
                name: name.to_string(),
                balance,
            })
            .await?;
        info!(user_id = user.id, balance = %user.balance, "User created");
        Ok(user)
    }

    /// Returns `false` when no such user exists.
    pub async fn delete_user(&self, id: i64) -> Result<bool> {
        let _guard = self.lock_user(id).await;
        match self.store.delete_user(id).await? {
            DeleteOutcome::Deleted => {
                info!(user_id = id, "User deleted");
                Ok(true)
            }
            DeleteOutcome::NotFound => Ok(false),
            DeleteOutcome::HasBets => Err(DicebetError::UserHasBets(id)),
        }
    }

    /// Atomically add `delta` (either sign) to a user's balance.
    pub async fn apply_delta(&self, id: i64, delta: Decimal) -> Result<User> {
        let _guard = self.lock_user(id).await;

        for attempt in 1..=self.settle_attempts {
            let user = self.get_user(id).await?;
            let new_balance = user
                .balance
                .checked_add(delta)
                .ok_or(DicebetError::PayoutOverflow)?;
            if new_balance < Decimal::ZERO {
                return Err(DicebetError::InsufficientBalance {
                    needed: -delta,
                    available: user.balance,
                });
            }

            if self
                .store
                .compare_and_set_balance(id, user.balance, new_balance)
                .await?
            {
                info!(user_id = id, %delta, balance = %new_balance, "Balance updated");
                return Ok(User {
                    balance: new_balance,
                    ..user
                });
            }
            warn!(user_id = id, attempt, "Balance changed underneath update, retrying");
        }

        Err(DicebetError::StaleBalance(id))
    }

    /// Apply a decided bet against the `user` snapshot and record it, as one
    /// unit. The caller must hold `lock_user(user.id)` and have checked
    /// funds against the same snapshot.
    pub async fn settle(&self, user: &User, bet: NewBet) -> Result<Bet> {
        let new_balance = user
            .balance
            .checked_add(bet.payout)
            .and_then(|b| b.checked_sub(bet.bet_amount))
            .ok_or(DicebetError::PayoutOverflow)?;
        if new_balance < Decimal::ZERO {
            return Err(DicebetError::InsufficientBalance {
                needed: bet.bet_amount,
                available: user.balance,
            });
        }

        match self.store.settle_bet(user.balance, new_balance, &bet).await? {
            Some(stored) => Ok(stored),
            None => Err(DicebetError::StaleBalance(user.id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
