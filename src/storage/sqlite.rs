//! SQLite-backed `Store`.
//!
//! Money columns are TEXT holding normalized `Decimal` strings, so the
//! guarded `UPDATE ... WHERE balance = ?` compares exact values rather
//! than floats.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{DeleteOutcome, Store, StorageError};
use crate::types::{Bet, NewBet, NewUser, User};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
           id         INTEGER PRIMARY KEY AUTOINCREMENT,
           name       TEXT    NOT NULL,
           balance    TEXT    NOT NULL,
           created_at TEXT    NOT NULL
       )"#,
    r#"CREATE TABLE IF NOT EXISTS bets (
           id         INTEGER PRIMARY KEY AUTOINCREMENT,
           user_id    INTEGER NOT NULL REFERENCES users(id),
           bet_amount TEXT    NOT NULL,
           chance     TEXT    NOT NULL,
           payout     TEXT    NOT NULL,
           win        INTEGER NOT NULL,
           created_at TEXT    NOT NULL
       )"#,
    "CREATE INDEX IF NOT EXISTS idx_bets_user_id ON bets (user_id)",
];

const USER_COLUMNS: &str = "id, name, balance, created_at";
const BET_COLUMNS: &str = "id, user_id, bet_amount, chance, payout, win, created_at";

/// SQLite connection pool plus the queries for both tables.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// In-memory databases live and die with their connection, so they are
    /// pinned to a single connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        info!(url, in_memory, "SQLite store ready");
        Ok(store)
    }

    /// Fresh private in-memory database. Used by tests and demos.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "Schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn encode(value: Decimal) -> String {
    value.normalize().to_string()
}

fn decimal_column(row: &SqliteRow, column: &'static str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| StorageError::Decode {
        column,
        reason: e.to_string(),
        value: raw,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, StorageError> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        balance: decimal_column(row, "balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bet_from_row(row: &SqliteRow) -> Result<Bet, StorageError> {
    Ok(Bet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        bet_amount: decimal_column(row, "bet_amount")?,
        chance: decimal_column(row, "chance")?,
        payout: decimal_column(row, "payout")?,
        win: row.try_get("win")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let sql = format!(
            "INSERT INTO users (name, balance, created_at) VALUES (?1, ?2, ?3) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&user.name)
            .bind(encode(user.balance))
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn delete_user(&self, id: i64) -> Result<DeleteOutcome, StorageError> {
        // A single guarded write: in WAL mode a read that later upgrades to
        // a write fails with SQLITE_BUSY instead of waiting on busy_timeout.
        let deleted = sqlx::query(
            "DELETE FROM users WHERE id = ?1 \
             AND NOT EXISTS (SELECT 1 FROM bets WHERE user_id = ?2)",
        )
        .bind(id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if deleted.rows_affected() == 1 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(if exists {
            DeleteOutcome::HasBets
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn compare_and_set_balance(
        &self,
        id: i64,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET balance = ?1 WHERE id = ?2 AND balance = ?3")
            .bind(encode(new))
            .bind(id)
            .bind(encode(expected))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn settle_bet(
        &self,
        expected_balance: Decimal,
        new_balance: Decimal,
        bet: &NewBet,
    ) -> Result<Option<Bet>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE users SET balance = ?1 WHERE id = ?2 AND balance = ?3")
            .bind(encode(new_balance))
            .bind(bet.user_id)
            .bind(encode(expected_balance))
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            debug!(user_id = bet.user_id, "Guarded balance update matched no row");
            return Ok(None);
        }

        let sql = format!(
            "INSERT INTO bets (user_id, bet_amount, chance, payout, win, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {BET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(bet.user_id)
            .bind(encode(bet.bet_amount))
            .bind(encode(bet.chance))
            .bind(encode(bet.payout))
            .bind(bet.win)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        let stored = bet_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn get_bet(&self, id: i64) -> Result<Option<Bet>, StorageError> {
        let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(bet_from_row).transpose()
    }

    async fn list_bets(&self) -> Result<Vec<Bet>, StorageError> {
        let sql = format!("SELECT {BET_COLUMNS} FROM bets ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn best_bet_candidates(&self, limit: usize) -> Result<Vec<Bet>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        // Ranked on REAL, which rounds monotonically: every exact top-`limit`
        // user has a dense rank <= limit, and their exact best bet shares
        // the REAL maximum. Float ties only widen the candidate set.
        let sql = "WITH user_best AS ( \
                       SELECT user_id, MAX(CAST(payout AS REAL)) AS best \
                       FROM bets GROUP BY user_id \
                   ), ranked AS ( \
                       SELECT user_id, best, DENSE_RANK() OVER (ORDER BY best DESC) AS place \
                       FROM user_best \
                   ) \
                   SELECT b.id, b.user_id, b.bet_amount, b.chance, b.payout, b.win, b.created_at \
                   FROM bets b \
                   JOIN ranked r ON r.user_id = b.user_id AND CAST(b.payout AS REAL) = r.best \
                   WHERE r.place <= ?1 \
                   ORDER BY b.id";
        let rows = sqlx::query(sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
