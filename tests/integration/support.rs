//! Test doubles and fixtures shared by the integration tests.
//!
//! `ScriptedDice` replays a fixed list of rolls so outcomes are known in
//! advance; `TempDb` is a file-backed SQLite database that is removed
//! when dropped.

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use dicebet::engine::{AccountLedger, BetSettlement, Dice};
use dicebet::storage::SqliteStore;
use dicebet::types::User;

/// Wins for any chance above zero.
pub const WIN: f64 = 0.0;
/// Loses for any chance up to 0.99.
pub const LOSS: f64 = 0.99;

/// Deterministic dice: hands out `rolls` in order, wrapping around.
pub struct ScriptedDice {
    rolls: Vec<f64>,
    next: AtomicUsize,
}

impl ScriptedDice {
    pub fn new(rolls: Vec<f64>) -> Self {
        assert!(!rolls.is_empty(), "scripted dice needs at least one roll");
        Self {
            rolls,
            next: AtomicUsize::new(0),
        }
    }

    /// `wins` winning rolls followed by `losses` losing rolls.
    pub fn split(wins: usize, losses: usize) -> Self {
        let mut rolls = vec![WIN; wins];
        rolls.extend(std::iter::repeat(LOSS).take(losses));
        Self::new(rolls)
    }

    pub fn rolls_used(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl Dice for ScriptedDice {
    fn roll(&self) -> f64 {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.rolls[i % self.rolls.len()]
    }
}

/// File-backed database in the temp dir, deleted on drop.
pub struct TempDb {
    path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("dicebet_test_{}.db", Uuid::new_v4()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

/// Engine over a file-backed database with a multi-connection pool, so
/// concurrent placements really run on separate connections.
pub async fn file_engine(db: &TempDb, dice: Arc<dyn Dice>) -> BetSettlement {
    let store = SqliteStore::connect(&db.url(), 4).await.unwrap();
    let ledger = Arc::new(AccountLedger::new(Arc::new(store), 3));
    BetSettlement::new(ledger, dice)
}

pub async fn memory_engine(dice: Arc<dyn Dice>) -> BetSettlement {
    let store = SqliteStore::in_memory().await.unwrap();
    let ledger = Arc::new(AccountLedger::new(Arc::new(store), 3));
    BetSettlement::new(ledger, dice)
}

pub async fn create_user(engine: &BetSettlement, name: &str, balance: Decimal) -> User {
    engine.ledger().create_user(name, balance).await.unwrap()
}

pub async fn balance_of(engine: &BetSettlement, id: i64) -> Decimal {
    engine.ledger().get_user(id).await.unwrap().balance
}
