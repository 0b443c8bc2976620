//! Core engine — account ledger and bet settlement.

pub mod ledger;
pub mod settlement;
pub mod leaderboard;

pub use ledger::AccountLedger;
pub use settlement::{BetSettlement, Dice, Outcome, ThreadRngDice, Wager};
