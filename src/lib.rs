//! DICEBET — account ledger and dice-bet settlement API
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod storage;
pub mod engine;
pub mod api;
