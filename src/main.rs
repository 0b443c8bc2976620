//! DICEBET — account ledger and dice-bet settlement API
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, wires the ledger and settlement engine together,
//! and serves the API until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use dicebet::api::{self, ApiState};
use dicebet::config;
use dicebet::engine::{AccountLedger, BetSettlement, ThreadRngDice};
use dicebet::storage::SqliteStore;

const BANNER: &str = r#"
 ____  ___ ____ _____ ____  _____ _____
|  _ \|_ _/ ___| ____| __ )| ____|_   _|
| | | || | |   |  _| |  _ \|  _|   | |
| |_| || | |___| |___| |_) | |___  | |
|____/|___\____|_____|____/|_____| |_|

  Single-balance dice betting API
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::from_env()?;

    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        addr = %cfg.bind_addr(),
        database = %cfg.database.url,
        settle_attempts = cfg.betting.settle_attempts,
        "DICEBET starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = SqliteStore::connect(&cfg.database.url, cfg.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database.url))?;

    let ledger = Arc::new(AccountLedger::new(
        Arc::new(store),
        cfg.betting.settle_attempts,
    ));
    let bets = Arc::new(BetSettlement::new(ledger, Arc::new(ThreadRngDice)));
    let state = Arc::new(ApiState::new(bets));

    // -- Serve -----------------------------------------------------------

    api::serve(state, &cfg.bind_addr(), shutdown_signal()).await?;

    info!("DICEBET shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received.");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));

    let json_logging = cfg.logging.json || std::env::var("DICEBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
