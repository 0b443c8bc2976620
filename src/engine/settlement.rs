//! Bet settlement — validate, roll, pay out, record.
//!
//! A placement is: validate the wager (no I/O), take the owner's lock,
//! load the balance, check funds, roll the dice, compute the payout, and
//! hand the balance delta plus the bet row to the ledger as one unit.

use rand::Rng;
use rust_decimal::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::leaderboard;
use crate::engine::AccountLedger;
use crate::types::{Bet, DicebetError, NewBet, Result};

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Source of uniform draws in `[0, 1)`. The only randomness in settlement.
#[cfg_attr(test, mockall::automock)]
pub trait Dice: Send + Sync {
    fn roll(&self) -> f64;
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngDice;

impl Dice for ThreadRngDice {
    fn roll(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

// ---------------------------------------------------------------------------
// Wager / outcome
// ---------------------------------------------------------------------------

/// A validated stake and win probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wager {
    pub bet_amount: Decimal,
    pub chance: Decimal,
}

impl Wager {
    /// Chance must lie in `[0, 1]` (both ends allowed), stake must be
    /// strictly positive. Chance is checked first.
    pub fn new(bet_amount: Decimal, chance: Decimal) -> Result<Self> {
        if chance < Decimal::ZERO || chance > Decimal::ONE {
            return Err(DicebetError::InvalidChance(chance));
        }
        if bet_amount <= Decimal::ZERO {
            return Err(DicebetError::InvalidStake(bet_amount));
        }
        Ok(Self { bet_amount, chance })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub win: bool,
    pub payout: Decimal,
}

impl Outcome {
    /// `win = roll < chance`; a win pays `bet_amount / chance`.
    ///
    /// With `chance == 0` no roll in `[0, 1)` wins, so the division only
    /// ever sees a positive chance. With `chance == 1` every roll wins and
    /// the payout equals the stake.
    pub fn decide(wager: &Wager, roll: f64) -> Result<Self> {
        let threshold = wager.chance.to_f64().unwrap_or_default();
        let win = roll < threshold;
        let payout = if win {
            wager
                .bet_amount
                .checked_div(wager.chance)
                .ok_or(DicebetError::PayoutOverflow)?
        } else {
            Decimal::ZERO
        };
        Ok(Self { win, payout })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct BetSettlement {
    ledger: Arc<AccountLedger>,
    dice: Arc<dyn Dice>,
}

impl BetSettlement {
    pub fn new(ledger: Arc<AccountLedger>, dice: Arc<dyn Dice>) -> Self {
        Self { ledger, dice }
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    /// Place and settle a bet for `user_id`.
    ///
    /// Either the balance moves by `payout - bet_amount` and the bet is
    /// stored, or nothing is written at all.
    pub async fn place_bet(
        &self,
        user_id: i64,
        bet_amount: Decimal,
        chance: Decimal,
    ) -> Result<Bet> {
        let wager = Wager::new(bet_amount, chance).inspect_err(|e| {
            warn!(user_id, %bet_amount, %chance, error = %e, "Bet rejected");
        })?;

        let _guard = self.ledger.lock_user(user_id).await;

        let attempts = self.ledger.settle_attempts();
        let mut attempt = 1;
        loop {
            match self.settle_once(user_id, &wager).await {
                Err(DicebetError::StaleBalance(_)) if attempt < attempts => {
                    warn!(user_id, attempt, "Balance moved during settlement, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn settle_once(&self, user_id: i64, wager: &Wager) -> Result<Bet> {
        let user = self.ledger.get_user(user_id).await?;
        if user.balance < wager.bet_amount {
            warn!(
                user_id,
                balance = %user.balance,
                bet_amount = %wager.bet_amount,
                "Insufficient balance"
            );
            return Err(DicebetError::InsufficientBalance {
                needed: wager.bet_amount,
                available: user.balance,
            });
        }

        let roll = self.dice.roll();
        let outcome = Outcome::decide(wager, roll)?;
        debug!(user_id, roll, win = outcome.win, "Dice rolled");

        let bet = self
            .ledger
            .settle(
                &user,
                NewBet {
                    user_id,
                    bet_amount: wager.bet_amount,
                    chance: wager.chance,
                    payout: outcome.payout,
                    win: outcome.win,
                },
            )
            .await?;

        info!(
            bet_id = bet.id,
            user_id,
            bet_amount = %bet.bet_amount,
            chance = %bet.chance,
            payout = %bet.payout,
            win = bet.win,
            balance = %(user.balance + bet.payout - bet.bet_amount),
            "Bet settled"
        );
        Ok(bet)
    }

    pub async fn get_bet(&self, id: i64) -> Result<Bet> {
        self.ledger
            .store()
            .get_bet(id)
            .await?
            .ok_or(DicebetError::BetNotFound(id))
    }

    /// All bets, ordered by id.
    pub async fn list_bets(&self) -> Result<Vec<Bet>> {
        Ok(self.ledger.store().list_bets().await?)
    }

    pub async fn best_bet_per_user(&self, limit: usize) -> Result<Vec<Bet>> {
        let bets = self.ledger.store().best_bet_candidates(limit).await?;
        Ok(leaderboard::best_bet_per_user(&bets, limit))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
