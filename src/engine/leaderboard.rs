//! Best bet per user.
//!
//! Runs over a snapshot of candidate bets from storage, so it takes no
//! locks and may trail in-flight placements.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::types::Bet;

/// For each user, their highest-payout bet (lowest bet id on ties).
/// Keeps the `limit` highest of those and returns them by payout
/// ascending, bet id breaking ties.
pub fn best_bet_per_user(bets: &[Bet], limit: usize) -> Vec<Bet> {
    let mut best: HashMap<i64, &Bet> = HashMap::new();
    for bet in bets {
        match best.entry(bet.user_id) {
            Entry::Vacant(slot) => {
                slot.insert(bet);
            }
            Entry::Occupied(mut slot) => {
                if beats(bet, slot.get()) {
                    slot.insert(bet);
                }
            }
        }
    }

    let mut rows: Vec<&Bet> = best.into_values().collect();
    rows.sort_by(|a, b| b.payout.cmp(&a.payout).then(a.id.cmp(&b.id)));
    rows.truncate(limit);
    rows.sort_by(|a, b| a.payout.cmp(&b.payout).then(a.id.cmp(&b.id)));
    rows.into_iter().cloned().collect()
}

fn beats(candidate: &Bet, current: &Bet) -> bool {
    candidate.payout > current.payout
        || (candidate.payout == current.payout && candidate.id < current.id)
}
