//! Concurrent placements against one database.
//!
//! Outcomes are scripted, so whatever order the tasks run in, the final
//! balance must equal the starting balance plus every settled delta.

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use dicebet::types::DicebetError;

use crate::support::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn same_user_concurrent_bets_lose_no_updates() {
    let db = TempDb::new();
    let dice = Arc::new(ScriptedDice::split(4, 16));
    let engine = Arc::new(file_engine(&db, dice.clone()).await);
    let user = create_user(&engine, "John Doe", dec!(1000)).await;

    let tasks = (0..20).map(|_| {
        let engine = engine.clone();
        let user_id = user.id;
        tokio::spawn(async move { engine.place_bet(user_id, dec!(10), dec!(0.25)).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    // 4 wins at +30, 16 losses at -10.
    assert_eq!(balance_of(&engine, user.id).await, dec!(960));
    assert_eq!(dice.rolls_used(), 20);

    let bets = engine.list_bets().await.unwrap();
    assert_eq!(bets.len(), 20);
    assert_eq!(bets.iter().filter(|b| b.win).count(), 4);
    let net: Decimal = bets.iter().map(|b| b.net()).sum();
    assert_eq!(net, dec!(-40));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_bets_never_overdraw() {
    let db = TempDb::new();
    let engine = Arc::new(file_engine(&db, Arc::new(ScriptedDice::new(vec![LOSS]))).await);
    let user = create_user(&engine, "John Doe", dec!(100)).await;

    let tasks = (0..20).map(|_| {
        let engine = engine.clone();
        let user_id = user.id;
        tokio::spawn(async move { engine.place_bet(user_id, dec!(10), dec!(0.5)).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let settled = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(DicebetError::InsufficientBalance { .. })))
        .count();
    assert_eq!(settled, 10);
    assert_eq!(refused, 10);
    assert_eq!(balance_of(&engine, user.id).await, Decimal::ZERO);
    assert_eq!(engine.list_bets().await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_users_in_parallel_each_balance_matches_history() {
    let db = TempDb::new();
    let dice = Arc::new(ScriptedDice::new(vec![WIN, LOSS, LOSS]));
    let engine = Arc::new(file_engine(&db, dice).await);

    let mut users = Vec::new();
    for i in 0..5 {
        users.push(create_user(&engine, &format!("player-{i}"), dec!(500)).await);
    }

    let tasks = users.iter().flat_map(|user| {
        let user_id = user.id;
        let engine = engine.clone();
        (0..10).map(move |_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.place_bet(user_id, dec!(20), dec!(0.4)).await })
        })
    });
    for result in join_all(tasks.collect::<Vec<_>>()).await {
        result.unwrap().unwrap();
    }

    let bets = engine.list_bets().await.unwrap();
    assert_eq!(bets.len(), 50);
    for user in &users {
        let net: Decimal = bets
            .iter()
            .filter(|b| b.user_id == user.id)
            .map(|b| b.net())
            .sum();
        assert_eq!(balance_of(&engine, user.id).await, dec!(500) + net);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deltas_and_bets_interleave_safely() {
    let db = TempDb::new();
    let engine = Arc::new(file_engine(&db, Arc::new(ScriptedDice::new(vec![LOSS]))).await);
    let user = create_user(&engine, "John Doe", dec!(1000)).await;

    let bet_tasks = (0..10).map(|_| {
        let engine = engine.clone();
        let user_id = user.id;
        tokio::spawn(async move {
            engine.place_bet(user_id, dec!(5), dec!(0.5)).await.map(|_| ())
        })
    });
    let deposit_tasks = (0..10).map(|_| {
        let engine = engine.clone();
        let user_id = user.id;
        tokio::spawn(async move {
            engine.ledger().apply_delta(user_id, dec!(7)).await.map(|_| ())
        })
    });
    let all: Vec<_> = bet_tasks.chain(deposit_tasks).collect();
    for result in join_all(all).await {
        result.unwrap().unwrap();
    }

    // 10 × -5 from bets, 10 × +7 from deposits.
    assert_eq!(balance_of(&engine, user.id).await, dec!(1020));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn deletes_succeed_while_other_users_bet() {
    let db = TempDb::new();
    let engine = Arc::new(file_engine(&db, Arc::new(ScriptedDice::new(vec![WIN, LOSS]))).await);

    let mut players = Vec::new();
    for i in 0..8 {
        players.push(create_user(&engine, &format!("player-{i}"), dec!(10000)).await.id);
    }
    let mut idle = Vec::new();
    for i in 0..40 {
        idle.push(create_user(&engine, &format!("idle-{i}"), dec!(1)).await.id);
    }

    let bet_tasks: Vec<_> = players
        .iter()
        .flat_map(|&user_id| {
            let engine = engine.clone();
            (0..30).map(move |_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.place_bet(user_id, dec!(10), dec!(0.5)).await.map(|_| ())
                })
            })
        })
        .collect();
    let delete_tasks: Vec<_> = idle
        .iter()
        .map(|&user_id| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ledger().delete_user(user_id).await })
        })
        .collect();

    for result in join_all(bet_tasks).await {
        result.unwrap().unwrap();
    }
    for result in join_all(delete_tasks).await {
        assert!(result.unwrap().unwrap());
    }

    assert_eq!(engine.list_bets().await.unwrap().len(), 240);
    let remaining = engine.ledger().list_users().await.unwrap();
    assert_eq!(remaining.len(), players.len());
    for user_id in idle {
        assert!(matches!(
            engine.ledger().get_user(user_id).await,
            Err(DicebetError::UserNotFound(_))
        ));
    }
}
