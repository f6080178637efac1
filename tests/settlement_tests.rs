//! Match settlement scenarios: placement through the betting service,
//! resolution through the engine, and notification delivery through the
//! outbox worker.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use wagerbook_db::{MemoryStore, Store};
use wagerbook_models::{
    BetSelection, BetStatus, BettingStatus, MarketOption, MatchInfo, MatchOdds, MatchResult,
    MatchStatus, NotificationPayload, SpecialMarketOdds, SpecialMarketResult, TeamOdds,
    TransactionKind, WagerError,
};
use wagerbook_services::{
    BettingService, FixedClock, ManualOutcome, MetricsCollector, OutboxWorker, RecordingNotifier,
    SettlementEngine, WalletService,
};

struct Harness {
    store: Arc<MemoryStore>,
    wallets: WalletService<MemoryStore, FixedClock>,
    betting: BettingService<MemoryStore, FixedClock>,
    engine: SettlementEngine<MemoryStore, FixedClock>,
    metrics: Arc<MetricsCollector>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = FixedClock(Utc::now());
    let metrics = Arc::new(MetricsCollector::new());
    Harness {
        wallets: WalletService::new(store.clone(), clock),
        betting: BettingService::new(store.clone(), clock, dec!(1)),
        engine: SettlementEngine::new(store.clone(), clock, metrics.clone()),
        store,
        metrics,
    }
}

fn open_match(id: &str) -> MatchInfo {
    MatchInfo {
        id: id.to_string(),
        title: "Nova Five vs Iron Wolves".to_string(),
        status: MatchStatus::Upcoming,
        betting_status: BettingStatus::Open,
        result: None,
        odds: MatchOdds {
            teams: vec![
                TeamOdds {
                    team_id: "team_101".to_string(),
                    odds: dec!(2.50),
                },
                TeamOdds {
                    team_id: "team_202".to_string(),
                    odds: dec!(1.60),
                },
            ],
            special_markets: vec![SpecialMarketOdds {
                market_id: "first_blood".to_string(),
                options: vec![
                    MarketOption {
                        option_id: "team_101".to_string(),
                        odds: dec!(1.95),
                    },
                    MarketOption {
                        option_id: "team_202".to_string(),
                        odds: dec!(1.85),
                    },
                ],
            }],
        },
        total_bets: 0,
        total_bet_amount: Decimal::ZERO,
        updated_at: Utc::now(),
    }
}

async fn close_match(store: &MemoryStore, id: &str) {
    let mut info = store.match_info(id).await.unwrap();
    info.status = MatchStatus::Completed;
    info.betting_status = BettingStatus::Closed;
    store.upsert_match(&info).await.unwrap();
}

async fn funded_user(h: &Harness, balance: Decimal) -> Uuid {
    let user_id = Uuid::new_v4();
    h.wallets.ensure_wallet(user_id).await.unwrap();
    let deposit = h
        .wallets
        .request_deposit(user_id, balance, "card", None)
        .await
        .unwrap();
    h.wallets
        .complete_transaction(user_id, &deposit.reference)
        .await
        .unwrap();
    user_id
}

fn winner(team_id: &str) -> BetSelection {
    BetSelection::MatchWinner {
        team_id: team_id.to_string(),
    }
}

#[tokio::test]
async fn test_end_to_end_settlement_with_notifications() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();

    let alice = funded_user(&h, dec!(200)).await;
    let bob = funded_user(&h, dec!(200)).await;

    h.betting
        .place_bet(alice, "match_7", winner("team_101"), dec!(100), dec!(2.50))
        .await
        .unwrap();
    h.betting
        .place_bet(bob, "match_7", winner("team_202"), dec!(60), dec!(1.60))
        .await
        .unwrap();
    h.betting
        .place_bet(bob, "match_7", winner("team_202"), dec!(40), dec!(1.60))
        .await
        .unwrap();

    close_match(&h.store, "match_7").await;
    let report = h
        .engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap();

    assert_eq!(report.total_bets, 3);
    assert_eq!(report.winners_paid, 1);
    assert_eq!(report.losers_closed, 2);
    assert_eq!(report.failures, 0);
    assert_eq!(report.total_payout, dec!(250.00));

    // Winner: 200 - 100 + 250.00.
    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, dec!(350.00));
    // Loser: stakes gone, nothing credited.
    assert_eq!(h.wallets.balance(bob).await.unwrap().balance, dec!(100));

    // The worker drains one won event and one deduplicated batch-lost event.
    let notifier = RecordingNotifier::default();
    let worker = OutboxWorker::new(h.store.clone(), notifier.clone(), h.metrics.clone());
    assert_eq!(worker.drain_once().await, 2);
    assert_eq!(h.store.pending_events(10).await.unwrap().len(), 0);

    let delivered = notifier.delivered();
    assert!(delivered.iter().any(|p| matches!(
        p,
        NotificationPayload::Won { user_id, amount, .. }
            if *user_id == alice && *amount == dec!(250.00)
    )));
    assert!(delivered.iter().any(|p| matches!(
        p,
        NotificationPayload::BatchLost { user_ids, .. } if user_ids == &vec![bob]
    )));

    let counters = h.metrics.snapshot().await;
    assert_eq!(counters.matches_settled, 1);
    assert_eq!(counters.bets_won, 1);
    assert_eq!(counters.bets_lost, 2);
    assert_eq!(counters.notifications_dispatched, 2);
    assert_eq!(counters.notification_failures, 0);
}

#[tokio::test]
async fn test_settlement_requires_completed_match() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();

    let err = h
        .engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap_err();
    assert!(matches!(err, WagerError::MatchNotSettleable { .. }));
}

#[tokio::test]
async fn test_repeat_settlement_moves_no_money() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();
    let alice = funded_user(&h, dec!(200)).await;
    h.betting
        .place_bet(alice, "match_7", winner("team_101"), dec!(100), dec!(2.50))
        .await
        .unwrap();

    close_match(&h.store, "match_7").await;
    h.engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap();
    let balance = h.wallets.balance(alice).await.unwrap().balance;
    let history_len = h.wallets.history(alice, 100).await.unwrap().len();

    let err = h
        .engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap_err();
    assert!(matches!(err, WagerError::MatchNotSettleable { .. }));

    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, balance);
    assert_eq!(h.wallets.history(alice, 100).await.unwrap().len(), history_len);
}

#[tokio::test]
async fn test_special_market_bets_resolve_from_market_results() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();
    let alice = funded_user(&h, dec!(100)).await;
    let bob = funded_user(&h, dec!(100)).await;

    // Alice backs first blood for the eventual match loser; Bob backs the
    // match winner on the same market.
    h.betting
        .place_bet(
            alice,
            "match_7",
            BetSelection::SpecialMarket {
                market_id: "first_blood".to_string(),
                option_id: "team_202".to_string(),
            },
            dec!(20),
            dec!(1.85),
        )
        .await
        .unwrap();
    h.betting
        .place_bet(
            bob,
            "match_7",
            BetSelection::SpecialMarket {
                market_id: "first_blood".to_string(),
                option_id: "team_101".to_string(),
            },
            dec!(20),
            dec!(1.95),
        )
        .await
        .unwrap();

    close_match(&h.store, "match_7").await;
    let mut result = MatchResult::winner("team_101");
    result.special_market_results.push(SpecialMarketResult {
        market_id: "first_blood".to_string(),
        winning_option_id: "team_202".to_string(),
    });

    let report = h.engine.settle_match("match_7", &result).await.unwrap();
    assert_eq!(report.winners_paid, 1);
    assert_eq!(report.losers_closed, 1);
    assert_eq!(report.unresolved, 0);

    // Alice won the market even though her option lost the match.
    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, dec!(117.00));
    assert_eq!(h.wallets.balance(bob).await.unwrap().balance, dec!(80));
}

#[tokio::test]
async fn test_unresolved_market_bet_survives_for_later_settlement() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();
    let alice = funded_user(&h, dec!(100)).await;

    let bet = h
        .betting
        .place_bet(
            alice,
            "match_7",
            BetSelection::SpecialMarket {
                market_id: "first_blood".to_string(),
                option_id: "team_101".to_string(),
            },
            dec!(20),
            dec!(1.95),
        )
        .await
        .unwrap();

    close_match(&h.store, "match_7").await;
    // Result omits the first-blood market entirely.
    let report = h
        .engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap();
    assert_eq!(report.unresolved, 1);
    assert_eq!(h.store.bet(bet.id).await.unwrap().status, BetStatus::Pending);
    assert_eq!(h.metrics.snapshot().await.unresolved_special_markets, 1);

    // Operator resolves the leftover bet manually once the data arrives.
    let settled = h
        .engine
        .settle_single_bet(bet.id, ManualOutcome::Won)
        .await
        .unwrap();
    assert_eq!(settled.status, BetStatus::Won);
    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, dec!(119.00));
}

#[tokio::test]
async fn test_manual_refund_returns_stake_and_notifies() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();
    let alice = funded_user(&h, dec!(100)).await;
    let bet = h
        .betting
        .place_bet(alice, "match_7", winner("team_101"), dec!(30), dec!(2.50))
        .await
        .unwrap();

    let voided = h
        .engine
        .settle_single_bet(bet.id, ManualOutcome::Cancelled)
        .await
        .unwrap();
    assert_eq!(voided.status, BetStatus::Void);
    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, dec!(100));

    // The refund is its own ledger entry, not an erased debit.
    let history = h.wallets.history(alice, 10).await.unwrap();
    assert!(history
        .iter()
        .any(|tx| tx.kind == TransactionKind::BetRefund && tx.amount == dec!(30)));
    assert!(history
        .iter()
        .any(|tx| tx.kind == TransactionKind::BetPlaced && tx.amount == dec!(30)));

    let events = h.store.pending_events(10).await.unwrap();
    assert!(events.iter().any(|e| matches!(
        e.payload,
        NotificationPayload::Refunded { amount, .. } if amount == dec!(30)
    )));
}

#[tokio::test]
async fn test_bettor_cancel_before_match_start() {
    let h = harness();
    h.store.upsert_match(&open_match("match_7")).await.unwrap();
    let alice = funded_user(&h, dec!(100)).await;
    let bet = h
        .betting
        .place_bet(alice, "match_7", winner("team_101"), dec!(30), dec!(2.50))
        .await
        .unwrap();

    let canceled = h
        .betting
        .cancel_bet(alice, bet.id, "changed my mind")
        .await
        .unwrap();
    assert_eq!(canceled.status, BetStatus::Canceled);
    assert_eq!(h.wallets.balance(alice).await.unwrap().balance, dec!(100));

    // A canceled bet is out of scope for settlement.
    close_match(&h.store, "match_7").await;
    let report = h
        .engine
        .settle_match("match_7", &MatchResult::winner("team_101"))
        .await
        .unwrap();
    assert_eq!(report.total_bets, 0);
    assert_eq!(h.store.bet(bet.id).await.unwrap().status, BetStatus::Canceled);
}
