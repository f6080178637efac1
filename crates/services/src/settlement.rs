//! Settlement engine. Resolving a match against its finalized result is a
//! sequence of independent atomic boundaries: first the compare-and-settle
//! gate on the match itself, then one boundary per pending bet. A failure
//! on one bet is logged and counted, never aborting the rest of the run.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use wagerbook_db::Store;
use wagerbook_models::{
    Bet, MatchResult, NewTransaction, NotificationEvent, NotificationPayload, Result,
    SettleOutcome, TransactionKind, TransactionMetadata, TransactionStatus, WagerError,
};

use crate::clock::Clock;
use crate::metrics::MetricsCollector;

/// Admin override outcome for a single bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOutcome {
    Won,
    Lost,
    Cancelled,
}

/// What one settlement run did, for the operator and the metrics feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub match_id: String,
    pub total_bets: u64,
    pub total_payout: Decimal,
    pub winners_paid: u64,
    pub losers_closed: u64,
    pub unresolved: u64,
    pub failures: u64,
}

pub struct SettlementEngine<S, C> {
    store: Arc<S>,
    clock: C,
    metrics: Arc<MetricsCollector>,
}

impl<S: Store, C: Clock> SettlementEngine<S, C> {
    pub fn new(store: Arc<S>, clock: C, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            store,
            clock,
            metrics,
        }
    }

    /// Settle every pending bet on a match against its finalized result.
    ///
    /// The match is gated first: `mark_settled` records the result and flips
    /// the betting status in one compare-and-settle write, so a concurrent
    /// or repeated call fails there with `MatchNotSettleable` before any
    /// money moves. Each bet then settles in its own boundary; winners are
    /// credited `potential_return` and notified individually, losers are
    /// collected into one deduplicated batch notification.
    pub async fn settle_match(
        &self,
        match_id: &str,
        result: &MatchResult,
    ) -> Result<SettlementReport> {
        let started = Instant::now();
        let match_info = self.store.mark_settled(match_id, result).await?;
        let pending = self.store.pending_bets_for_match(match_id).await?;

        info!(match_id, bets = pending.len(), "settling match");

        let mut report = SettlementReport {
            match_id: match_id.to_string(),
            total_bets: pending.len() as u64,
            ..SettlementReport::default()
        };
        let mut losers: Vec<Uuid> = Vec::new();

        for bet in pending {
            let user_id = bet.user_id;
            let payout = bet.potential_return;
            match self.settle_one(bet, result).await {
                Ok(SettleOutcome::Won) => {
                    report.winners_paid += 1;
                    report.total_payout += payout;
                }
                Ok(SettleOutcome::Lost) => {
                    report.losers_closed += 1;
                    // One user can hold several losing bets on a match;
                    // they get a single notification.
                    if !losers.contains(&user_id) {
                        losers.push(user_id);
                    }
                }
                Ok(SettleOutcome::Unresolved) => report.unresolved += 1,
                Err((bet, e)) => {
                    report.failures += 1;
                    error!(
                        match_id,
                        bet_id = %bet.id,
                        user_id = %bet.user_id,
                        "bet settlement failed: {e}"
                    );
                }
            }
        }

        if !losers.is_empty() {
            let event = NotificationEvent::new(
                NotificationPayload::BatchLost {
                    user_ids: losers,
                    match_title: match_info.title.clone(),
                },
                self.clock.now(),
            );
            if let Err(e) = self.store.append_events(vec![event]).await {
                warn!(match_id, "failed to queue batch-lost notification: {e}");
            }
        }

        if report.unresolved > 0 {
            warn!(
                match_id,
                unresolved = report.unresolved,
                "special-market bets left pending: result lacks their markets"
            );
        }

        self.metrics
            .record_match_settled(
                report.winners_paid,
                report.losers_closed,
                report.unresolved,
                report.failures,
            )
            .await;
        self.metrics
            .record_latency("settle_match", started.elapsed().as_secs_f64() * 1000.0)
            .await;

        info!(
            match_id,
            winners = report.winners_paid,
            losers = report.losers_closed,
            unresolved = report.unresolved,
            failures = report.failures,
            "match settled"
        );
        Ok(report)
    }

    /// One bet, one boundary. The error path hands the bet back so the
    /// caller can log identifying context.
    async fn settle_one(
        &self,
        mut bet: Bet,
        result: &MatchResult,
    ) -> std::result::Result<SettleOutcome, (Bet, WagerError)> {
        let now = self.clock.now();
        let outcome = match bet.settle(result, now) {
            Ok(outcome) => outcome,
            Err(e) => return Err((bet, e)),
        };

        match outcome {
            SettleOutcome::Unresolved => Ok(SettleOutcome::Unresolved),
            SettleOutcome::Won => {
                let credit = NewTransaction::new(
                    TransactionKind::BetWon,
                    TransactionStatus::Completed,
                    bet.potential_return,
                )
                .with_metadata(TransactionMetadata::BetWon {
                    bet_id: bet.id,
                    match_id: bet.match_id.clone(),
                    bet_slip_id: bet.bet_slip_id.clone(),
                });
                let event = NotificationEvent::new(
                    NotificationPayload::Won {
                        user_id: bet.user_id,
                        bet_slip_id: bet.bet_slip_id.clone(),
                        amount: bet.potential_return,
                    },
                    now,
                );
                bet.mark_payout_processed(now);

                match self.store.settle_bet(&bet, Some(credit), vec![event]).await {
                    Ok(_) => Ok(SettleOutcome::Won),
                    Err(e) => Err((bet, e)),
                }
            }
            SettleOutcome::Lost => match self.store.settle_bet(&bet, None, Vec::new()).await {
                Ok(_) => Ok(SettleOutcome::Lost),
                Err(e) => Err((bet, e)),
            },
        }
    }

    /// Admin override for one bet: force won, lost, or cancelled (refund).
    /// Used for disputes and mistaken placements; the wallet moves through
    /// the same atomic boundary as automatic settlement.
    pub async fn settle_single_bet(&self, bet_id: Uuid, outcome: ManualOutcome) -> Result<Bet> {
        let mut bet = self.store.bet(bet_id).await?;
        let now = self.clock.now();

        match outcome {
            ManualOutcome::Won => {
                let result = self.result_snapshot(&bet.match_id).await?;
                bet.settle_as(true, result, now)?;

                let credit = NewTransaction::new(
                    TransactionKind::BetWon,
                    TransactionStatus::Completed,
                    bet.potential_return,
                )
                .with_metadata(TransactionMetadata::BetWon {
                    bet_id: bet.id,
                    match_id: bet.match_id.clone(),
                    bet_slip_id: bet.bet_slip_id.clone(),
                });
                let event = NotificationEvent::new(
                    NotificationPayload::Won {
                        user_id: bet.user_id,
                        bet_slip_id: bet.bet_slip_id.clone(),
                        amount: bet.potential_return,
                    },
                    now,
                );
                bet.mark_payout_processed(now);
                self.store.settle_bet(&bet, Some(credit), vec![event]).await?;
            }
            ManualOutcome::Lost => {
                let result = self.result_snapshot(&bet.match_id).await?;
                bet.settle_as(false, result, now)?;
                self.store.settle_bet(&bet, None, Vec::new()).await?;
            }
            ManualOutcome::Cancelled => {
                bet.void("administrative settlement", now)?;
                let refund = NewTransaction::new(
                    TransactionKind::BetRefund,
                    TransactionStatus::Completed,
                    bet.amount,
                )
                .with_metadata(TransactionMetadata::BetRefund {
                    bet_id: bet.id,
                    reason: "administrative settlement".to_string(),
                });
                let event = NotificationEvent::new(
                    NotificationPayload::Refunded {
                        user_id: bet.user_id,
                        bet_slip_id: bet.bet_slip_id.clone(),
                        amount: bet.amount,
                    },
                    now,
                );
                bet.mark_payout_processed(now);
                self.store.settle_bet(&bet, Some(refund), vec![event]).await?;
            }
        }

        info!(bet_id = %bet.id, status = bet.status.as_str(), "bet settled manually");
        Ok(bet)
    }

    /// Result as recorded on the match. A missing match degrades to an empty
    /// snapshot so an admin can still force an outcome; store errors propagate.
    async fn result_snapshot(&self, match_id: &str) -> Result<MatchResult> {
        match self.store.match_info(match_id).await {
            Ok(info) => Ok(info.result.unwrap_or_default()),
            Err(WagerError::MatchNotFound { .. }) => Ok(MatchResult::default()),
            Err(e) => Err(e),
        }
    }
}
