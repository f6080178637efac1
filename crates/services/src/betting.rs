//! Bet placement and cancellation. Placement validates the market against
//! the current match snapshot (open for betting, selection offered, odds
//! unchanged) and then hands the store one atomic boundary that debits the
//! stake, inserts the bet, and bumps the match counters together.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use wagerbook_db::Store;
use wagerbook_models::{
    Bet, BetSelection, NewTransaction, NotificationEvent, NotificationPayload, Result,
    TransactionKind, TransactionMetadata, TransactionStatus, WagerError,
};

use crate::clock::Clock;

pub struct BettingService<S, C> {
    store: Arc<S>,
    clock: C,
    min_stake: Decimal,
}

impl<S: Store, C: Clock> BettingService<S, C> {
    pub fn new(store: Arc<S>, clock: C, min_stake: Decimal) -> Self {
        Self {
            store,
            clock,
            min_stake,
        }
    }

    /// Place a bet at the odds the bettor saw. If the published odds have
    /// moved since, the request is rejected with both values so the client
    /// can re-present.
    pub async fn place_bet(
        &self,
        user_id: Uuid,
        match_id: &str,
        selection: BetSelection,
        amount: Decimal,
        submitted_odds: Decimal,
    ) -> Result<Bet> {
        if amount < self.min_stake {
            return Err(WagerError::StakeBelowMinimum {
                amount,
                minimum: self.min_stake,
            });
        }

        let match_info = self.store.match_info(match_id).await?;
        if !match_info.is_open_for_betting() {
            return Err(WagerError::BettingClosed {
                match_id: match_id.to_string(),
            });
        }

        let published = match &selection {
            BetSelection::MatchWinner { team_id } => match_info.team_odds(team_id),
            BetSelection::SpecialMarket {
                market_id,
                option_id,
            } => match_info.market_option_odds(market_id, option_id),
        }
        .ok_or_else(|| WagerError::SelectionNotOffered {
            match_id: match_id.to_string(),
            selection: selection.describe(),
        })?;

        if published != submitted_odds {
            return Err(WagerError::OddsMismatch {
                selection: selection.describe(),
                submitted: submitted_odds,
                published,
            });
        }

        let now = self.clock.now();
        let bet = Bet::new(user_id, match_id, selection, amount, published, now)?;

        let debit = NewTransaction::new(
            TransactionKind::BetPlaced,
            TransactionStatus::Completed,
            amount,
        )
        .with_metadata(TransactionMetadata::BetPlaced {
            bet_id: bet.id,
            match_id: match_id.to_string(),
        });

        let (bet, wallet, _) = self.store.place_bet(bet, debit).await?;
        info!(
            %user_id,
            bet_slip_id = %bet.bet_slip_id,
            match_id,
            %amount,
            odds = %bet.odds,
            balance = %wallet.balance,
            "bet placed"
        );
        Ok(bet)
    }

    /// Bettor-initiated cancellation while the match is still open. Refunds
    /// the full stake in the same boundary that flips the bet state, and
    /// queues the refund notification.
    pub async fn cancel_bet(&self, user_id: Uuid, bet_id: Uuid, reason: &str) -> Result<Bet> {
        let mut bet = self.store.bet(bet_id).await?;
        if bet.user_id != user_id {
            return Err(WagerError::BetNotFound {
                bet_id: bet_id.to_string(),
            });
        }

        let match_info = self.store.match_info(&bet.match_id).await?;
        if !bet.is_editable(&match_info) {
            return Err(WagerError::InvalidStateTransition {
                status: bet.status.as_str().to_string(),
            });
        }

        let now = self.clock.now();
        bet.cancel(reason, now)?;

        let refund = NewTransaction::new(
            TransactionKind::BetRefund,
            TransactionStatus::Completed,
            bet.amount,
        )
        .with_metadata(TransactionMetadata::BetRefund {
            bet_id: bet.id,
            reason: reason.to_string(),
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
        info!(%user_id, bet_slip_id = %bet.bet_slip_id, reason, "bet canceled, stake refunded");
        Ok(bet)
    }

    pub async fn bet(&self, bet_id: Uuid) -> Result<Bet> {
        self.store.bet(bet_id).await
    }

    pub async fn bets_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Bet>> {
        self.store.bets_for_user(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use wagerbook_db::MemoryStore;
    use wagerbook_models::{
        BetStatus, BettingStatus, MatchInfo, MatchOdds, MatchStatus, TeamOdds,
    };

    fn upcoming_match(id: &str) -> MatchInfo {
        MatchInfo {
            id: id.to_string(),
            title: "NaVi vs FaZe".to_string(),
            status: MatchStatus::Upcoming,
            betting_status: BettingStatus::Open,
            result: None,
            odds: MatchOdds {
                teams: vec![
                    TeamOdds {
                        team_id: "team_101".to_string(),
                        odds: dec!(1.85),
                    },
                    TeamOdds {
                        team_id: "team_202".to_string(),
                        odds: dec!(2.10),
                    },
                ],
                special_markets: Vec::new(),
            },
            total_bets: 0,
            total_bet_amount: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    async fn setup(balance: Decimal) -> (BettingService<MemoryStore, FixedClock>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let wallet = store.create_wallet(user_id).await.unwrap();
        if balance > Decimal::ZERO {
            store
                .apply_transaction(
                    wallet.id,
                    NewTransaction::new(
                        TransactionKind::Deposit,
                        TransactionStatus::Completed,
                        balance,
                    ),
                )
                .await
                .unwrap();
        }
        store.upsert_match(&upcoming_match("match_7")).await.unwrap();
        let svc = BettingService::new(store, FixedClock(Utc::now()), dec!(1));
        (svc, user_id)
    }

    fn winner(team_id: &str) -> BetSelection {
        BetSelection::MatchWinner {
            team_id: team_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_place_bet_debits_stake() {
        let (svc, user_id) = setup(dec!(100)).await;

        let bet = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap();

        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(bet.potential_return, dec!(74.00));

        let wallet = svc.store.wallet_for_user(user_id).await.unwrap();
        assert_eq!(wallet.balance, dec!(60));
        assert_eq!(wallet.total_bet, dec!(40));

        let info = svc.store.match_info("match_7").await.unwrap();
        assert_eq!(info.total_bets, 1);
        assert_eq!(info.total_bet_amount, dec!(40));
    }

    #[tokio::test]
    async fn test_odds_mismatch_rejected() {
        let (svc, user_id) = setup(dec!(100)).await;

        let err = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.95))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WagerError::OddsMismatch {
                published, ..
            } if published == dec!(1.85)
        ));
    }

    #[tokio::test]
    async fn test_unknown_selection_rejected() {
        let (svc, user_id) = setup(dec!(100)).await;

        let err = svc
            .place_bet(user_id, "match_7", winner("team_999"), dec!(40), dec!(1.85))
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::SelectionNotOffered { .. }));
    }

    #[tokio::test]
    async fn test_stake_below_minimum_rejected() {
        let (svc, user_id) = setup(dec!(100)).await;

        let err = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(0.5), dec!(1.85))
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::StakeBelowMinimum { .. }));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_bet() {
        let (svc, user_id) = setup(dec!(10)).await;

        let err = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFunds { .. }));

        assert!(svc.bets_for_user(user_id, 10).await.unwrap().is_empty());
        let info = svc.store.match_info("match_7").await.unwrap();
        assert_eq!(info.total_bets, 0);
    }

    #[tokio::test]
    async fn test_betting_closed_rejected() {
        let (svc, user_id) = setup(dec!(100)).await;
        let mut info = upcoming_match("match_7");
        info.betting_status = BettingStatus::Suspended;
        svc.store.upsert_match(&info).await.unwrap();

        let err = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::BettingClosed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_refunds_stake_and_queues_notification() {
        let (svc, user_id) = setup(dec!(100)).await;
        let bet = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap();

        let canceled = svc.cancel_bet(user_id, bet.id, "changed my mind").await.unwrap();
        assert_eq!(canceled.status, BetStatus::Canceled);

        let wallet = svc.store.wallet_for_user(user_id).await.unwrap();
        assert_eq!(wallet.balance, dec!(100));

        let events = svc.store.pending_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].payload,
            NotificationPayload::Refunded { amount, .. } if amount == dec!(40)
        ));
    }

    #[tokio::test]
    async fn test_cancel_blocked_once_betting_closes() {
        let (svc, user_id) = setup(dec!(100)).await;
        let bet = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap();

        let mut info = svc.store.match_info("match_7").await.unwrap();
        info.betting_status = BettingStatus::Closed;
        svc.store.upsert_match(&info).await.unwrap();

        let err = svc
            .cancel_bet(user_id, bet.id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_foreign_bet_hidden() {
        let (svc, user_id) = setup(dec!(100)).await;
        let bet = svc
            .place_bet(user_id, "match_7", winner("team_101"), dec!(40), dec!(1.85))
            .await
            .unwrap();

        let err = svc
            .cancel_bet(Uuid::new_v4(), bet.id, "not mine")
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::BetNotFound { .. }));
    }
}
