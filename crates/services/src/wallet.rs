//! Wallet ledger service: deposits, withdrawals, pending-entry resolution,
//! adjustments, bonuses, and the administrative lock. Every money movement
//! goes through the store's atomic `apply_transaction`/`resolve_transaction`
//! boundaries; this layer adds the flow-level policy on top (deposit-limit
//! windows, metadata shape, payment-channel references).

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use wagerbook_db::Store;
use wagerbook_models::{
    NewTransaction, Result, Transaction, TransactionKind, TransactionMetadata, TransactionStatus,
    TransactionResolution, WagerError, Wallet, WalletSettings,
};

use crate::clock::Clock;

pub struct WalletService<S, C> {
    store: Arc<S>,
    clock: C,
}

impl<S: Store, C: Clock> WalletService<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Fetch the user's wallet, creating it on first touch.
    pub async fn ensure_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        match self.store.wallet_for_user(user_id).await {
            Ok(wallet) => Ok(wallet),
            Err(WagerError::WalletNotFound { .. }) => self.store.create_wallet(user_id).await,
            Err(e) => Err(e),
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Wallet> {
        self.store.wallet_for_user(user_id).await
    }

    /// Newest first.
    pub async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<Transaction>> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        self.store.transactions_for_wallet(wallet.id, limit).await
    }

    /// Start a deposit through a payment channel. The entry is appended as
    /// `pending`; the balance moves only when the payment callback completes
    /// it. Rolling deposit-limit windows are checked here, against completed
    /// deposits.
    pub async fn request_deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        channel: &str,
        reference: Option<String>,
    ) -> Result<Transaction> {
        let wallet = self.ensure_wallet(user_id).await?;
        self.check_deposit_limits(&wallet, amount).await?;

        let mut request = NewTransaction::new(
            TransactionKind::Deposit,
            TransactionStatus::Pending,
            amount,
        )
        .with_metadata(TransactionMetadata::Payment {
            channel: channel.to_string(),
        });
        if let Some(reference) = reference {
            request = request.with_reference(reference);
        }

        let (_, tx) = self.store.apply_transaction(wallet.id, request).await?;
        info!(%user_id, reference = %tx.reference, %amount, channel, "deposit requested");
        Ok(tx)
    }

    /// Start a withdrawal. Funds are checked at request time and re-checked
    /// at completion; the entry stays `pending` until the payout channel
    /// confirms.
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
        channel: &str,
    ) -> Result<Transaction> {
        let wallet = self.store.wallet_for_user(user_id).await?;

        let request = NewTransaction::new(
            TransactionKind::Withdrawal,
            TransactionStatus::Pending,
            amount,
        )
        .with_metadata(TransactionMetadata::Payment {
            channel: channel.to_string(),
        });

        let (_, tx) = self.store.apply_transaction(wallet.id, request).await?;
        info!(%user_id, reference = %tx.reference, %amount, channel, "withdrawal requested");
        Ok(tx)
    }

    /// Payment-callback path: complete a pending entry, moving the balance.
    pub async fn complete_transaction(
        &self,
        user_id: Uuid,
        reference: &str,
    ) -> Result<(Wallet, Transaction)> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        let (wallet, tx) = self
            .store
            .resolve_transaction(wallet.id, reference, TransactionResolution::Complete)
            .await?;
        info!(%user_id, reference, balance = %wallet.balance, "transaction completed");
        Ok((wallet, tx))
    }

    pub async fn fail_transaction(
        &self,
        user_id: Uuid,
        reference: &str,
        reason: &str,
    ) -> Result<Transaction> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        let (_, tx) = self
            .store
            .resolve_transaction(
                wallet.id,
                reference,
                TransactionResolution::Fail {
                    reason: reason.to_string(),
                },
            )
            .await?;
        info!(%user_id, reference, reason, "transaction failed");
        Ok(tx)
    }

    pub async fn cancel_transaction(
        &self,
        user_id: Uuid,
        reference: &str,
        reason: &str,
    ) -> Result<Transaction> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        let (_, tx) = self
            .store
            .resolve_transaction(
                wallet.id,
                reference,
                TransactionResolution::Cancel {
                    reason: reason.to_string(),
                },
            )
            .await?;
        info!(%user_id, reference, reason, "transaction canceled");
        Ok(tx)
    }

    pub async fn transaction(&self, reference: &str) -> Result<Transaction> {
        self.store
            .transaction_by_reference(reference)
            .await?
            .ok_or_else(|| WagerError::TransactionNotFound {
                reference: reference.to_string(),
            })
    }

    /// Manual balance correction. The amount carries its own sign; a
    /// downward correction past the balance is rejected as insufficient
    /// funds rather than tripping the negative-balance invariant.
    pub async fn adjustment(
        &self,
        user_id: Uuid,
        amount: Decimal,
        admin_id: Uuid,
        reason: &str,
    ) -> Result<(Wallet, Transaction)> {
        let wallet = self.store.wallet_for_user(user_id).await?;

        let request = NewTransaction::new(
            TransactionKind::Adjustment,
            TransactionStatus::Completed,
            amount,
        )
        .with_metadata(TransactionMetadata::Adjustment {
            admin_id,
            reason: reason.to_string(),
        });

        let (wallet, tx) = self.store.apply_transaction(wallet.id, request).await?;
        info!(%user_id, %admin_id, %amount, reason, balance = %wallet.balance, "balance adjusted");
        Ok((wallet, tx))
    }

    /// Promotional credit; lands completed and moves both the balance and
    /// the bonus aggregate.
    pub async fn grant_bonus(&self, user_id: Uuid, amount: Decimal) -> Result<(Wallet, Transaction)> {
        let wallet = self.ensure_wallet(user_id).await?;
        let request =
            NewTransaction::new(TransactionKind::Bonus, TransactionStatus::Completed, amount);
        let (wallet, tx) = self.store.apply_transaction(wallet.id, request).await?;
        info!(%user_id, %amount, "bonus granted");
        Ok((wallet, tx))
    }

    pub async fn lock_wallet(&self, user_id: Uuid, reason: &str) -> Result<Wallet> {
        if reason.trim().is_empty() {
            return Err(WagerError::EmptyLockReason);
        }
        let wallet = self.store.wallet_for_user(user_id).await?;
        let wallet = self.store.set_wallet_lock(wallet.id, Some(reason)).await?;
        info!(%user_id, reason, "wallet locked");
        Ok(wallet)
    }

    pub async fn unlock_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        let wallet = self.store.set_wallet_lock(wallet.id, None).await?;
        info!(%user_id, "wallet unlocked");
        Ok(wallet)
    }

    pub async fn update_settings(
        &self,
        user_id: Uuid,
        settings: WalletSettings,
    ) -> Result<Wallet> {
        let wallet = self.store.wallet_for_user(user_id).await?;
        self.store.update_wallet_settings(wallet.id, settings).await
    }

    /// Rolling 24h/7d/30d windows over completed deposits. A request that
    /// would push any configured window past its cap is rejected. This is an
    /// early check for a clean error before staging; the store re-checks the
    /// same windows under the wallet lock, so concurrent deposits cannot
    /// jointly exceed a cap.
    async fn check_deposit_limits(&self, wallet: &Wallet, amount: Decimal) -> Result<()> {
        let now = self.clock.now();
        for (period, limit, window) in wallet.settings.deposit_windows() {
            let deposited = self.store.deposits_since(wallet.id, now - window).await?;
            if deposited + amount > limit {
                return Err(WagerError::DepositLimitExceeded {
                    period: period.to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use wagerbook_db::MemoryStore;

    fn service() -> WalletService<MemoryStore, FixedClock> {
        WalletService::new(Arc::new(MemoryStore::new()), FixedClock(Utc::now()))
    }

    #[tokio::test]
    async fn test_deposit_lifecycle() {
        let svc = service();
        let user_id = Uuid::new_v4();

        let tx = svc
            .request_deposit(user_id, dec!(100), "card", None)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(svc.balance(user_id).await.unwrap().balance, Decimal::ZERO);

        let (wallet, tx) = svc.complete_transaction(user_id, &tx.reference).await.unwrap();
        assert_eq!(wallet.balance, dec!(100));
        assert_eq!(tx.balance_after, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_daily_deposit_limit_enforced() {
        let svc = service();
        let user_id = Uuid::new_v4();
        svc.ensure_wallet(user_id).await.unwrap();
        svc.update_settings(
            user_id,
            WalletSettings {
                daily_deposit_limit: Some(dec!(150)),
                ..WalletSettings::default()
            },
        )
        .await
        .unwrap();

        let tx = svc
            .request_deposit(user_id, dec!(100), "card", None)
            .await
            .unwrap();
        svc.complete_transaction(user_id, &tx.reference).await.unwrap();

        let err = svc
            .request_deposit(user_id, dec!(75), "card", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::DepositLimitExceeded { .. }));

        // Pending deposits do not count against the window.
        assert!(svc.request_deposit(user_id, dec!(50), "card", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_withdrawal_restores_nothing_because_nothing_moved() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let deposit = svc
            .request_deposit(user_id, dec!(200), "card", None)
            .await
            .unwrap();
        svc.complete_transaction(user_id, &deposit.reference)
            .await
            .unwrap();

        let withdrawal = svc
            .request_withdrawal(user_id, dec!(80), "bank")
            .await
            .unwrap();
        svc.fail_transaction(user_id, &withdrawal.reference, "channel timeout")
            .await
            .unwrap();

        assert_eq!(svc.balance(user_id).await.unwrap().balance, dec!(200));
    }

    #[tokio::test]
    async fn test_locked_wallet_rejects_deposit() {
        let svc = service();
        let user_id = Uuid::new_v4();
        svc.ensure_wallet(user_id).await.unwrap();
        svc.lock_wallet(user_id, "fraud review").await.unwrap();

        let err = svc
            .request_deposit(user_id, dec!(10), "card", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::WalletLocked { .. }));

        svc.unlock_wallet(user_id).await.unwrap();
        assert!(svc.request_deposit(user_id, dec!(10), "card", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_negative_adjustment_past_balance_rejected() {
        let svc = service();
        let user_id = Uuid::new_v4();
        svc.ensure_wallet(user_id).await.unwrap();
        svc.grant_bonus(user_id, dec!(30)).await.unwrap();

        let err = svc
            .adjustment(user_id, dec!(-50), Uuid::new_v4(), "chargeback")
            .await
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFunds { .. }));

        let (wallet, _) = svc
            .adjustment(user_id, dec!(-20), Uuid::new_v4(), "chargeback")
            .await
            .unwrap();
        assert_eq!(wallet.balance, dec!(10));
    }
}
