use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WagerError};
use crate::transaction::{Transaction, TransactionKind};

/// Per-period deposit caps, applied against completed deposits inside the
/// rolling window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WalletSettings {
    pub daily_deposit_limit: Option<Decimal>,
    pub weekly_deposit_limit: Option<Decimal>,
    pub monthly_deposit_limit: Option<Decimal>,
}

impl WalletSettings {
    /// Configured caps as (period name, cap, rolling window) triples.
    pub fn deposit_windows(&self) -> Vec<(&'static str, Decimal, Duration)> {
        [
            ("daily", self.daily_deposit_limit, Duration::hours(24)),
            ("weekly", self.weekly_deposit_limit, Duration::days(7)),
            ("monthly", self.monthly_deposit_limit, Duration::days(30)),
        ]
        .into_iter()
        .filter_map(|(period, limit, window)| limit.map(|l| (period, l, window)))
        .collect()
    }
}

/// The single per-user monetary account. Balances only move through the
/// ledger: every mutation is the completion of exactly one [`Transaction`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub locked_balance: Decimal,
    pub bonus_balance: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
    pub total_bet: Decimal,
    pub total_won: Decimal,
    pub is_locked: bool,
    pub lock_reason: Option<String>,
    pub settings: WalletSettings,
    pub last_deposit_at: Option<DateTime<Utc>>,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub last_bet_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Decimal::ZERO,
            locked_balance: Decimal::ZERO,
            bonus_balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            total_bet: Decimal::ZERO,
            total_won: Decimal::ZERO,
            is_locked: false,
            lock_reason: None,
            settings: WalletSettings::default(),
            last_deposit_at: None,
            last_withdrawal_at: None,
            last_bet_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Admission checks for a new ledger entry, evaluated before anything is
    /// written. The store runs this inside the same atomic boundary as the
    /// write, so two concurrent debits cannot both pass the funds check.
    pub fn check_admission(&self, kind: TransactionKind, amount: Decimal) -> Result<()> {
        if self.is_locked {
            return Err(WagerError::WalletLocked {
                reason: self
                    .lock_reason
                    .clone()
                    .unwrap_or_else(|| "administrative freeze".to_string()),
            });
        }
        if amount == Decimal::ZERO {
            return Err(WagerError::InvalidAmount { amount });
        }
        // Only adjustments carry their own sign.
        if kind != TransactionKind::Adjustment && amount < Decimal::ZERO {
            return Err(WagerError::InvalidAmount { amount });
        }
        if kind.is_debit() && amount > self.balance {
            return Err(WagerError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        // A downward adjustment is a debit in all but name.
        if kind == TransactionKind::Adjustment && -amount > self.balance {
            return Err(WagerError::InsufficientFunds {
                requested: -amount,
                available: self.balance,
            });
        }
        Ok(())
    }

    /// Apply the balance effect of a completing transaction and return the
    /// resulting balance snapshot. The wallet is untouched on error: the
    /// `NegativeBalance` post-condition is checked before any field moves,
    /// since `check_admission` should already have blocked the debit and a
    /// violation here means an upstream logic bug.
    pub fn apply(&mut self, tx: &Transaction, now: DateTime<Utc>) -> Result<Decimal> {
        let new_balance = self.balance + tx.signed_amount();
        if new_balance < Decimal::ZERO {
            return Err(WagerError::NegativeBalance {
                wallet_id: self.id.to_string(),
                balance: new_balance,
            });
        }

        self.balance = new_balance;
        match tx.kind {
            TransactionKind::Deposit => {
                self.total_deposited += tx.amount;
                self.last_deposit_at = Some(now);
            }
            TransactionKind::Withdrawal => {
                self.total_withdrawn += tx.amount;
                self.last_withdrawal_at = Some(now);
            }
            TransactionKind::BetPlaced => {
                self.total_bet += tx.amount;
                self.last_bet_at = Some(now);
            }
            TransactionKind::BetWon => {
                self.total_won += tx.amount;
            }
            TransactionKind::Bonus => {
                self.bonus_balance += tx.amount;
            }
            TransactionKind::BetRefund | TransactionKind::Adjustment => {}
        }
        self.updated_at = now;

        Ok(new_balance)
    }

    /// Administrative freeze. Requires a non-empty reason.
    pub fn lock(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(WagerError::EmptyLockReason);
        }
        self.is_locked = true;
        self.lock_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn unlock(&mut self, now: DateTime<Utc>) {
        self.is_locked = false;
        self.lock_reason = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{NewTransaction, TransactionStatus};
    use rust_decimal_macros::dec;

    fn tx(wallet: &Wallet, kind: TransactionKind, amount: Decimal) -> Transaction {
        NewTransaction::new(kind, TransactionStatus::Completed, amount)
            .into_transaction(wallet.id, wallet.user_id, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_deposit_moves_balance_and_aggregates() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        wallet.balance = dec!(100);

        let deposit = tx(&wallet, TransactionKind::Deposit, dec!(50));
        let balance_after = wallet.apply(&deposit, Utc::now()).unwrap();

        assert_eq!(balance_after, dec!(150));
        assert_eq!(wallet.balance, dec!(150));
        assert_eq!(wallet.total_deposited, dec!(50));
        assert!(wallet.last_deposit_at.is_some());
    }

    #[test]
    fn test_insufficient_funds_blocks_debit() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        wallet.balance = dec!(50);

        let err = wallet
            .check_admission(TransactionKind::BetPlaced, dec!(100))
            .unwrap_err();
        assert!(matches!(err, WagerError::InsufficientFunds { .. }));
        assert_eq!(wallet.balance, dec!(50));
    }

    #[test]
    fn test_locked_wallet_rejects_entries() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        wallet.lock("fraud review", Utc::now()).unwrap();

        let err = wallet
            .check_admission(TransactionKind::Deposit, dec!(10))
            .unwrap_err();
        assert!(matches!(err, WagerError::WalletLocked { .. }));

        wallet.unlock(Utc::now());
        assert!(wallet
            .check_admission(TransactionKind::Deposit, dec!(10))
            .is_ok());
    }

    #[test]
    fn test_lock_requires_reason() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        assert!(matches!(
            wallet.lock("  ", Utc::now()),
            Err(WagerError::EmptyLockReason)
        ));
        assert!(!wallet.is_locked);
    }

    #[test]
    fn test_negative_balance_is_fatal_and_leaves_wallet_untouched() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        wallet.balance = dec!(30);

        let withdrawal = tx(&wallet, TransactionKind::Withdrawal, dec!(40));
        let err = wallet.apply(&withdrawal, Utc::now()).unwrap_err();

        assert!(matches!(err, WagerError::NegativeBalance { .. }));
        assert_eq!(wallet.balance, dec!(30));
        assert_eq!(wallet.total_withdrawn, Decimal::ZERO);
    }

    #[test]
    fn test_negative_adjustment_allowed_within_balance() {
        let mut wallet = Wallet::new(Uuid::new_v4(), Utc::now());
        wallet.balance = dec!(100);

        assert!(wallet
            .check_admission(TransactionKind::Adjustment, dec!(-25))
            .is_ok());

        let adjustment = tx(&wallet, TransactionKind::Adjustment, dec!(-25));
        assert_eq!(wallet.apply(&adjustment, Utc::now()).unwrap(), dec!(75));
    }
}
