//! Postgres store. Each trait method opens one `sqlx` transaction and takes
//! a `FOR UPDATE` row lock on the wallet before any check, so the
//! check-then-mutate sequence of a call commits or aborts as a unit. The
//! unique index on `transactions.reference` is the idempotency guard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use wagerbook_models::{
    Bet, MatchInfo, MatchResult, NewTransaction, NotificationEvent, Result, Transaction,
    TransactionKind, TransactionResolution, TransactionStatus, WagerError, Wallet, WalletSettings,
};

use crate::ledger::{complete_entry, stage_entry};
use crate::repository::Store;
use crate::schema::{BetRecord, MatchRecord, OutboxRecord, TransactionRecord, WalletRecord};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique(err: sqlx::Error, reference: &str) -> WagerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => WagerError::DuplicateReference {
            reference: reference.to_string(),
        },
        _ => WagerError::Database(err),
    }
}

async fn wallet_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    wallet_id: Uuid,
) -> Result<Wallet> {
    let record = sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| WagerError::WalletNotFound {
            user_id: wallet_id.to_string(),
        })?;
    Ok(record.into())
}

async fn wallet_for_user_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Wallet> {
    let record =
        sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: user_id.to_string(),
            })?;
    Ok(record.into())
}

async fn persist_wallet(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    wallet: &Wallet,
) -> Result<()> {
    sqlx::query(
        "UPDATE wallets SET balance = $2, locked_balance = $3, bonus_balance = $4, \
         total_deposited = $5, total_withdrawn = $6, total_bet = $7, total_won = $8, \
         is_locked = $9, lock_reason = $10, daily_deposit_limit = $11, \
         weekly_deposit_limit = $12, monthly_deposit_limit = $13, last_deposit_at = $14, \
         last_withdrawal_at = $15, last_bet_at = $16, updated_at = $17 \
         WHERE id = $1",
    )
    .bind(wallet.id)
    .bind(wallet.balance)
    .bind(wallet.locked_balance)
    .bind(wallet.bonus_balance)
    .bind(wallet.total_deposited)
    .bind(wallet.total_withdrawn)
    .bind(wallet.total_bet)
    .bind(wallet.total_won)
    .bind(wallet.is_locked)
    .bind(&wallet.lock_reason)
    .bind(wallet.settings.daily_deposit_limit)
    .bind(wallet.settings.weekly_deposit_limit)
    .bind(wallet.settings.monthly_deposit_limit)
    .bind(wallet.last_deposit_at)
    .bind(wallet.last_withdrawal_at)
    .bind(wallet.last_bet_at)
    .bind(wallet.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Deposit-limit windows are summed inside the open transaction while the
/// wallet row is locked, so concurrent deposits cannot jointly exceed a cap.
async fn check_deposit_windows(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    wallet: &Wallet,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    for (period, limit, window) in wallet.settings.deposit_windows() {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM transactions \
             WHERE wallet_id = $1 AND kind = 'deposit' AND status = 'completed' \
             AND completed_at >= $2",
        )
        .bind(wallet.id)
        .bind(now - window)
        .fetch_one(&mut **tx)
        .await?;
        let deposited = row.get::<Decimal, _>("total");
        if deposited + amount > limit {
            return Err(WagerError::DepositLimitExceeded {
                period: period.to_string(),
                limit,
            });
        }
    }
    Ok(())
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entry: &Transaction,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO transactions (id, wallet_id, kind, status, amount, reference, \
         balance_after, metadata, failure_reason, created_at, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(entry.kind.as_str())
    .bind(entry.status.as_str())
    .bind(entry.amount)
    .bind(&entry.reference)
    .bind(entry.balance_after)
    .bind(serde_json::to_value(&entry.metadata)?)
    .bind(&entry.failure_reason)
    .bind(entry.created_at)
    .bind(entry.completed_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_unique(e, &entry.reference))?;
    Ok(())
}

async fn update_transaction(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entry: &Transaction,
) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET status = $2, balance_after = $3, failure_reason = $4, \
         completed_at = $5 WHERE id = $1",
    )
    .bind(entry.id)
    .bind(entry.status.as_str())
    .bind(entry.balance_after)
    .bind(&entry.failure_reason)
    .bind(entry.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_events(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    events: &[NotificationEvent],
) -> Result<()> {
    for event in events {
        sqlx::query(
            "INSERT INTO notification_outbox (id, payload, created_at, dispatched_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.id)
        .bind(serde_json::to_value(&event.payload)?)
        .bind(event.created_at)
        .bind(event.dispatched_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl Store for PgStore {
    async fn create_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        let wallet = Wallet::new(user_id, Utc::now());
        sqlx::query(
            "INSERT INTO wallets (id, user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(wallet.id)
        .bind(user_id)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;
        self.wallet_for_user(user_id).await
    }

    async fn wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        let record = sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })?;
        Ok(record.into())
    }

    async fn wallet_for_user(&self, user_id: Uuid) -> Result<Wallet> {
        let record = sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: user_id.to_string(),
            })?;
        Ok(record.into())
    }

    async fn set_wallet_lock(&self, wallet_id: Uuid, reason: Option<&str>) -> Result<Wallet> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut wallet = wallet_for_update(&mut tx, wallet_id).await?;
        match reason {
            Some(reason) => wallet.lock(reason, now)?,
            None => wallet.unlock(now),
        }
        persist_wallet(&mut tx, &wallet).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn update_wallet_settings(
        &self,
        wallet_id: Uuid,
        settings: WalletSettings,
    ) -> Result<Wallet> {
        let mut tx = self.pool.begin().await?;
        let mut wallet = wallet_for_update(&mut tx, wallet_id).await?;
        wallet.settings = settings;
        wallet.updated_at = Utc::now();
        persist_wallet(&mut tx, &wallet).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn apply_transaction(
        &self,
        wallet_id: Uuid,
        request: NewTransaction,
    ) -> Result<(Wallet, Transaction)> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut wallet = wallet_for_update(&mut tx, wallet_id).await?;
        if request.kind == TransactionKind::Deposit {
            check_deposit_windows(&mut tx, &wallet, request.amount, now).await?;
        }
        let entry = stage_entry(&mut wallet, request, now)?;
        insert_transaction(&mut tx, &entry).await?;
        persist_wallet(&mut tx, &wallet).await?;
        tx.commit().await?;
        Ok((wallet, entry))
    }

    async fn resolve_transaction(
        &self,
        wallet_id: Uuid,
        reference: &str,
        resolution: TransactionResolution,
    ) -> Result<(Wallet, Transaction)> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut wallet = wallet_for_update(&mut tx, wallet_id).await?;

        let record = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE wallet_id = $1 AND reference = $2 \
             AND status IN ('pending', 'processing') FOR UPDATE",
        )
        .bind(wallet_id)
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| WagerError::TransactionNotFound {
            reference: reference.to_string(),
        })?;
        let mut entry: Transaction = record.try_into()?;

        match resolution {
            TransactionResolution::Complete => {
                wallet.check_admission(entry.kind, entry.amount)?;
                complete_entry(&mut wallet, &mut entry, now)?;
                persist_wallet(&mut tx, &wallet).await?;
            }
            TransactionResolution::Fail { reason } => {
                entry.status = TransactionStatus::Failed;
                entry.failure_reason = Some(reason);
            }
            TransactionResolution::Cancel { reason } => {
                entry.status = TransactionStatus::Canceled;
                entry.failure_reason = Some(reason);
            }
        }
        update_transaction(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok((wallet, entry))
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        record.map(Transaction::try_from).transpose()
    }

    async fn transactions_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE wallet_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(Transaction::try_from).collect()
    }

    async fn deposits_since(&self, wallet_id: Uuid, since: DateTime<Utc>) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM transactions \
             WHERE wallet_id = $1 AND kind = 'deposit' AND status = 'completed' \
             AND completed_at >= $2",
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<Decimal, _>("total"))
    }

    async fn place_bet(
        &self,
        bet: Bet,
        debit: NewTransaction,
    ) -> Result<(Bet, Wallet, Transaction)> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut wallet = wallet_for_user_for_update(&mut tx, bet.user_id).await?;

        let entry = stage_entry(&mut wallet, debit, now)?;
        insert_transaction(&mut tx, &entry).await?;
        persist_wallet(&mut tx, &wallet).await?;

        sqlx::query(
            "INSERT INTO bets (id, user_id, match_id, selection, amount, odds, \
             potential_return, status, bet_slip_id, settlement, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(bet.id)
        .bind(bet.user_id)
        .bind(&bet.match_id)
        .bind(serde_json::to_value(&bet.selection)?)
        .bind(bet.amount)
        .bind(bet.odds)
        .bind(bet.potential_return)
        .bind(bet.status.as_str())
        .bind(&bet.bet_slip_id)
        .bind(Option::<serde_json::Value>::None)
        .bind(bet.created_at)
        .bind(bet.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, &bet.bet_slip_id))?;

        sqlx::query(
            "UPDATE matches SET total_bets = total_bets + 1, \
             total_bet_amount = total_bet_amount + $2, updated_at = $3 WHERE id = $1",
        )
        .bind(&bet.match_id)
        .bind(bet.amount)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((bet, wallet, entry))
    }

    async fn bet(&self, bet_id: Uuid) -> Result<Bet> {
        let record = sqlx::query_as::<_, BetRecord>("SELECT * FROM bets WHERE id = $1")
            .bind(bet_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| WagerError::BetNotFound {
                bet_id: bet_id.to_string(),
            })?;
        record.try_into()
    }

    async fn pending_bets_for_match(&self, match_id: &str) -> Result<Vec<Bet>> {
        let records = sqlx::query_as::<_, BetRecord>(
            "SELECT * FROM bets WHERE match_id = $1 AND status = 'pending' \
             ORDER BY created_at",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(Bet::try_from).collect()
    }

    async fn bets_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Bet>> {
        let records = sqlx::query_as::<_, BetRecord>(
            "SELECT * FROM bets WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(Bet::try_from).collect()
    }

    async fn settle_bet(
        &self,
        bet: &Bet,
        credit: Option<NewTransaction>,
        events: Vec<NotificationEvent>,
    ) -> Result<Option<Transaction>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Pending-state guard in the WHERE clause: a concurrent settlement
        // path sees zero rows and loses.
        let updated = sqlx::query(
            "UPDATE bets SET status = $2, settlement = $3, updated_at = $4 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(bet.id)
        .bind(bet.status.as_str())
        .bind(
            bet.settlement
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(bet.updated_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            let current = sqlx::query("SELECT status FROM bets WHERE id = $1")
                .bind(bet.id)
                .fetch_optional(&mut *tx)
                .await?;
            return match current {
                Some(row) => Err(WagerError::InvalidStateTransition {
                    status: row.get::<String, _>("status"),
                }),
                None => Err(WagerError::BetNotFound {
                    bet_id: bet.id.to_string(),
                }),
            };
        }

        let committed = match credit {
            Some(request) => {
                let mut wallet = wallet_for_user_for_update(&mut tx, bet.user_id).await?;
                let entry = stage_entry(&mut wallet, request, now)?;
                insert_transaction(&mut tx, &entry).await?;
                persist_wallet(&mut tx, &wallet).await?;
                Some(entry)
            }
            None => None,
        };

        insert_events(&mut tx, &events).await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn match_info(&self, match_id: &str) -> Result<MatchInfo> {
        let record = sqlx::query_as::<_, MatchRecord>("SELECT * FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| WagerError::MatchNotFound {
                match_id: match_id.to_string(),
            })?;
        record.try_into()
    }

    async fn upsert_match(&self, info: &MatchInfo) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches (id, title, status, betting_status, result, odds, \
             total_bets, total_bet_amount, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET title = $2, status = $3, betting_status = $4, \
             result = $5, odds = $6, total_bets = $7, total_bet_amount = $8, updated_at = $9",
        )
        .bind(&info.id)
        .bind(&info.title)
        .bind(info.status.as_str())
        .bind(info.betting_status.as_str())
        .bind(info.result.as_ref().map(serde_json::to_value).transpose()?)
        .bind(serde_json::to_value(&info.odds)?)
        .bind(info.total_bets)
        .bind(info.total_bet_amount)
        .bind(info.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_settled(&self, match_id: &str, result: &MatchResult) -> Result<MatchInfo> {
        let record = sqlx::query_as::<_, MatchRecord>(
            "UPDATE matches SET result = $2, betting_status = 'settled', updated_at = $3 \
             WHERE id = $1 AND status = 'completed' AND betting_status <> 'settled' \
             RETURNING *",
        )
        .bind(match_id)
        .bind(serde_json::to_value(result)?)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) => record.try_into(),
            None => {
                // Distinguish the rejection for the caller.
                let info = self.match_info(match_id).await?;
                let reason = if info.betting_status.as_str() == "settled" {
                    "already settled".to_string()
                } else {
                    format!("match status is {}", info.status.as_str())
                };
                Err(WagerError::MatchNotSettleable {
                    match_id: match_id.to_string(),
                    reason,
                })
            }
        }
    }

    async fn append_events(&self, events: Vec<NotificationEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_events(&mut tx, &events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<NotificationEvent>> {
        let records = sqlx::query_as::<_, OutboxRecord>(
            "SELECT * FROM notification_outbox WHERE dispatched_at IS NULL \
             ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        records
            .into_iter()
            .map(NotificationEvent::try_from)
            .collect()
    }

    async fn mark_dispatched(&self, event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notification_outbox SET dispatched_at = $2 WHERE id = $1")
            .bind(event_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
