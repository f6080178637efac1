//! In-memory store. One `RwLock` write guard spans every operation, which
//! makes each trait method a genuine atomic boundary: all checks and all
//! writes of a call happen under the same guard, and a failed call leaves
//! the maps untouched because mutations are staged on clones and committed
//! last.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use wagerbook_models::{
    Bet, BetStatus, BettingStatus, MatchInfo, MatchResult, MatchStatus, NewTransaction,
    NotificationEvent, Result, Transaction, TransactionKind, TransactionResolution,
    TransactionStatus, WagerError, Wallet, WalletSettings,
};

use crate::ledger::{complete_entry, stage_entry};
use crate::repository::Store;

#[derive(Default)]
struct Inner {
    wallets: HashMap<Uuid, Wallet>,
    wallet_by_user: HashMap<Uuid, Uuid>,
    /// Per-wallet ledger, in commit order.
    ledgers: HashMap<Uuid, Vec<Transaction>>,
    references: HashSet<String>,
    bets: HashMap<Uuid, Bet>,
    bet_slips: HashSet<String>,
    matches: HashMap<String, MatchInfo>,
    outbox: Vec<NotificationEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Stage a new entry against a wallet clone, enforcing reference
/// uniqueness against the in-memory set.
fn stage_checked(
    inner: &Inner,
    wallet: &mut Wallet,
    request: NewTransaction,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    let tx = stage_entry(wallet, request, now)?;
    if inner.references.contains(&tx.reference) {
        return Err(WagerError::DuplicateReference {
            reference: tx.reference.clone(),
        });
    }
    Ok(tx)
}

fn commit_entry(inner: &mut Inner, wallet: Wallet, tx: Transaction) {
    inner.references.insert(tx.reference.clone());
    inner.ledgers.entry(wallet.id).or_default().push(tx);
    inner.wallets.insert(wallet.id, wallet);
}

fn completed_deposits_since(inner: &Inner, wallet_id: Uuid, since: DateTime<Utc>) -> Decimal {
    inner
        .ledgers
        .get(&wallet_id)
        .map(|entries| {
            entries
                .iter()
                .filter(|tx| {
                    tx.kind == TransactionKind::Deposit
                        && tx.status == TransactionStatus::Completed
                        && tx.completed_at.is_some_and(|at| at >= since)
                })
                .map(|tx| tx.amount)
                .sum()
        })
        .unwrap_or(Decimal::ZERO)
}

/// Deposit-limit windows are enforced under the same lock that commits the
/// entry, so two in-flight deposits cannot jointly exceed a cap.
fn check_deposit_windows(
    inner: &Inner,
    wallet: &Wallet,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    for (period, limit, window) in wallet.settings.deposit_windows() {
        let deposited = completed_deposits_since(inner, wallet.id, now - window);
        if deposited + amount > limit {
            return Err(WagerError::DepositLimitExceeded {
                period: period.to_string(),
                limit,
            });
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    async fn create_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        let mut inner = self.inner.write().await;
        if let Some(wallet_id) = inner.wallet_by_user.get(&user_id) {
            return Ok(inner.wallets[wallet_id].clone());
        }
        let wallet = Wallet::new(user_id, Utc::now());
        inner.wallet_by_user.insert(user_id, wallet.id);
        inner.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        let inner = self.inner.read().await;
        inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })
    }

    async fn wallet_for_user(&self, user_id: Uuid) -> Result<Wallet> {
        let inner = self.inner.read().await;
        inner
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| inner.wallets.get(id))
            .cloned()
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn set_wallet_lock(&self, wallet_id: Uuid, reason: Option<&str>) -> Result<Wallet> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut wallet = inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })?;
        match reason {
            Some(reason) => wallet.lock(reason, now)?,
            None => wallet.unlock(now),
        }
        inner.wallets.insert(wallet_id, wallet.clone());
        Ok(wallet)
    }

    async fn update_wallet_settings(
        &self,
        wallet_id: Uuid,
        settings: WalletSettings,
    ) -> Result<Wallet> {
        let mut inner = self.inner.write().await;
        let wallet = inner
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })?;
        wallet.settings = settings;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn apply_transaction(
        &self,
        wallet_id: Uuid,
        request: NewTransaction,
    ) -> Result<(Wallet, Transaction)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut wallet = inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })?;
        if request.kind == TransactionKind::Deposit {
            check_deposit_windows(&inner, &wallet, request.amount, now)?;
        }
        let tx = stage_checked(&inner, &mut wallet, request, now)?;
        commit_entry(&mut inner, wallet.clone(), tx.clone());
        Ok((wallet, tx))
    }

    async fn resolve_transaction(
        &self,
        wallet_id: Uuid,
        reference: &str,
        resolution: TransactionResolution,
    ) -> Result<(Wallet, Transaction)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut wallet = inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| WagerError::WalletNotFound {
                user_id: wallet_id.to_string(),
            })?;

        let ledger = inner.ledgers.entry(wallet_id).or_default();
        let position = ledger
            .iter()
            .position(|tx| tx.reference == reference && !tx.status.is_terminal())
            .ok_or_else(|| WagerError::TransactionNotFound {
                reference: reference.to_string(),
            })?;

        let mut tx = ledger[position].clone();
        match resolution {
            TransactionResolution::Complete => {
                wallet.check_admission(tx.kind, tx.amount)?;
                complete_entry(&mut wallet, &mut tx, now)?;
            }
            TransactionResolution::Fail { reason } => {
                tx.status = TransactionStatus::Failed;
                tx.failure_reason = Some(reason);
            }
            TransactionResolution::Cancel { reason } => {
                tx.status = TransactionStatus::Canceled;
                tx.failure_reason = Some(reason);
            }
        }

        if let Some(ledger) = inner.ledgers.get_mut(&wallet_id) {
            ledger[position] = tx.clone();
        }
        inner.wallets.insert(wallet_id, wallet.clone());
        Ok((wallet, tx))
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledgers
            .values()
            .flatten()
            .find(|tx| tx.reference == reference)
            .cloned())
    }

    async fn transactions_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        let entries = inner.ledgers.get(&wallet_id).cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn deposits_since(&self, wallet_id: Uuid, since: DateTime<Utc>) -> Result<Decimal> {
        let inner = self.inner.read().await;
        Ok(completed_deposits_since(&inner, wallet_id, since))
    }

    async fn place_bet(
        &self,
        bet: Bet,
        debit: NewTransaction,
    ) -> Result<(Bet, Wallet, Transaction)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let wallet_id = *inner.wallet_by_user.get(&bet.user_id).ok_or_else(|| {
            WagerError::WalletNotFound {
                user_id: bet.user_id.to_string(),
            }
        })?;
        let mut wallet = inner.wallets[&wallet_id].clone();

        if inner.bet_slips.contains(&bet.bet_slip_id) {
            return Err(WagerError::DuplicateReference {
                reference: bet.bet_slip_id.clone(),
            });
        }

        let tx = stage_checked(&inner, &mut wallet, debit, now)?;

        // All checks passed; commit the whole boundary.
        commit_entry(&mut inner, wallet.clone(), tx.clone());
        inner.bet_slips.insert(bet.bet_slip_id.clone());
        inner.bets.insert(bet.id, bet.clone());
        if let Some(m) = inner.matches.get_mut(&bet.match_id) {
            m.total_bets += 1;
            m.total_bet_amount += bet.amount;
            m.updated_at = now;
        }
        Ok((bet, wallet, tx))
    }

    async fn bet(&self, bet_id: Uuid) -> Result<Bet> {
        let inner = self.inner.read().await;
        inner
            .bets
            .get(&bet_id)
            .cloned()
            .ok_or_else(|| WagerError::BetNotFound {
                bet_id: bet_id.to_string(),
            })
    }

    async fn pending_bets_for_match(&self, match_id: &str) -> Result<Vec<Bet>> {
        let inner = self.inner.read().await;
        let mut bets: Vec<Bet> = inner
            .bets
            .values()
            .filter(|b| b.match_id == match_id && b.status == BetStatus::Pending)
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    async fn bets_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Bet>> {
        let inner = self.inner.read().await;
        let mut bets: Vec<Bet> = inner
            .bets
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bets.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(bets)
    }

    async fn settle_bet(
        &self,
        bet: &Bet,
        credit: Option<NewTransaction>,
        events: Vec<NotificationEvent>,
    ) -> Result<Option<Transaction>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let stored = inner
            .bets
            .get(&bet.id)
            .ok_or_else(|| WagerError::BetNotFound {
                bet_id: bet.id.to_string(),
            })?;
        // Pending-state guard: a concurrent settlement path loses here.
        if stored.status.is_terminal() {
            return Err(WagerError::InvalidStateTransition {
                status: stored.status.as_str().to_string(),
            });
        }

        let staged_credit = match credit {
            Some(request) => {
                let wallet_id = *inner.wallet_by_user.get(&bet.user_id).ok_or_else(|| {
                    WagerError::WalletNotFound {
                        user_id: bet.user_id.to_string(),
                    }
                })?;
                let mut wallet = inner.wallets[&wallet_id].clone();
                let tx = stage_checked(&inner, &mut wallet, request, now)?;
                Some((wallet, tx))
            }
            None => None,
        };

        let committed = staged_credit.map(|(wallet, tx)| {
            commit_entry(&mut inner, wallet, tx.clone());
            tx
        });
        inner.bets.insert(bet.id, bet.clone());
        inner.outbox.extend(events);
        Ok(committed)
    }

    async fn match_info(&self, match_id: &str) -> Result<MatchInfo> {
        let inner = self.inner.read().await;
        inner
            .matches
            .get(match_id)
            .cloned()
            .ok_or_else(|| WagerError::MatchNotFound {
                match_id: match_id.to_string(),
            })
    }

    async fn upsert_match(&self, info: &MatchInfo) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.matches.insert(info.id.clone(), info.clone());
        Ok(())
    }

    async fn mark_settled(&self, match_id: &str, result: &MatchResult) -> Result<MatchInfo> {
        let mut inner = self.inner.write().await;
        let m = inner
            .matches
            .get_mut(match_id)
            .ok_or_else(|| WagerError::MatchNotFound {
                match_id: match_id.to_string(),
            })?;
        if m.status != MatchStatus::Completed {
            return Err(WagerError::MatchNotSettleable {
                match_id: match_id.to_string(),
                reason: format!("match status is {}", m.status.as_str()),
            });
        }
        if m.betting_status == BettingStatus::Settled {
            return Err(WagerError::MatchNotSettleable {
                match_id: match_id.to_string(),
                reason: "already settled".to_string(),
            });
        }
        m.result = Some(result.clone());
        m.betting_status = BettingStatus::Settled;
        m.updated_at = Utc::now();
        Ok(m.clone())
    }

    async fn append_events(&self, events: Vec<NotificationEvent>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.outbox.extend(events);
        Ok(())
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<NotificationEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.is_pending())
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn mark_dispatched(&self, event_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.outbox.iter_mut().find(|e| e.id == event_id) {
            event.dispatched_at = Some(Utc::now());
        }
        Ok(())
    }
}
