//! Balance arithmetic shared by the store implementations. Both run these
//! on staged copies inside their own atomic boundary, so a failed check
//! never leaves a partial write behind.

use chrono::{DateTime, Utc};

use wagerbook_models::{
    NewTransaction, Result, Transaction, TransactionStatus, WagerError, Wallet,
};

/// Move a transaction into `completed`: re-check funds against the current
/// balance, apply the arithmetic and aggregates, stamp the snapshot.
pub(crate) fn complete_entry(
    wallet: &mut Wallet,
    tx: &mut Transaction,
    now: DateTime<Utc>,
) -> Result<()> {
    if tx.kind.is_debit() && tx.amount > wallet.balance {
        return Err(WagerError::InsufficientFunds {
            requested: tx.amount,
            available: wallet.balance,
        });
    }
    let balance_after = wallet.apply(tx, now)?;
    tx.status = TransactionStatus::Completed;
    tx.balance_after = Some(balance_after);
    tx.completed_at = Some(now);
    Ok(())
}

/// Admit and materialize a new ledger entry against a staged wallet,
/// completing it in place when the request arrives as `completed`.
/// Reference uniqueness is the caller's concern (set lookup in memory,
/// unique index in Postgres).
pub(crate) fn stage_entry(
    wallet: &mut Wallet,
    request: NewTransaction,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    wallet.check_admission(request.kind, request.amount)?;
    let wants_completion = request.status == TransactionStatus::Completed;
    let mut tx = request.into_transaction(wallet.id, wallet.user_id, now)?;
    if wants_completion {
        complete_entry(wallet, &mut tx, now)?;
    }
    Ok(tx)
}
