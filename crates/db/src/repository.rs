//! Store contract. Every method is one atomic boundary: between the checks
//! and the writes of a single call there is no interleaving I/O, so two
//! concurrent debits against one wallet cannot both pass the funds check.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use wagerbook_models::{
    Bet, MatchInfo, MatchResult, NewTransaction, NotificationEvent, Result, Transaction,
    TransactionResolution, Wallet, WalletSettings,
};

#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    // --- wallets ---

    async fn create_wallet(&self, user_id: Uuid) -> Result<Wallet>;
    async fn wallet(&self, wallet_id: Uuid) -> Result<Wallet>;
    async fn wallet_for_user(&self, user_id: Uuid) -> Result<Wallet>;
    /// `Some(reason)` locks, `None` unlocks.
    async fn set_wallet_lock(&self, wallet_id: Uuid, reason: Option<&str>) -> Result<Wallet>;
    async fn update_wallet_settings(
        &self,
        wallet_id: Uuid,
        settings: WalletSettings,
    ) -> Result<Wallet>;

    // --- ledger ---

    /// Append a ledger entry. Checks admission (lock, amount, funds),
    /// mints a reference if absent, rejects duplicate references via the
    /// storage-layer uniqueness constraint, and applies balance arithmetic
    /// plus aggregates when the entry arrives already completed.
    async fn apply_transaction(
        &self,
        wallet_id: Uuid,
        request: NewTransaction,
    ) -> Result<(Wallet, Transaction)>;

    /// Complete, fail, or cancel a pending/processing entry located by
    /// reference. Missing or already-terminal entries are
    /// `TransactionNotFound`.
    async fn resolve_transaction(
        &self,
        wallet_id: Uuid,
        reference: &str,
        resolution: TransactionResolution,
    ) -> Result<(Wallet, Transaction)>;

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;
    /// Newest first.
    async fn transactions_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>>;
    /// Sum of completed deposits since `since`, for deposit-limit windows.
    async fn deposits_since(&self, wallet_id: Uuid, since: DateTime<Utc>) -> Result<Decimal>;

    // --- bets ---

    /// One boundary: debit the stake, insert the bet, bump the match
    /// betting counters. All or nothing.
    async fn place_bet(
        &self,
        bet: Bet,
        debit: NewTransaction,
    ) -> Result<(Bet, Wallet, Transaction)>;

    async fn bet(&self, bet_id: Uuid) -> Result<Bet>;
    async fn pending_bets_for_match(&self, match_id: &str) -> Result<Vec<Bet>>;
    async fn bets_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Bet>>;

    /// One boundary: persist a bet leaving `pending`, write the optional
    /// payout/refund credit, and append outbox events. The bet row is
    /// guarded on still being pending so a concurrent settlement path loses
    /// with `InvalidStateTransition`.
    async fn settle_bet(
        &self,
        bet: &Bet,
        credit: Option<NewTransaction>,
        events: Vec<NotificationEvent>,
    ) -> Result<Option<Transaction>>;

    // --- matches ---

    async fn match_info(&self, match_id: &str) -> Result<MatchInfo>;
    async fn upsert_match(&self, info: &MatchInfo) -> Result<()>;
    /// Compare-and-settle: records the result and flips `betting_status` to
    /// settled, failing with `MatchNotSettleable` unless the match is
    /// completed and not yet settled. The guard lives here so a second
    /// settlement call loses the race at the store, not in the engine.
    async fn mark_settled(&self, match_id: &str, result: &MatchResult) -> Result<MatchInfo>;

    // --- notification outbox ---

    /// Durable events outside any bet boundary (e.g. the batched "lost"
    /// notification covering a whole match).
    async fn append_events(&self, events: Vec<NotificationEvent>) -> Result<()>;
    async fn pending_events(&self, limit: i64) -> Result<Vec<NotificationEvent>>;
    async fn mark_dispatched(&self, event_id: Uuid) -> Result<()>;
}
