//! Row types for the Postgres store and their conversions to the domain
//! models. Statuses and kinds travel as text, structured payloads as JSONB.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use wagerbook_models::{
    Bet, BetSelection, BettingStatus, MatchInfo, MatchOdds, MatchResult, NotificationEvent,
    NotificationPayload, Result, SettlementData, Transaction, TransactionMetadata, WagerError,
    Wallet, WalletSettings,
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletRecord {
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
    pub daily_deposit_limit: Option<Decimal>,
    pub weekly_deposit_limit: Option<Decimal>,
    pub monthly_deposit_limit: Option<Decimal>,
    pub last_deposit_at: Option<DateTime<Utc>>,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub last_bet_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRecord> for Wallet {
    fn from(r: WalletRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            balance: r.balance,
            locked_balance: r.locked_balance,
            bonus_balance: r.bonus_balance,
            total_deposited: r.total_deposited,
            total_withdrawn: r.total_withdrawn,
            total_bet: r.total_bet,
            total_won: r.total_won,
            is_locked: r.is_locked,
            lock_reason: r.lock_reason,
            settings: WalletSettings {
                daily_deposit_limit: r.daily_deposit_limit,
                weekly_deposit_limit: r.weekly_deposit_limit,
                monthly_deposit_limit: r.monthly_deposit_limit,
            },
            last_deposit_at: r.last_deposit_at,
            last_withdrawal_at: r.last_withdrawal_at,
            last_bet_at: r.last_bet_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: String,
    pub status: String,
    pub amount: Decimal,
    pub reference: String,
    pub balance_after: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = WagerError;

    fn try_from(r: TransactionRecord) -> Result<Self> {
        Ok(Self {
            id: r.id,
            wallet_id: r.wallet_id,
            kind: r.kind.parse()?,
            status: r.status.parse()?,
            amount: r.amount,
            reference: r.reference,
            balance_after: r.balance_after,
            metadata: serde_json::from_value::<TransactionMetadata>(r.metadata)?,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            completed_at: r.completed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BetRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_id: String,
    pub selection: serde_json::Value,
    pub amount: Decimal,
    pub odds: Decimal,
    pub potential_return: Decimal,
    pub status: String,
    pub bet_slip_id: String,
    pub settlement: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BetRecord> for Bet {
    type Error = WagerError;

    fn try_from(r: BetRecord) -> Result<Self> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            match_id: r.match_id,
            selection: serde_json::from_value::<BetSelection>(r.selection)?,
            amount: r.amount,
            odds: r.odds,
            potential_return: r.potential_return,
            status: r.status.parse()?,
            bet_slip_id: r.bet_slip_id,
            settlement: r
                .settlement
                .map(serde_json::from_value::<SettlementData>)
                .transpose()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub title: String,
    pub status: String,
    pub betting_status: String,
    pub result: Option<serde_json::Value>,
    pub odds: serde_json::Value,
    pub total_bets: i64,
    pub total_bet_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MatchRecord> for MatchInfo {
    type Error = WagerError;

    fn try_from(r: MatchRecord) -> Result<Self> {
        let status = match r.status.as_str() {
            "upcoming" => wagerbook_models::MatchStatus::Upcoming,
            "live" => wagerbook_models::MatchStatus::Live,
            "completed" => wagerbook_models::MatchStatus::Completed,
            "canceled" => wagerbook_models::MatchStatus::Canceled,
            other => {
                return Err(WagerError::Config(format!("unknown match status: {other}")))
            }
        };
        let betting_status = match r.betting_status.as_str() {
            "open" => BettingStatus::Open,
            "suspended" => BettingStatus::Suspended,
            "closed" => BettingStatus::Closed,
            "settled" => BettingStatus::Settled,
            other => {
                return Err(WagerError::Config(format!(
                    "unknown betting status: {other}"
                )))
            }
        };
        Ok(Self {
            id: r.id,
            title: r.title,
            status,
            betting_status,
            result: r
                .result
                .map(serde_json::from_value::<MatchResult>)
                .transpose()?,
            odds: serde_json::from_value::<MatchOdds>(r.odds)?,
            total_bets: r.total_bets,
            total_bet_amount: r.total_bet_amount,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRecord> for NotificationEvent {
    type Error = WagerError;

    fn try_from(r: OutboxRecord) -> Result<Self> {
        Ok(Self {
            id: r.id,
            payload: serde_json::from_value::<NotificationPayload>(r.payload)?,
            created_at: r.created_at,
            dispatched_at: r.dispatched_at,
        })
    }
}
