use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WagerError {
    #[error("Invalid transaction amount: {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Wallet is locked: {reason}")]
    WalletLocked { reason: String },

    #[error("Wallet not found for user {user_id}")]
    WalletNotFound { user_id: String },

    #[error("Transaction not found or already finalized: {reference}")]
    TransactionNotFound { reference: String },

    #[error("Duplicate transaction reference: {reference}")]
    DuplicateReference { reference: String },

    #[error("Bet not found: {bet_id}")]
    BetNotFound { bet_id: String },

    #[error("Bet already finalized as {status}")]
    InvalidStateTransition { status: String },

    #[error("Stake {amount} below minimum {minimum}")]
    StakeBelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Odds mismatch for {selection}: submitted {submitted}, published {published}")]
    OddsMismatch {
        selection: String,
        submitted: Decimal,
        published: Decimal,
    },

    #[error("Selection {selection} is not offered on match {match_id}")]
    SelectionNotOffered { match_id: String, selection: String },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("Match {match_id} is not settleable: {reason}")]
    MatchNotSettleable { match_id: String, reason: String },

    #[error("Betting is closed on match {match_id}")]
    BettingClosed { match_id: String },

    #[error("Deposit limit exceeded for period {period}: limit {limit}")]
    DepositLimitExceeded { period: String, limit: Decimal },

    #[error("Lock reason must not be empty")]
    EmptyLockReason,

    // Balance went negative after arithmetic that InsufficientFunds should
    // have blocked. Indicates an upstream logic bug; callers must alert.
    #[error("FATAL: wallet {wallet_id} balance would go negative: {balance}")]
    NegativeBalance { wallet_id: String, balance: Decimal },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WagerError {
    /// Business-rule rejections a retrying client can act on; everything
    /// else is an internal fault.
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            Self::NegativeBalance { .. }
                | Self::Database(_)
                | Self::Serialization(_)
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WagerError>;
