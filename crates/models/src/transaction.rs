use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WagerError};
use crate::ids;

/// What a ledger entry does to the wallet balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    BetPlaced,
    BetWon,
    BetRefund,
    Bonus,
    Adjustment,
}

impl TransactionKind {
    /// Kinds that remove funds and therefore require a covered balance.
    pub fn is_debit(self) -> bool {
        matches!(self, Self::Withdrawal | Self::BetPlaced)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::BetPlaced => "bet_placed",
            Self::BetWon => "bet_won",
            Self::BetRefund => "bet_refund",
            Self::Bonus => "bonus",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "bet_placed" => Ok(Self::BetPlaced),
            "bet_won" => Ok(Self::BetWon),
            "bet_refund" => Ok(Self::BetRefund),
            "bonus" => Ok(Self::Bonus),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(WagerError::Config(format!(
                "unknown transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(WagerError::Config(format!(
                "unknown transaction status: {other}"
            ))),
        }
    }
}

/// Correlation payload, tagged by the originating flow rather than a
/// free-form JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionMetadata {
    #[default]
    None,
    Payment {
        channel: String,
    },
    BetPlaced {
        bet_id: Uuid,
        match_id: String,
    },
    BetWon {
        bet_id: Uuid,
        match_id: String,
        bet_slip_id: String,
    },
    BetRefund {
        bet_id: Uuid,
        reason: String,
    },
    Adjustment {
        admin_id: Uuid,
        reason: String,
    },
}

/// One append-only ledger entry. Never deleted; only `status`,
/// `balance_after`, `failure_reason` and `completed_at` move during its own
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub reference: String,
    pub balance_after: Option<Decimal>,
    pub metadata: TransactionMetadata,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Contribution to the wallet balance once completed. Debit kinds carry
    /// a positive `amount` and contribute negatively; adjustments carry
    /// their own sign.
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_debit() {
            -self.amount
        } else {
            self.amount
        }
    }
}

/// Request to append a ledger entry; turned into a [`Transaction`] inside
/// the store's atomic boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    /// Caller-supplied idempotency key; generated when absent.
    pub reference: Option<String>,
    pub metadata: TransactionMetadata,
}

impl NewTransaction {
    pub fn new(kind: TransactionKind, status: TransactionStatus, amount: Decimal) -> Self {
        Self {
            kind,
            status,
            amount,
            reference: None,
            metadata: TransactionMetadata::None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: TransactionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize the entry, minting a reference if the caller did not
    /// supply one. Amount and funds checks happen against the wallet in the
    /// same atomic boundary, not here.
    pub fn into_transaction(self, wallet_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<Transaction> {
        if self.amount == Decimal::ZERO {
            return Err(WagerError::InvalidAmount {
                amount: self.amount,
            });
        }

        let reference = self
            .reference
            .unwrap_or_else(|| ids::transaction_reference(user_id, now));

        Ok(Transaction {
            id: Uuid::new_v4(),
            wallet_id,
            kind: self.kind,
            status: self.status,
            amount: self.amount,
            reference,
            balance_after: None,
            metadata: self.metadata,
            failure_reason: None,
            created_at: now,
            completed_at: None,
        })
    }
}

/// Terminal resolutions for a pending/processing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum TransactionResolution {
    Complete,
    Fail { reason: String },
    Cancel { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_amount_directions() {
        let mut tx = Transaction {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            kind: TransactionKind::Deposit,
            status: TransactionStatus::Completed,
            amount: dec!(25),
            reference: "TXN-TEST-000001-0001".to_string(),
            balance_after: None,
            metadata: TransactionMetadata::None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        assert_eq!(tx.signed_amount(), dec!(25));

        tx.kind = TransactionKind::Withdrawal;
        assert_eq!(tx.signed_amount(), dec!(-25));

        tx.kind = TransactionKind::BetPlaced;
        assert_eq!(tx.signed_amount(), dec!(-25));

        tx.kind = TransactionKind::Adjustment;
        tx.amount = dec!(-10);
        assert_eq!(tx.signed_amount(), dec!(-10));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let request = NewTransaction::new(
            TransactionKind::Deposit,
            TransactionStatus::Pending,
            Decimal::ZERO,
        );

        let result = request.into_transaction(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assert!(matches!(result, Err(WagerError::InvalidAmount { .. })));
    }

    #[test]
    fn test_reference_generated_when_absent() {
        let request = NewTransaction::new(
            TransactionKind::Deposit,
            TransactionStatus::Pending,
            dec!(50),
        );

        let tx = request
            .into_transaction(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert!(tx.reference.starts_with("TXN-"));
    }

    #[test]
    fn test_caller_reference_preserved() {
        let request = NewTransaction::new(
            TransactionKind::Deposit,
            TransactionStatus::Pending,
            dec!(50),
        )
        .with_reference("TXN-ABCD-123456-9999");

        let tx = request
            .into_transaction(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(tx.reference, "TXN-ABCD-123456-9999");
    }

    #[test]
    fn test_metadata_tagged_serialization() {
        let metadata = TransactionMetadata::BetPlaced {
            bet_id: Uuid::new_v4(),
            match_id: "match_7".to_string(),
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["kind"], "bet_placed");
        assert_eq!(json["match_id"], "match_7");
    }
}
