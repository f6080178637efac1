use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WagerError};
use crate::ids;
use crate::matches::{MatchInfo, MatchResult};

/// What the bettor backed. Covers both the plain match-winner market and
/// special markets (first blood, map score, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "market", rename_all = "snake_case")]
pub enum BetSelection {
    MatchWinner { team_id: String },
    SpecialMarket { market_id: String, option_id: String },
}

impl BetSelection {
    pub fn describe(&self) -> String {
        match self {
            Self::MatchWinner { team_id } => format!("match_winner:{team_id}"),
            Self::SpecialMarket {
                market_id,
                option_id,
            } => format!("{market_id}:{option_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Canceled,
    Void,
}

impl BetStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Canceled => "canceled",
            Self::Void => "void",
        }
    }
}

impl std::str::FromStr for BetStatus {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "canceled" => Ok(Self::Canceled),
            "void" => Ok(Self::Void),
            other => Err(WagerError::Config(format!("unknown bet status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// A credit is owed and not yet written to the ledger.
    Pending,
    /// Paid out, or nothing was owed.
    Processed,
}

/// Written exactly once, when the bet leaves `pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementData {
    pub settled_at: DateTime<Utc>,
    pub result: MatchResult,
    pub payout_amount: Decimal,
    pub payout_status: PayoutStatus,
    pub reason: Option<String>,
}

/// How a settlement attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Won,
    Lost,
    /// Special-market bet whose market is absent from the submitted result.
    /// The bet stays pending until a fuller result arrives; callers surface
    /// this through a diagnostic counter rather than an error.
    Unresolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_id: String,
    pub selection: BetSelection,
    pub amount: Decimal,
    pub odds: Decimal,
    pub potential_return: Decimal,
    pub status: BetStatus,
    pub bet_slip_id: String,
    pub settlement: Option<SettlementData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bet {
    pub fn new(
        user_id: Uuid,
        match_id: impl Into<String>,
        selection: BetSelection,
        amount: Decimal,
        odds: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(WagerError::InvalidAmount { amount });
        }
        if odds < Decimal::ONE {
            return Err(WagerError::Config(format!(
                "odds must be at least 1.0, got {odds}"
            )));
        }

        let mut bet = Self {
            id: Uuid::new_v4(),
            user_id,
            match_id: match_id.into(),
            selection,
            amount,
            odds,
            potential_return: Decimal::ZERO,
            status: BetStatus::Pending,
            bet_slip_id: ids::bet_slip_id(user_id, now),
            settlement: None,
            created_at: now,
            updated_at: now,
        };
        bet.recalculate_potential_return();
        Ok(bet)
    }

    /// `round(amount * odds, 2)`. Called on construction and whenever amount
    /// or odds change pre-settlement.
    pub fn recalculate_potential_return(&mut self) {
        self.potential_return = (self.amount * self.odds).round_dp(2);
    }

    fn guard_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(WagerError::InvalidStateTransition {
                status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Resolve this bet against a finalized result. Valid only from
    /// `pending`; a terminal bet rejects with `InvalidStateTransition` and
    /// its settlement data is left untouched.
    pub fn settle(&mut self, result: &MatchResult, now: DateTime<Utc>) -> Result<SettleOutcome> {
        self.guard_pending()?;

        let won = match &self.selection {
            BetSelection::MatchWinner { team_id } => {
                result.winner_team_id.as_deref() == Some(team_id.as_str())
            }
            BetSelection::SpecialMarket {
                market_id,
                option_id,
            } => match result.market_result(market_id) {
                Some(market) => market.winning_option_id == *option_id,
                // Data-completeness gate: the market was not reported, so
                // leave the bet pending for a later, fuller result.
                None => return Ok(SettleOutcome::Unresolved),
            },
        };

        self.settle_as(won, result.clone(), now)?;
        Ok(if won {
            SettleOutcome::Won
        } else {
            SettleOutcome::Lost
        })
    }

    /// Force a won/lost outcome with the given result snapshot. Backs both
    /// automatic settlement and the admin single-bet override.
    pub fn settle_as(&mut self, won: bool, result: MatchResult, now: DateTime<Utc>) -> Result<()> {
        self.guard_pending()?;
        self.status = if won { BetStatus::Won } else { BetStatus::Lost };
        self.settlement = Some(SettlementData {
            settled_at: now,
            result,
            payout_amount: if won {
                self.potential_return
            } else {
                Decimal::ZERO
            },
            payout_status: if won {
                PayoutStatus::Pending
            } else {
                PayoutStatus::Processed
            },
            reason: None,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Bettor-initiated cancellation; refunds the full stake.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.guard_pending()?;
        self.finalize_refund(BetStatus::Canceled, reason, now);
        Ok(())
    }

    /// Admin-initiated void; same refund mechanics, distinct actor trail.
    pub fn void(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.guard_pending()?;
        self.finalize_refund(BetStatus::Void, reason, now);
        Ok(())
    }

    fn finalize_refund(&mut self, status: BetStatus, reason: &str, now: DateTime<Utc>) {
        self.status = status;
        self.settlement = Some(SettlementData {
            settled_at: now,
            result: MatchResult::default(),
            payout_amount: self.amount,
            payout_status: PayoutStatus::Pending,
            reason: Some(reason.to_string()),
        });
        self.updated_at = now;
    }

    /// Record that the owed payout credit was written to the ledger.
    pub fn mark_payout_processed(&mut self, now: DateTime<Utc>) {
        if let Some(settlement) = &mut self.settlement {
            settlement.payout_status = PayoutStatus::Processed;
        }
        self.updated_at = now;
    }

    /// The single gate used by cancellation and odds-update flows.
    pub fn is_editable(&self, match_info: &MatchInfo) -> bool {
        self.status == BetStatus::Pending && match_info.is_open_for_betting()
    }
}
