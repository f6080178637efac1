//! Read-only view of a match as the ledger and settlement engine consume
//! it. CRUD for matches lives outside this system.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
    Canceled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BettingStatus {
    Open,
    Suspended,
    Closed,
    Settled,
}

impl BettingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
            Self::Settled => "settled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecialMarketResult {
    pub market_id: String,
    pub winning_option_id: String,
}

/// Authoritative outcome submitted by the result pipeline. Snapshotted onto
/// each settled bet for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub winner_team_id: Option<String>,
    #[serde(default)]
    pub special_market_results: Vec<SpecialMarketResult>,
}

impl MatchResult {
    pub fn winner(team_id: impl Into<String>) -> Self {
        Self {
            winner_team_id: Some(team_id.into()),
            special_market_results: Vec::new(),
        }
    }

    pub fn market_result(&self, market_id: &str) -> Option<&SpecialMarketResult> {
        self.special_market_results
            .iter()
            .find(|r| r.market_id == market_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamOdds {
    pub team_id: String,
    pub odds: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketOption {
    pub option_id: String,
    pub odds: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialMarketOdds {
    pub market_id: String,
    pub options: Vec<MarketOption>,
}

/// Published prices at placement time. Client-submitted odds are verified
/// against these, never trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchOdds {
    #[serde(default)]
    pub teams: Vec<TeamOdds>,
    #[serde(default)]
    pub special_markets: Vec<SpecialMarketOdds>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchInfo {
    pub id: String,
    pub title: String,
    pub status: MatchStatus,
    pub betting_status: BettingStatus,
    pub result: Option<MatchResult>,
    pub odds: MatchOdds,
    pub total_bets: i64,
    pub total_bet_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl MatchInfo {
    pub fn is_open_for_betting(&self) -> bool {
        self.status == MatchStatus::Upcoming && self.betting_status == BettingStatus::Open
    }

    /// Published price for a team-winner selection.
    pub fn team_odds(&self, team_id: &str) -> Option<Decimal> {
        self.odds
            .teams
            .iter()
            .find(|t| t.team_id == team_id)
            .map(|t| t.odds)
    }

    /// Published price for a special-market option.
    pub fn market_option_odds(&self, market_id: &str, option_id: &str) -> Option<Decimal> {
        self.odds
            .special_markets
            .iter()
            .find(|m| m.market_id == market_id)?
            .options
            .iter()
            .find(|o| o.option_id == option_id)
            .map(|o| o.odds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_match() -> MatchInfo {
        MatchInfo {
            id: "match_101".to_string(),
            title: "Nova Five vs Iron Wolves".to_string(),
            status: MatchStatus::Upcoming,
            betting_status: BettingStatus::Open,
            result: None,
            odds: MatchOdds {
                teams: vec![
                    TeamOdds {
                        team_id: "team_101".to_string(),
                        odds: dec!(1.85),
                    },
                    TeamOdds {
                        team_id: "team_202".to_string(),
                        odds: dec!(2.10),
                    },
                ],
                special_markets: vec![SpecialMarketOdds {
                    market_id: "first_blood".to_string(),
                    options: vec![MarketOption {
                        option_id: "team_101".to_string(),
                        odds: dec!(1.95),
                    }],
                }],
            },
            total_bets: 0,
            total_bet_amount: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_odds_lookup() {
        let m = sample_match();
        assert_eq!(m.team_odds("team_101"), Some(dec!(1.85)));
        assert_eq!(m.team_odds("team_999"), None);
        assert_eq!(
            m.market_option_odds("first_blood", "team_101"),
            Some(dec!(1.95))
        );
        assert_eq!(m.market_option_odds("first_blood", "team_202"), None);
    }

    #[test]
    fn test_betting_window() {
        let mut m = sample_match();
        assert!(m.is_open_for_betting());

        m.betting_status = BettingStatus::Suspended;
        assert!(!m.is_open_for_betting());

        m.betting_status = BettingStatus::Open;
        m.status = MatchStatus::Live;
        assert!(!m.is_open_for_betting());
    }
}
