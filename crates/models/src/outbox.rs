//! Durable notification events. Settlement writes these in the same atomic
//! boundary as the ledger credit; a background worker drains them to the
//! notifier, so delivery failures never touch settlement correctness.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// One per winning bet.
    Won {
        user_id: Uuid,
        bet_slip_id: String,
        amount: Decimal,
    },
    /// One per settled match, user ids deduplicated.
    BatchLost {
        user_ids: Vec<Uuid>,
        match_title: String,
    },
    /// Stake returned after a cancel or void.
    Refunded {
        user_id: Uuid,
        bet_slip_id: String,
        amount: Decimal,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl NotificationEvent {
    pub fn new(payload: NotificationPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            created_at: now,
            dispatched_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.dispatched_at.is_none()
    }
}
