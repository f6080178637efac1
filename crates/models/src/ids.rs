//! Human-readable reference generation.
//!
//! Both formats double as idempotency keys and carry a globally-unique
//! constraint at the storage layer:
//! `TXN-<4-char-user-prefix>-<6-digit-time-suffix>-<4-digit-random>` for
//! ledger transactions, `BET-...` for bet slips.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

fn user_prefix(user_id: Uuid) -> String {
    user_id.simple().to_string()[..4].to_uppercase()
}

fn time_suffix(at: DateTime<Utc>) -> String {
    format!("{:06}", at.timestamp_millis().rem_euclid(1_000_000))
}

fn compose(tag: &str, user_id: Uuid, at: DateTime<Utc>) -> String {
    let random: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}-{}-{}-{:04}",
        tag,
        user_prefix(user_id),
        time_suffix(at),
        random
    )
}

/// New transaction reference, e.g. `TXN-9F3A-482917-0731`.
pub fn transaction_reference(user_id: Uuid, at: DateTime<Utc>) -> String {
    compose("TXN", user_id, at)
}

/// New bet slip id, e.g. `BET-9F3A-482917-0731`.
pub fn bet_slip_id(user_id: Uuid, at: DateTime<Utc>) -> String {
    compose("BET", user_id, at)
}
