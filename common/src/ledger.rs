use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a balance moved.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Post,
    Accept,
    Payout,
}

/// One signed balance movement. Debits are negative.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user: String,
    pub wager: String,
    pub amount: Decimal,
    pub kind: EntryKind,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn debit(user: impl Into<String>, wager: impl Into<String>, amount: Decimal, kind: EntryKind) -> Self {
        Self::new(user, wager, -amount.abs(), kind)
    }

    pub fn credit(user: impl Into<String>, wager: impl Into<String>, amount: Decimal, kind: EntryKind) -> Self {
        Self::new(user, wager, amount.abs(), kind)
    }

    fn new(user: impl Into<String>, wager: impl Into<String>, amount: Decimal, kind: EntryKind) -> Self {
        Self {
            user: user.into(),
            wager: wager.into(),
            amount,
            kind,
            recorded_at: Utc::now(),
        }
    }
}
