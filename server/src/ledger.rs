use common::{EntryKind, LedgerEntry, Stake, User, WagerError};
use rust_decimal::Decimal;
use serde::Deserialize;

/// What to do when a debit would take a balance below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverdraftPolicy {
    #[default]
    Reject,
    Allow,
}

/// Decides the balance movement for each wager transition. The movement is
/// applied by the store in the same transaction as the wager write.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ledger {
    policy: OverdraftPolicy,
}

impl Ledger {
    pub fn new(policy: OverdraftPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OverdraftPolicy {
        self.policy
    }

    /// Poster commits their stake when the wager is posted.
    pub fn settle_post(&self, poster: &User, wager_id: &str, stake: Stake) -> Result<LedgerEntry, WagerError> {
        self.debit(poster, wager_id, stake.amount(), EntryKind::Post)
    }

    /// Acceptor commits the counter stake when the wager is matched.
    pub fn settle_accept(&self, acceptor: &User, wager_id: &str, stake: Stake) -> Result<LedgerEntry, WagerError> {
        self.debit(acceptor, wager_id, stake.amount(), EntryKind::Accept)
    }

    /// Whether the store must refuse `entry` when the balance cannot cover it.
    pub fn guards(&self, entry: &LedgerEntry) -> bool {
        self.policy == OverdraftPolicy::Reject && entry.amount.is_sign_negative()
    }

    /// Winner collects both stakes.
    pub fn settle_payout(&self, winner: &str, wager_id: &str, pot: Decimal) -> LedgerEntry {
        LedgerEntry::credit(winner, wager_id, pot, EntryKind::Payout)
    }

    fn debit(&self, user: &User, wager_id: &str, amount: Decimal, kind: EntryKind) -> Result<LedgerEntry, WagerError> {
        if self.policy == OverdraftPolicy::Reject && user.balance < amount {
            return Err(WagerError::InsufficientFunds {
                balance: user.balance,
                required: amount,
            });
        }
        Ok(LedgerEntry::debit(&user.name, wager_id, amount, kind))
    }
}
