//! Stake conversion between the two parties of a wager.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WagerError};

/// Rounds to whole cents, halves away from zero.
pub fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn odds_ratio(odds: i32) -> Result<Decimal> {
    if odds == 0 {
        return Err(WagerError::InvalidOdds);
    }
    Ok(Decimal::from(odds.unsigned_abs()) / Decimal::ONE_HUNDRED)
}

/// What the acceptor must risk against `poster_stake` at `odds`.
///
/// `poster_stake / (|odds| / 100)`, rounded to cents, for either sign of odds.
pub fn counter_stake(odds: i32, poster_stake: Decimal) -> Result<Decimal> {
    Ok(to_cents(poster_stake / odds_ratio(odds)?))
}

/// Inverse of [`counter_stake`]: the poster stake that `acceptor_stake`
/// answers at `odds`.
pub fn poster_stake_for(odds: i32, acceptor_stake: Decimal) -> Result<Decimal> {
    Ok(to_cents(acceptor_stake * odds_ratio(odds)?))
}

/// Total paid to the winner: both stakes.
pub fn pot(odds: i32, poster_stake: Decimal) -> Result<Decimal> {
    Ok(to_cents(poster_stake) + counter_stake(odds, poster_stake)?)
}

/// Largest stake accepted. Its cents, and a pot of two such stakes, fit an `i64`.
pub fn max_stake() -> Decimal {
    Decimal::new(i64::MAX / 4, 2)
}

/// A strictly positive amount in whole cents, at most [`max_stake`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Stake(Decimal);

impl Stake {
    pub fn new(amount: Decimal) -> Result<Self> {
        let amount = to_cents(amount);
        if amount <= Decimal::ZERO || amount > max_stake() {
            return Err(WagerError::InvalidStake(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Stake {
    type Error = WagerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Stake> for Decimal {
    fn from(value: Stake) -> Self {
        value.0
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
