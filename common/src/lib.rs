use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod ledger;
pub mod network;
pub mod pricing;
pub mod stake;
pub mod wager;

pub use error::WagerError;
pub use ledger::{EntryKind, LedgerEntry};
pub use pricing::{Coefficients, Odds};
pub use stake::Stake;
pub use wager::{LiveWager, MyWagers, PostWager, WagerState, WagerStatus};

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct User {
    pub name: String,
    pub balance: Decimal,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Side {
    #[serde(rename = "OVR")]
    Over,
    #[serde(rename = "UND")]
    Under,
}

/// A player prop that wagers are priced against. Seeded outside the core.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Market {
    pub id: String,
    pub player: String,
    /// Baseline points line the curve was fitted around.
    pub points: f64,
    pub coefficients: Coefficients,
}

impl Market {
    pub fn price(&self, threshold: f64, side: Side) -> f64 {
        pricing::price(threshold, side, &self.coefficients, self.points)
    }

    /// Price rounded to whole odds, ready to show or post.
    pub fn quote(&self, threshold: f64, side: Side) -> error::Result<Odds> {
        Odds::from_price(self.price(threshold, side))
    }
}

/// Emitted after the store commits a change. Listeners re-read.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum StoreEvent {
    Wagers,
    Balances,
}
