use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a wager operation can fail. Sent to clients as-is.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum WagerError {
    #[error("no wager with id {0}")]
    NotFound(String),

    #[error("no user named {0}")]
    UnknownUser(String),

    #[error("odds must be a non-zero whole number")]
    InvalidOdds,

    #[error("stake must be positive, got {0}")]
    InvalidStake(Decimal),

    #[error("wager {0} already has an acceptor")]
    AlreadyMatched(String),

    #[error("cannot accept your own wager")]
    SelfAccept,

    #[error("wager {0} has not been matched")]
    NotMatched(String),

    #[error("wager {0} is already resolved")]
    AlreadyResolved(String),

    #[error("{0} is not a party to this wager")]
    InvalidWinner(String),

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("not logged in")]
    Unauthenticated,

    #[error("not permitted: {0}")]
    Forbidden(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

pub type Result<T> = std::result::Result<T, WagerError>;
