//! Odds model: turns a chosen points line into an American-odds price.
//!
//! Each market carries four coefficients of a cubic fitted to sportsbook
//! prices. Lines below the market's baseline pay a flat 200 point jump,
//! which leaves the curve discontinuous exactly at the baseline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WagerError};
use crate::Side;

/// Penalty applied to every line below the baseline.
pub const BELOW_LINE_JUMP: f64 = 200.0;

/// Cubic `a·t³ + b·t² + c·t + d`, stored as `[a, b, c, d]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Coefficients {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    pub fn eval(&self, t: f64) -> f64 {
        self.a * t.powi(3) + self.b * t.powi(2) + self.c * t + self.d
    }
}

impl From<[f64; 4]> for Coefficients {
    fn from([a, b, c, d]: [f64; 4]) -> Self {
        Self { a, b, c, d }
    }
}

impl From<Coefficients> for [f64; 4] {
    fn from(value: Coefficients) -> Self {
        [value.a, value.b, value.c, value.d]
    }
}

/// Raw, unrounded price for taking `side` at `threshold`.
///
/// OVER is the negation of the curve so that a more favoured OVER reads as
/// a more negative number; UNDER is the curve itself.
pub fn price(threshold: f64, side: Side, coefficients: &Coefficients, original_line: f64) -> f64 {
    let base = coefficients.eval(threshold);
    let raw = if threshold < original_line {
        base + BELOW_LINE_JUMP
    } else {
        base
    };

    match side {
        Side::Over => -raw,
        Side::Under => raw,
    }
}

/// American odds. Never zero.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub struct Odds(i32);

impl Odds {
    /// Rounds a raw price to the nearest whole number.
    pub fn from_price(raw: f64) -> Result<Self> {
        if !raw.is_finite() {
            return Err(WagerError::InvalidOdds);
        }
        let rounded = raw.round();
        if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
            return Err(WagerError::InvalidOdds);
        }
        Self::try_from(rounded as i32)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Positive odds: the poster is the underdog.
    pub fn is_underdog(self) -> bool {
        self.0 > 0
    }

    /// The same price quoted from the other side of the wager.
    pub fn flipped(self) -> Self {
        Self(-self.0)
    }
}

impl TryFrom<i32> for Odds {
    type Error = WagerError;

    fn try_from(value: i32) -> Result<Self> {
        if value == 0 || value == i32::MIN {
            return Err(WagerError::InvalidOdds);
        }
        Ok(Self(value))
    }
}

impl From<Odds> for i32 {
    fn from(value: Odds) -> Self {
        value.0
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
