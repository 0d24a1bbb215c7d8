use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WagerError};
use crate::pricing::Odds;
use crate::stake::{counter_stake, Stake};
use crate::Side;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerState {
    Open,
    Matched,
    Resolved,
}

/// Where a live wager is in its lifecycle, with the data each stage owns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum WagerStatus {
    Open,
    Matched {
        acceptor: String,
        acceptor_stake: Stake,
    },
    Resolved {
        acceptor: String,
        acceptor_stake: Stake,
        winner: String,
    },
}

impl WagerStatus {
    /// Rebuilds a status from the nullable columns a record store keeps.
    pub fn from_parts(
        acceptor: Option<String>,
        acceptor_stake: Option<Stake>,
        winner: Option<String>,
    ) -> Result<Self> {
        match (acceptor, acceptor_stake, winner) {
            (None, None, None) => Ok(Self::Open),
            (Some(acceptor), Some(acceptor_stake), None) => Ok(Self::Matched {
                acceptor,
                acceptor_stake,
            }),
            (Some(acceptor), Some(acceptor_stake), Some(winner)) => Ok(Self::Resolved {
                acceptor,
                acceptor_stake,
                winner,
            }),
            (acceptor, stake, winner) => Err(WagerError::PersistenceFailure(format!(
                "inconsistent wager record: acceptor {:?}, acceptor stake {:?}, winner {:?}",
                acceptor, stake, winner
            ))),
        }
    }
}

/// A posted wager. `odds` are quoted from the acceptor's side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LiveWager {
    pub id: String,
    pub player: String,
    pub points: f64,
    pub side: Side,
    pub odds: Odds,
    pub poster: String,
    pub poster_stake: Stake,
    pub status: WagerStatus,
}

impl LiveWager {
    pub fn open(
        id: impl Into<String>,
        player: impl Into<String>,
        points: f64,
        side: Side,
        odds: Odds,
        poster: impl Into<String>,
        poster_stake: Stake,
    ) -> Self {
        Self {
            id: id.into(),
            player: player.into(),
            points,
            side,
            odds,
            poster: poster.into(),
            poster_stake,
            status: WagerStatus::Open,
        }
    }

    pub fn state(&self) -> WagerState {
        match self.status {
            WagerStatus::Open => WagerState::Open,
            WagerStatus::Matched { .. } => WagerState::Matched,
            WagerStatus::Resolved { .. } => WagerState::Resolved,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == WagerState::Open
    }

    pub fn acceptor(&self) -> Option<&str> {
        match &self.status {
            WagerStatus::Open => None,
            WagerStatus::Matched { acceptor, .. } | WagerStatus::Resolved { acceptor, .. } => {
                Some(acceptor)
            }
        }
    }

    pub fn acceptor_stake(&self) -> Option<Stake> {
        match &self.status {
            WagerStatus::Open => None,
            WagerStatus::Matched { acceptor_stake, .. }
            | WagerStatus::Resolved { acceptor_stake, .. } => Some(*acceptor_stake),
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match &self.status {
            WagerStatus::Resolved { winner, .. } => Some(winner),
            _ => None,
        }
    }

    /// The stake an acceptor would have to put up right now.
    pub fn required_counter_stake(&self) -> Result<Stake> {
        Stake::new(counter_stake(self.odds.value(), self.poster_stake.amount())?)
    }

    /// Both stakes, once there is an acceptor.
    pub fn pot(&self) -> Option<Decimal> {
        self.acceptor_stake()
            .map(|stake| self.poster_stake.amount() + stake.amount())
    }

    /// OPEN -> MATCHED.
    pub fn matched(self, acceptor: impl Into<String>, acceptor_stake: Stake) -> Result<Self> {
        if !self.is_open() {
            return Err(WagerError::AlreadyMatched(self.id));
        }
        let acceptor = acceptor.into();
        if acceptor == self.poster {
            return Err(WagerError::SelfAccept);
        }
        Ok(Self {
            status: WagerStatus::Matched {
                acceptor,
                acceptor_stake,
            },
            ..self
        })
    }

    /// MATCHED -> RESOLVED. Driven by settlement, not by either party.
    pub fn resolved(self, winner: impl Into<String>) -> Result<Self> {
        let winner = winner.into();
        match self.status {
            WagerStatus::Open => Err(WagerError::NotMatched(self.id)),
            WagerStatus::Resolved { .. } => Err(WagerError::AlreadyResolved(self.id)),
            WagerStatus::Matched {
                acceptor,
                acceptor_stake,
            } => {
                if winner != self.poster && winner != acceptor {
                    return Err(WagerError::InvalidWinner(winner));
                }
                Ok(Self {
                    status: WagerStatus::Resolved {
                        acceptor,
                        acceptor_stake,
                        winner,
                    },
                    ..self
                })
            }
        }
    }
}

/// A poster's request to open a wager. Odds are the poster's price.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PostWager {
    pub player: String,
    pub points: f64,
    pub odds: i32,
    pub side: Side,
    pub stake: Decimal,
}

/// A user's wagers split the way the "my bets" screens show them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MyWagers {
    /// Posted and taken, or taken by the user.
    pub active: Vec<LiveWager>,
    /// Posted by the user and settled.
    pub completed: Vec<LiveWager>,
}

impl MyWagers {
    pub fn for_user(user: &str, wagers: impl IntoIterator<Item = LiveWager>) -> Self {
        let mut mine = Self::default();
        for wager in wagers {
            let posted = wager.poster == user;
            if posted && wager.winner().is_some() {
                mine.completed.push(wager.clone());
            }
            if (posted && wager.acceptor().is_some()) || wager.acceptor() == Some(user) {
                mine.active.push(wager);
            }
        }
        mine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wager() -> LiveWager {
        LiveWager::open(
            "w1",
            "LeBron James",
            27.0,
            Side::Over,
            Odds::try_from(150).unwrap(),
            "alice",
            Stake::new(dec!(50)).unwrap(),
        )
    }

    #[test]
    fn open_wager_has_no_counterparty() {
        let wager = wager();
        assert_eq!(wager.state(), WagerState::Open);
        assert_eq!(wager.acceptor(), None);
        assert_eq!(wager.acceptor_stake(), None);
        assert_eq!(wager.winner(), None);
        assert_eq!(wager.pot(), None);
    }

    #[test]
    fn matching_records_acceptor_and_stake() {
        let stake = wager().required_counter_stake().unwrap();
        assert_eq!(stake.amount(), dec!(33.33));

        let matched = wager().matched("bob", stake).unwrap();
        assert_eq!(matched.state(), WagerState::Matched);
        assert_eq!(matched.acceptor(), Some("bob"));
        assert_eq!(matched.acceptor_stake(), Some(stake));
        assert_eq!(matched.pot(), Some(dec!(83.33)));
    }

    #[test]
    fn second_match_is_rejected() {
        let stake = Stake::new(dec!(1)).unwrap();
        let matched = wager().matched("bob", stake).unwrap();
        assert_eq!(
            matched.matched("carol", stake),
            Err(WagerError::AlreadyMatched("w1".into()))
        );
    }

    #[test]
    fn poster_cannot_take_their_own_wager() {
        let stake = Stake::new(dec!(1)).unwrap();
        assert_eq!(wager().matched("alice", stake), Err(WagerError::SelfAccept));
    }

    #[test]
    fn resolution_needs_a_match_and_a_party() {
        let stake = Stake::new(dec!(1)).unwrap();
        assert_eq!(
            wager().resolved("alice"),
            Err(WagerError::NotMatched("w1".into()))
        );

        let matched = wager().matched("bob", stake).unwrap();
        assert_eq!(
            matched.clone().resolved("mallory"),
            Err(WagerError::InvalidWinner("mallory".into()))
        );

        let resolved = matched.resolved("bob").unwrap();
        assert_eq!(resolved.winner(), Some("bob"));
        assert_eq!(resolved.acceptor(), Some("bob"));
        assert_eq!(
            resolved.resolved("alice"),
            Err(WagerError::AlreadyResolved("w1".into()))
        );
    }

    #[test]
    fn flat_columns_must_be_consistent() {
        let stake = Stake::new(dec!(2)).unwrap();
        assert_eq!(WagerStatus::from_parts(None, None, None), Ok(WagerStatus::Open));
        assert!(WagerStatus::from_parts(Some("bob".into()), Some(stake), None).is_ok());
        assert!(WagerStatus::from_parts(Some("bob".into()), None, None).is_err());
        assert!(WagerStatus::from_parts(None, Some(stake), None).is_err());
        assert!(WagerStatus::from_parts(None, None, Some("bob".into())).is_err());
    }

    #[test]
    fn my_wagers_split_active_and_completed() {
        let stake = Stake::new(dec!(5)).unwrap();
        let open = wager();
        let posted_and_taken = LiveWager {
            id: "w2".into(),
            ..wager()
        }
        .matched("bob", stake)
        .unwrap();
        let taken_by_alice = LiveWager {
            id: "w3".into(),
            poster: "carol".into(),
            ..wager()
        }
        .matched("alice", stake)
        .unwrap();
        let settled = LiveWager {
            id: "w4".into(),
            ..wager()
        }
        .matched("bob", stake)
        .unwrap()
        .resolved("alice")
        .unwrap();

        let mine = MyWagers::for_user("alice", vec![open, posted_and_taken, taken_by_alice, settled]);
        let active: Vec<_> = mine.active.iter().map(|w| w.id.as_str()).collect();
        let completed: Vec<_> = mine.completed.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(active, vec!["w2", "w3", "w4"]);
        assert_eq!(completed, vec!["w4"]);
    }
}
