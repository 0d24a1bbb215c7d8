use chrono::{SecondsFormat, Utc};
use common::{
    Coefficients, EntryKind, LedgerEntry, LiveWager, Market, Odds, Side, Stake, WagerError, WagerState, WagerStatus,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::sql::statements::{BeginStatement, CommitStatement};
use surrealdb::sql::{Id, Thing};
use surrealdb::{Result, Surreal};
use tracing::debug;

use crate::config::DatabaseConfig;

pub const USER_TABLE: &str = "user";
pub const MARKET_TABLE: &str = "market";
pub const WAGER_TABLE: &str = "live_wager";

const WAGER_CHANGED: &str = "wager state changed";
const OVERDRAWN: &str = "balance does not cover debit";

/// Why a transactional wager write was not applied.
#[derive(Debug)]
pub enum WriteError {
    /// The stored wager was no longer in the state the transition starts from.
    WagerChanged,
    /// The debit would have taken the balance below zero.
    Overdrawn,
    Store(surrealdb::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Record {
    #[allow(dead_code)]
    pub id: Thing,
}

pub fn thing(tb: &str, key: &str) -> Thing {
    Thing {
        tb: tb.into(),
        id: Id::String(key.into()),
    }
}

/// The bare key of a record id, without the table or any escaping.
pub fn key(thing: &Thing) -> String {
    match &thing.id {
        Id::String(key) => key.clone(),
        id => id.to_string(),
    }
}

pub fn new_wager_key() -> String {
    match Id::rand() {
        Id::String(key) => key,
        id => id.to_string(),
    }
}

pub fn to_cents(amount: Decimal) -> std::result::Result<i64, WagerError> {
    common::stake::to_cents(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|mut cents| {
            cents.rescale(0);
            cents.to_i64()
        })
        .ok_or_else(|| WagerError::PersistenceFailure(format!("amount {amount} out of range")))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn corrupt(what: &str, thing: &Thing, error: WagerError) -> WagerError {
    WagerError::PersistenceFailure(format!("{what} in {thing}: {error}"))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbUser {
    pub id: Thing,
    pub name: String,
    pub balance_cents: i64,
}

impl DbUser {
    pub fn new(name: impl Into<String>, balance_cents: i64) -> Self {
        let name = name.into();
        Self {
            id: thing(USER_TABLE, &name),
            name,
            balance_cents,
        }
    }
}

impl From<DbUser> for common::User {
    fn from(value: DbUser) -> Self {
        common::User {
            name: value.name,
            balance: from_cents(value.balance_cents),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbMarket {
    pub id: Thing,
    pub player: String,
    pub points: f64,
    pub coefficients: Coefficients,
}

impl From<&Market> for DbMarket {
    fn from(value: &Market) -> Self {
        Self {
            id: thing(MARKET_TABLE, &value.id),
            player: value.player.clone(),
            points: value.points,
            coefficients: value.coefficients,
        }
    }
}

impl From<DbMarket> for Market {
    fn from(value: DbMarket) -> Self {
        Market {
            id: key(&value.id),
            player: value.player,
            points: value.points,
            coefficients: value.coefficients,
        }
    }
}

/// Flat shape of a live wager as stored; counterparty columns stay empty
/// until the wager is matched.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbLiveWager {
    pub id: Thing,
    pub player: String,
    pub points: f64,
    pub side: Side,
    pub odds: i32,
    pub poster: Thing,
    pub poster_stake_cents: i64,
    pub acceptor: Option<Thing>,
    pub acceptor_stake_cents: Option<i64>,
    pub winner: Option<Thing>,
}

impl TryFrom<&LiveWager> for DbLiveWager {
    type Error = WagerError;

    fn try_from(value: &LiveWager) -> std::result::Result<Self, WagerError> {
        let user = |name: &str| thing(USER_TABLE, name);
        Ok(Self {
            id: thing(WAGER_TABLE, &value.id),
            player: value.player.clone(),
            points: value.points,
            side: value.side,
            odds: value.odds.value(),
            poster: user(&value.poster),
            poster_stake_cents: to_cents(value.poster_stake.amount())?,
            acceptor: value.acceptor().map(user),
            acceptor_stake_cents: value
                .acceptor_stake()
                .map(|stake| to_cents(stake.amount()))
                .transpose()?,
            winner: value.winner().map(user),
        })
    }
}

impl TryFrom<DbLiveWager> for LiveWager {
    type Error = WagerError;

    fn try_from(value: DbLiveWager) -> std::result::Result<Self, WagerError> {
        let id = value.id;
        let odds = Odds::try_from(value.odds).map_err(|e| corrupt("odds", &id, e))?;
        let poster_stake = Stake::new(from_cents(value.poster_stake_cents))
            .map_err(|e| corrupt("poster stake", &id, e))?;
        let acceptor_stake = value
            .acceptor_stake_cents
            .map(|cents| Stake::new(from_cents(cents)))
            .transpose()
            .map_err(|e| corrupt("acceptor stake", &id, e))?;
        let status = WagerStatus::from_parts(
            value.acceptor.as_ref().map(key),
            acceptor_stake,
            value.winner.as_ref().map(key),
        )?;

        Ok(LiveWager {
            id: key(&id),
            player: value.player,
            points: value.points,
            side: value.side,
            odds,
            poster: key(&value.poster),
            poster_stake,
            status,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbLedgerEntry {
    pub user: Thing,
    pub wager: Thing,
    pub amount_cents: i64,
    pub kind: EntryKind,
    pub recorded_at: String,
}

impl TryFrom<&LedgerEntry> for DbLedgerEntry {
    type Error = WagerError;

    fn try_from(value: &LedgerEntry) -> std::result::Result<Self, WagerError> {
        Ok(Self {
            user: thing(USER_TABLE, &value.user),
            wager: thing(WAGER_TABLE, &value.wager),
            amount_cents: to_cents(value.amount)?,
            kind: value.kind,
            recorded_at: value.recorded_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        })
    }
}

impl TryFrom<DbLedgerEntry> for LedgerEntry {
    type Error = WagerError;

    fn try_from(value: DbLedgerEntry) -> std::result::Result<Self, WagerError> {
        let recorded_at = chrono::DateTime::parse_from_rfc3339(&value.recorded_at)
            .map_err(|e| WagerError::PersistenceFailure(format!("ledger timestamp: {e}")))?
            .with_timezone(&Utc);
        Ok(LedgerEntry {
            user: key(&value.user),
            wager: key(&value.wager),
            amount: from_cents(value.amount_cents),
            kind: value.kind,
            recorded_at,
        })
    }
}

pub struct DatabaseConnection {
    connection: Surreal<Any>,
}

impl DatabaseConnection {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db = any::connect(config.endpoint.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(&config.namespace).use_db(&config.database).await?;

        Ok(Self { connection: db })
    }

    pub async fn add_user(&self, user: &DbUser) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((USER_TABLE, user.name.as_str()))
            .content(user)
            .await?;

        Ok(())
    }

    pub async fn upsert_market(&self, market: &DbMarket) -> Result<()> {
        let market_key = key(&market.id);
        let _: Option<Record> = self
            .connection
            .update((MARKET_TABLE, market_key.as_str()))
            .content(market)
            .await?;

        Ok(())
    }

    pub async fn get_user(&self, name: &str) -> Result<Option<DbUser>> {
        self.connection.select((USER_TABLE, name)).await
    }

    pub async fn get_market(&self, id: &str) -> Result<Option<DbMarket>> {
        self.connection.select((MARKET_TABLE, id)).await
    }

    pub async fn get_all_markets(&self) -> Result<Vec<DbMarket>> {
        self.connection.select(MARKET_TABLE).await
    }

    pub async fn get_wager(&self, id: &str) -> Result<Option<DbLiveWager>> {
        self.connection.select((WAGER_TABLE, id)).await
    }

    pub async fn get_all_wagers(&self) -> Result<Vec<DbLiveWager>> {
        self.connection.select(WAGER_TABLE).await
    }

    pub async fn get_ledger_for_user(&self, name: &str) -> Result<Vec<DbLedgerEntry>> {
        self.connection
            .query("SELECT * FROM ledger_entry WHERE user = $user ORDER BY recorded_at ASC;")
            .bind(("user", thing(USER_TABLE, name)))
            .await?
            .take(0)
    }

    /// Writes a wager transition, its balance movement and its ledger entry
    /// in one transaction. The wager is only written if the stored record is
    /// still in the state the transition starts from, and with `guard_balance`
    /// a debit is only applied if the balance covers it. Otherwise nothing is
    /// written.
    pub async fn write_wager(
        &self,
        wager: &DbLiveWager,
        state: WagerState,
        entry: &DbLedgerEntry,
        guard_balance: bool,
    ) -> std::result::Result<(), WriteError> {
        debug!(wager = %wager.id, user = %entry.user, cents = entry.amount_cents, ?state, "writing wager");
        let mut query = self.connection.query(BeginStatement);
        query = match state {
            WagerState::Open => query.query("CREATE $wager_id CONTENT $wager;"),
            WagerState::Matched => query
                .query("LET $written = (UPDATE $wager_id CONTENT $wager WHERE acceptor = NONE);")
                .query(format!("IF array::len($written) = 0 {{ THROW \"{WAGER_CHANGED}\" }};")),
            WagerState::Resolved => query
                .query("LET $written = (UPDATE $wager_id CONTENT $wager WHERE acceptor != NONE AND winner = NONE);")
                .query(format!("IF array::len($written) = 0 {{ THROW \"{WAGER_CHANGED}\" }};")),
        };
        query = if guard_balance {
            query
                .query("LET $debited = (UPDATE $user SET balance_cents += $amount WHERE balance_cents + $amount >= 0);")
                .query(format!("IF array::len($debited) = 0 {{ THROW \"{OVERDRAWN}\" }};"))
        } else {
            query.query("UPDATE $user SET balance_cents += $amount;")
        };

        let mut response = query
            .query("CREATE ledger_entry CONTENT $entry;")
            .query(CommitStatement)
            .bind(("wager_id", &wager.id))
            .bind(("wager", wager))
            .bind(("user", &entry.user))
            .bind(("amount", entry.amount_cents))
            .bind(("entry", entry))
            .await
            .map_err(WriteError::Store)?;

        let mut errors: Vec<_> = response.take_errors().into_iter().collect();
        errors.sort_by_key(|(index, _)| *index);
        let messages: Vec<_> = errors.iter().map(|(_, e)| e.to_string()).collect();
        if messages.iter().any(|m| m.contains(WAGER_CHANGED)) {
            return Err(WriteError::WagerChanged);
        }
        if messages.iter().any(|m| m.contains(OVERDRAWN)) {
            return Err(WriteError::Overdrawn);
        }

        // statements around the failing one only report the cancelled transaction
        let cause = errors
            .iter()
            .position(|(_, e)| !matches!(e, surrealdb::Error::Db(surrealdb::error::Db::QueryNotExecuted)))
            .unwrap_or(0);
        match errors.into_iter().nth(cause) {
            Some((_, error)) => Err(WriteError::Store(error)),
            None => Ok(()),
        }
    }
}
