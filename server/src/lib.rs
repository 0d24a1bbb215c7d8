use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

pub mod config;
pub mod connection_manager;
pub mod database;
pub mod database_manager;
pub mod ledger;
pub mod logging;
pub mod wager_manager;

use config::{SeedConfig, Settings};
use database::{to_cents, DatabaseConnection, DbMarket, DbUser};
use database_manager::{transform_err, DatabaseHandle, DatabaseManager};
use ledger::Ledger;
use wager_manager::{WagerHandle, WagerManager};

const QUEUE_DEPTH: usize = 32;
const EVENT_DEPTH: usize = 64;

/// Handles shared by every client connection.
#[derive(Clone)]
pub struct Services {
    pub database: DatabaseHandle,
    pub wagers: WagerHandle,
    operators: Arc<HashSet<String>>,
}

impl Services {
    pub fn is_operator(&self, user: &str) -> bool {
        self.operators.contains(user)
    }
}

/// Connects the store, seeds it and spawns the manager tasks. The tasks stop
/// once every handle has been dropped.
pub async fn start(settings: &Settings) -> anyhow::Result<Services> {
    let database = DatabaseConnection::new(&settings.database).await?;
    seed(&database, &settings.seed).await?;

    let (db_tx, db_rx) = mpsc::channel(QUEUE_DEPTH);
    let (events_tx, _) = broadcast::channel(EVENT_DEPTH);
    let mut db_manager = DatabaseManager::new(database, db_rx, events_tx.clone());
    tokio::spawn(async move {
        db_manager.manage().await;
    });
    let database = DatabaseHandle::new(db_tx, events_tx);

    let (wager_tx, wager_rx) = mpsc::channel(QUEUE_DEPTH);
    let ledger = Ledger::new(settings.ledger.overdraft);
    let mut wager_manager = WagerManager::new(wager_rx, database.clone(), ledger);
    tokio::spawn(async move {
        wager_manager.manage().await;
    });

    info!(overdraft = ?ledger.policy(), endpoint = %settings.database.endpoint, "services started");
    Ok(Services {
        database,
        wagers: WagerHandle::new(wager_tx),
        operators: Arc::new(settings.settlement.operators.iter().cloned().collect()),
    })
}

/// Users that already exist keep their balance; markets are overwritten.
pub async fn seed(database: &DatabaseConnection, seed: &SeedConfig) -> anyhow::Result<()> {
    for user in &seed.users {
        if transform_err(database.get_user(&user.name).await)?.is_some() {
            debug!(user = %user.name, "user already seeded");
            continue;
        }
        let record = DbUser::new(&user.name, to_cents(user.balance)?);
        transform_err(database.add_user(&record).await)?;
    }
    for market in &seed.markets {
        transform_err(database.upsert_market(&DbMarket::from(market)).await)?;
    }
    info!(users = seed.users.len(), markets = seed.markets.len(), "store seeded");
    Ok(())
}
