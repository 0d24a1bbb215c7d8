use common::{LedgerEntry, LiveWager, Market, StoreEvent, User, WagerError, WagerState};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::database::{DatabaseConnection, DbLedgerEntry, DbLiveWager, WriteError};

pub type Responder<T> = oneshot::Sender<Result<T, WagerError>>;

pub enum DatabaseRequest {
    GetUser {
        name: String,
        responder: Responder<Option<User>>,
    },
    GetMarket {
        id: String,
        responder: Responder<Option<Market>>,
    },
    GetAllMarkets {
        responder: Responder<Vec<Market>>,
    },
    GetWager {
        id: String,
        responder: Responder<Option<LiveWager>>,
    },
    GetAllWagers {
        responder: Responder<Vec<LiveWager>>,
    },
    GetLedger {
        user: String,
        responder: Responder<Vec<LedgerEntry>>,
    },
    WriteWager {
        wager: LiveWager,
        entry: LedgerEntry,
        guard_balance: bool,
        responder: Responder<()>,
    },
}

/// Owns the store connection. Requests are served one at a time.
pub struct DatabaseManager {
    db_connection: DatabaseConnection,
    work_queue: mpsc::Receiver<DatabaseRequest>,
    events: broadcast::Sender<StoreEvent>,
}

pub fn transform_err<T>(result: surrealdb::Result<T>) -> Result<T, WagerError> {
    result.map_err(|e| WagerError::PersistenceFailure(e.to_string()))
}

fn convert_all<D, T>(records: Vec<D>) -> Result<Vec<T>, WagerError>
where
    T: TryFrom<D, Error = WagerError>,
{
    records.into_iter().map(T::try_from).collect()
}

impl DatabaseManager {
    pub fn new(
        db_connection: DatabaseConnection,
        work_queue: mpsc::Receiver<DatabaseRequest>,
        events: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            db_connection,
            work_queue,
            events,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                DatabaseRequest::GetUser { name, responder } => {
                    let resp = transform_err(self.db_connection.get_user(&name).await)
                        .map(|user| user.map(User::from));
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetMarket { id, responder } => {
                    let resp = transform_err(self.db_connection.get_market(&id).await)
                        .map(|market| market.map(Market::from));
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetAllMarkets { responder } => {
                    let resp = transform_err(self.db_connection.get_all_markets().await)
                        .map(|markets| markets.into_iter().map(Market::from).collect());
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetWager { id, responder } => {
                    let resp = transform_err(self.db_connection.get_wager(&id).await)
                        .and_then(|wager| wager.map(LiveWager::try_from).transpose());
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetAllWagers { responder } => {
                    let resp = transform_err(self.db_connection.get_all_wagers().await)
                        .and_then(convert_all);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetLedger { user, responder } => {
                    let resp = transform_err(self.db_connection.get_ledger_for_user(&user).await)
                        .and_then(convert_all);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::WriteWager {
                    wager,
                    entry,
                    guard_balance,
                    responder,
                } => {
                    let resp = self.write_wager(&wager, &entry, guard_balance).await;
                    let _ = responder.send(resp);
                }
            }
        }
        debug!("database request queue closed");
    }

    async fn write_wager(&self, wager: &LiveWager, entry: &LedgerEntry, guard_balance: bool) -> Result<(), WagerError> {
        let db_wager = DbLiveWager::try_from(wager)?;
        let db_entry = DbLedgerEntry::try_from(entry)?;
        let state = wager.state();
        let written = self
            .db_connection
            .write_wager(&db_wager, state, &db_entry, guard_balance)
            .await;

        if let Err(error) = written {
            warn!(wager = %wager.id, ?error, "wager write rolled back");
            return Err(match error {
                WriteError::WagerChanged if state == WagerState::Resolved => {
                    WagerError::AlreadyResolved(wager.id.clone())
                }
                WriteError::WagerChanged => WagerError::AlreadyMatched(wager.id.clone()),
                WriteError::Overdrawn => {
                    let user = transform_err(self.db_connection.get_user(&entry.user).await)?;
                    WagerError::InsufficientFunds {
                        balance: user.map(|u| User::from(u).balance).unwrap_or_default(),
                        required: entry.amount.abs(),
                    }
                }
                WriteError::Store(error) => WagerError::PersistenceFailure(error.to_string()),
            });
        }

        // nobody listening is fine
        let _ = self.events.send(StoreEvent::Wagers);
        let _ = self.events.send(StoreEvent::Balances);
        Ok(())
    }
}

fn unavailable() -> WagerError {
    WagerError::PersistenceFailure("database manager is not running".into())
}

/// Cloneable front for [`DatabaseManager`].
#[derive(Clone)]
pub struct DatabaseHandle {
    requester: mpsc::Sender<DatabaseRequest>,
    events: broadcast::Sender<StoreEvent>,
}

impl DatabaseHandle {
    pub fn new(requester: mpsc::Sender<DatabaseRequest>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self { requester, events }
    }

    async fn request<T>(&self, make: impl FnOnce(Responder<T>) -> DatabaseRequest) -> Result<T, WagerError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.requester
            .send(make(resp_tx))
            .await
            .map_err(|_| unavailable())?;
        resp_rx.await.map_err(|_| unavailable())?
    }

    /// Change signals for every committed write.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn get_user(&self, name: &str) -> Result<User, WagerError> {
        let name = name.to_string();
        self.request(|responder| DatabaseRequest::GetUser {
            name: name.clone(),
            responder,
        })
        .await?
        .ok_or(WagerError::UnknownUser(name))
    }

    pub async fn balance(&self, name: &str) -> Result<rust_decimal::Decimal, WagerError> {
        Ok(self.get_user(name).await?.balance)
    }

    pub async fn get_market(&self, id: &str) -> Result<Market, WagerError> {
        let id = id.to_string();
        self.request(|responder| DatabaseRequest::GetMarket {
            id: id.clone(),
            responder,
        })
        .await?
        .ok_or(WagerError::NotFound(id))
    }

    pub async fn get_all_markets(&self) -> Result<Vec<Market>, WagerError> {
        self.request(|responder| DatabaseRequest::GetAllMarkets { responder })
            .await
    }

    pub async fn get_wager(&self, id: &str) -> Result<LiveWager, WagerError> {
        let id = id.to_string();
        self.request(|responder| DatabaseRequest::GetWager {
            id: id.clone(),
            responder,
        })
        .await?
        .ok_or(WagerError::NotFound(id))
    }

    pub async fn list_live(&self) -> Result<Vec<LiveWager>, WagerError> {
        self.request(|responder| DatabaseRequest::GetAllWagers { responder })
            .await
    }

    /// Wagers still waiting for an acceptor.
    pub async fn list_open(&self) -> Result<Vec<LiveWager>, WagerError> {
        let mut wagers = self.list_live().await?;
        wagers.retain(LiveWager::is_open);
        Ok(wagers)
    }

    pub async fn get_ledger(&self, user: &str) -> Result<Vec<LedgerEntry>, WagerError> {
        let user = user.to_string();
        self.request(|responder| DatabaseRequest::GetLedger { user, responder })
            .await
    }

    /// Commits a wager transition with its ledger entry. A new wager is
    /// created; a matched or resolved one replaces the stored record only if
    /// that record is still open or matched respectively. With
    /// `guard_balance` a debit that would overdraw fails with
    /// `InsufficientFunds`.
    pub async fn write_wager(&self, wager: LiveWager, entry: LedgerEntry, guard_balance: bool) -> Result<(), WagerError> {
        self.request(|responder| DatabaseRequest::WriteWager {
            wager,
            entry,
            guard_balance,
            responder,
        })
        .await
    }
}
