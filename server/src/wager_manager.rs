use common::{LiveWager, Odds, PostWager, Stake, WagerError};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::database::new_wager_key;
use crate::database_manager::{DatabaseHandle, Responder};
use crate::ledger::Ledger;

pub enum WagerRequest {
    PostWager {
        poster: String,
        wager: PostWager,
        responder: Responder<LiveWager>,
    },
    AcceptWager {
        acceptor: String,
        wager_id: String,
        responder: Responder<LiveWager>,
    },
    ResolveWager {
        wager_id: String,
        winner: String,
        responder: Responder<LiveWager>,
    },
}

/// Runs every wager transition. One request is finished before the next is
/// read, so the check on a wager's state and the write that changes it
/// cannot interleave with another transition.
pub struct WagerManager {
    work_queue: mpsc::Receiver<WagerRequest>,
    database: DatabaseHandle,
    ledger: Ledger,
}

//NOTE: No functions in this impl may crash
impl WagerManager {
    pub fn new(work_queue: mpsc::Receiver<WagerRequest>, database: DatabaseHandle, ledger: Ledger) -> Self {
        Self {
            work_queue,
            database,
            ledger,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                WagerRequest::PostWager {
                    poster,
                    wager,
                    responder,
                } => {
                    let result = self.post_wager(&poster, wager).await;
                    if let Err(error) = &result {
                        warn!(%poster, %error, "post rejected");
                    }
                    // we do not care if the receiver has already disappeared
                    responder.send(result).ok();
                }
                WagerRequest::AcceptWager {
                    acceptor,
                    wager_id,
                    responder,
                } => {
                    let result = self.accept_wager(&acceptor, &wager_id).await;
                    if let Err(error) = &result {
                        warn!(%acceptor, %wager_id, %error, "accept rejected");
                    }
                    responder.send(result).ok();
                }
                WagerRequest::ResolveWager {
                    wager_id,
                    winner,
                    responder,
                } => {
                    let result = self.resolve_wager(&wager_id, &winner).await;
                    if let Err(error) = &result {
                        warn!(%wager_id, %winner, %error, "resolution rejected");
                    }
                    responder.send(result).ok();
                }
            }
        }
    }

    async fn post_wager(&self, poster: &str, request: PostWager) -> Result<LiveWager, WagerError> {
        let odds = Odds::try_from(request.odds)?;
        let stake = Stake::new(request.stake)?;
        let user = self.database.get_user(poster).await?;

        // stored from the acceptor's side
        let wager = LiveWager::open(
            new_wager_key(),
            request.player,
            request.points,
            request.side,
            odds.flipped(),
            poster,
            stake,
        );
        let entry = self.ledger.settle_post(&user, &wager.id, stake)?;
        let guard = self.ledger.guards(&entry);
        self.database.write_wager(wager.clone(), entry, guard).await?;

        info!(wager = %wager.id, %poster, odds = %wager.odds, %stake, "wager posted");
        Ok(wager)
    }

    async fn accept_wager(&self, acceptor: &str, wager_id: &str) -> Result<LiveWager, WagerError> {
        let wager = self.database.get_wager(wager_id).await?;
        if !wager.is_open() {
            return Err(WagerError::AlreadyMatched(wager.id));
        }

        let stake = wager.required_counter_stake()?;
        let matched = wager.matched(acceptor, stake)?;
        let user = self.database.get_user(acceptor).await?;
        let entry = self.ledger.settle_accept(&user, &matched.id, stake)?;
        let guard = self.ledger.guards(&entry);
        self.database.write_wager(matched.clone(), entry, guard).await?;

        info!(wager = %matched.id, %acceptor, %stake, "wager matched");
        Ok(matched)
    }

    async fn resolve_wager(&self, wager_id: &str, winner: &str) -> Result<LiveWager, WagerError> {
        let wager = self.database.get_wager(wager_id).await?;
        let resolved = wager.resolved(winner)?;
        let pot = resolved
            .pot()
            .ok_or_else(|| WagerError::NotMatched(resolved.id.clone()))?;

        // the winner's record must exist before it is credited
        self.database.get_user(winner).await?;
        let entry = self.ledger.settle_payout(winner, &resolved.id, pot);
        self.database.write_wager(resolved.clone(), entry, false).await?;

        info!(wager = %resolved.id, %winner, %pot, "wager resolved");
        Ok(resolved)
    }
}

fn unavailable() -> WagerError {
    WagerError::PersistenceFailure("wager manager is not running".into())
}

/// Cloneable front for [`WagerManager`].
#[derive(Clone)]
pub struct WagerHandle {
    requester: mpsc::Sender<WagerRequest>,
}

impl WagerHandle {
    pub fn new(requester: mpsc::Sender<WagerRequest>) -> Self {
        Self { requester }
    }

    async fn request(&self, make: impl FnOnce(Responder<LiveWager>) -> WagerRequest) -> Result<LiveWager, WagerError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.requester
            .send(make(resp_tx))
            .await
            .map_err(|_| unavailable())?;
        resp_rx.await.map_err(|_| unavailable())?
    }

    /// Opens a wager at the poster's `odds` and debits their stake.
    pub async fn post(&self, poster: &str, wager: PostWager) -> Result<LiveWager, WagerError> {
        let poster = poster.to_string();
        self.request(|responder| WagerRequest::PostWager {
            poster,
            wager,
            responder,
        })
        .await
    }

    /// Takes the other side of an open wager and debits the counter stake.
    pub async fn accept(&self, acceptor: &str, wager_id: &str) -> Result<LiveWager, WagerError> {
        let acceptor = acceptor.to_string();
        let wager_id = wager_id.to_string();
        self.request(|responder| WagerRequest::AcceptWager {
            acceptor,
            wager_id,
            responder,
        })
        .await
    }

    /// Records the outcome of a matched wager and pays the winner the pot.
    pub async fn resolve(&self, wager_id: &str, winner: &str) -> Result<LiveWager, WagerError> {
        let wager_id = wager_id.to_string();
        let winner = winner.to_string();
        self.request(|responder| WagerRequest::ResolveWager {
            wager_id,
            winner,
            responder,
        })
        .await
    }
}
