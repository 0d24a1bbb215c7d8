use std::io::ErrorKind;

use anyhow::bail;
use common::network::{Connection, Packet, Request, Response};
use common::{MyWagers, StoreEvent, WagerError};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::Services;

pub async fn serve(listener: TcpListener, services: Services) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "failed to accept connection");
                continue;
            }
        };
        let services = services.clone();

        tokio::spawn(async move {
            match Connection::from_tcp_stream(stream).await {
                Ok(connection) => {
                    debug!(%peer, "client connected");
                    handle_connection(connection, services).await;
                }
                Err(error) => warn!(%peer, %error, "websocket handshake failed"),
            }
        });
    }
}

#[derive(Default)]
struct Session {
    user: Option<String>,
    changes: Option<broadcast::Receiver<StoreEvent>>,
}

impl Session {
    fn user(&self) -> Result<&str, WagerError> {
        self.user.as_deref().ok_or(WagerError::Unauthenticated)
    }
}

enum Incoming {
    Packet(anyhow::Result<Packet>),
    Change(Result<StoreEvent, RecvError>),
}

async fn handle_connection(mut connection: Connection, services: Services) {
    let mut session = Session::default();
    match handle_client(&mut connection, &mut session, &services).await {
        Ok(()) => debug!(user = ?session.user, "client disconnected"),
        Err(error) => warn!(user = ?session.user, %error, "connection dropped"),
    }
}

async fn handle_client(connection: &mut Connection, session: &mut Session, services: &Services) -> anyhow::Result<()> {
    loop {
        let incoming = match &mut session.changes {
            Some(changes) => tokio::select! {
                packet = connection.read() => Incoming::Packet(packet),
                change = changes.recv() => Incoming::Change(change),
            },
            None => Incoming::Packet(connection.read().await),
        };

        match incoming {
            Incoming::Change(Ok(event)) => {
                connection
                    .send(Packet::ResponsePacket(Response::Changed(event)))
                    .await?;
            }
            Incoming::Change(Err(RecvError::Lagged(skipped))) => {
                // missed signals collapse into one of each
                debug!(skipped, "change subscriber lagged");
                for event in [StoreEvent::Wagers, StoreEvent::Balances] {
                    connection
                        .send(Packet::ResponsePacket(Response::Changed(event)))
                        .await?;
                }
            }
            Incoming::Change(Err(RecvError::Closed)) => session.changes = None,
            Incoming::Packet(Ok(Packet::RequestPacket(request))) => {
                let reply = match handle_request(request, session, services).await {
                    Ok(response) => Packet::ResponsePacket(response),
                    Err(error) => Packet::Error(error),
                };
                connection.send(reply).await?;
            }
            Incoming::Packet(Ok(packet)) => bail!("incorrect packet type: {:?}", packet),
            Incoming::Packet(Err(error)) => {
                let aborted = error
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|e| e.kind() == ErrorKind::ConnectionAborted);
                //connection aborted is considered successful
                return if aborted { Ok(()) } else { Err(error) };
            }
        }
    }
}

async fn handle_request(request: Request, session: &mut Session, services: &Services) -> Result<Response, WagerError> {
    if request.needs_login() {
        session.user()?;
    }

    match request {
        Request::Login { user } => {
            if session.user.is_some() {
                return Err(WagerError::Forbidden("already logged in".into()));
            }
            let user = services.database.get_user(&user).await?;
            info!(user = %user.name, "login");
            session.user = Some(user.name.clone());
            Ok(Response::SuccessfulLogin {
                username: user.name,
                balance: user.balance,
            })
        }
        Request::WhoAmI => Ok(Response::WhoAmI(session.user()?.to_string())),
        Request::Balance => Ok(Response::Balance(
            services.database.balance(session.user()?).await?,
        )),
        Request::Ledger => Ok(Response::Ledger(
            services.database.get_ledger(session.user()?).await?,
        )),
        Request::Markets => Ok(Response::Markets(
            services.database.get_all_markets().await?,
        )),
        Request::Quote {
            market_id,
            points,
            side,
        } => {
            let market = services.database.get_market(&market_id).await?;
            Ok(Response::Quote(market.quote(points, side)?))
        }
        Request::OpenWagers => Ok(Response::Wagers(services.database.list_open().await?)),
        Request::LiveWagers => Ok(Response::Wagers(services.database.list_live().await?)),
        Request::Wager { id } => Ok(Response::Wager(services.database.get_wager(&id).await?)),
        Request::MyWagers => {
            let user = session.user()?;
            let wagers = services.database.list_live().await?;
            Ok(Response::MyWagers(MyWagers::for_user(user, wagers)))
        }
        Request::PostWager(wager) => Ok(Response::Wager(
            services.wagers.post(session.user()?, wager).await?,
        )),
        Request::AcceptWager { wager_id } => Ok(Response::Wager(
            services.wagers.accept(session.user()?, &wager_id).await?,
        )),
        Request::ResolveWager { wager_id, winner } => {
            let user = session.user()?;
            if !services.is_operator(user) {
                return Err(WagerError::Forbidden(format!("{user} cannot settle wagers")));
            }
            Ok(Response::Wager(services.wagers.resolve(&wager_id, &winner).await?))
        }
        Request::Subscribe => {
            session.changes = Some(services.database.subscribe());
            Ok(Response::None)
        }
    }
}
