use std::io::ErrorKind;

use anyhow::bail;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{LedgerEntry, LiveWager, Market, MyWagers, Odds, PostWager, Side, StoreEvent, WagerError};

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub enum Request {
    Login { user: String },
    WhoAmI,
    Balance,
    Ledger,
    Markets,
    Quote { market_id: String, points: f64, side: Side },
    OpenWagers,
    LiveWagers,
    Wager { id: String },
    MyWagers,
    PostWager(PostWager),
    AcceptWager { wager_id: String },
    ResolveWager { wager_id: String, winner: String },
    Subscribe, // None response, then Changed pushes
}

impl Request {
    /// Whether the request acts on behalf of the logged in user.
    pub fn needs_login(&self) -> bool {
        !matches!(
            self,
            Request::Login { .. }
                | Request::Markets
                | Request::Quote { .. }
                | Request::OpenWagers
                | Request::LiveWagers
                | Request::Wager { .. }
        )
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Response {
    None,
    SuccessfulLogin { username: String, balance: Decimal },
    WhoAmI(String),
    Balance(Decimal),
    Ledger(Vec<LedgerEntry>),
    Markets(Vec<Market>),
    Quote(Odds),
    Wagers(Vec<LiveWager>),
    Wager(LiveWager),
    MyWagers(MyWagers),
    Changed(StoreEvent),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Packet {
    RequestPacket(Request),
    ResponsePacket(Response),
    Error(WagerError),
}

/// MessagePack packets over a websocket, one packet per binary frame.
pub struct Connection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection {
    /// Server side: completes the websocket handshake on an accepted stream.
    pub async fn from_tcp_stream(connection: TcpStream) -> anyhow::Result<Self> {
        let socket = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(connection)).await?;
        Ok(Self { socket })
    }

    /// Client side: `address` is a `ws://host:port` url.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(address).await?;
        Ok(Self { socket })
    }

    /// Next packet. A closed peer surfaces as `ErrorKind::ConnectionAborted`.
    pub async fn read(&mut self) -> anyhow::Result<Packet> {
        loop {
            let message = match self.socket.next().await {
                Some(message) => message?,
                None => return Err(connection_closed()),
            };
            match message {
                Message::Binary(data) => return Ok(rmp_serde::from_slice(&data)?),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Err(connection_closed()),
                _ => bail!("incorrect data type received"),
            }
        }
    }

    pub async fn send(&mut self, data: Packet) -> anyhow::Result<()> {
        let bytes = rmp_serde::to_vec(&data)?;
        Ok(self.socket.send(Message::Binary(bytes)).await?)
    }

    /// Sends a request and waits for its answer, skipping change pushes.
    pub async fn call(&mut self, request: Request) -> anyhow::Result<Result<Response, WagerError>> {
        self.send(Packet::RequestPacket(request)).await?;
        loop {
            match self.read().await? {
                Packet::ResponsePacket(Response::Changed(_)) => continue,
                Packet::ResponsePacket(response) => return Ok(Ok(response)),
                Packet::Error(error) => return Ok(Err(error)),
                packet => bail!("unexpected packet: {:?}", packet),
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        Ok(self.socket.close(None).await?)
    }
}

fn connection_closed() -> anyhow::Error {
    std::io::Error::new(ErrorKind::ConnectionAborted, "connection closed").into()
}
