//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each binary (or text) WebSocket message is one frame. Both the
//! server side ([`WebSocketTransport`]) and the client side
//! ([`WebSocketDialer`]) run over a plain `TcpStream`, so they share the
//! same [`WebSocketConnection`] type.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::error::io_error;
use crate::{Connection, ConnectionId, Dial, Incoming, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Incoming = WebSocketIncoming;

    async fn accept(&mut self) -> Result<Self::Incoming, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "TCP socket accepted, upgrade pending");
        Ok(WebSocketIncoming { stream, addr })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A TCP socket that has not completed the WebSocket upgrade.
pub struct WebSocketIncoming {
    stream: TcpStream,
    addr: SocketAddr,
}

impl Incoming for WebSocketIncoming {
    type Connection = WebSocketConnection;

    async fn establish(self) -> Result<Self::Connection, TransportError> {
        let ws = tokio_tungstenite::accept_async(self.stream).await.map_err(|e| {
            TransportError::AcceptFailed(io_error(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = ConnectionId::next();
        tracing::debug!(%id, addr = %self.addr, "accepted WebSocket connection");

        Ok(WebSocketConnection::new(id, ws))
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Opens client-side WebSocket connections (`ws://host:port/`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dial for WebSocketDialer {
    type Connection = WebSocketConnection;

    async fn dial(&self, addr: &str) -> Result<Self::Connection, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;

        let (ws, _response) =
            tokio_tungstenite::client_async(format!("ws://{addr}/"), stream)
                .await
                .map_err(|e| {
                    TransportError::ConnectFailed(io_error(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    ))
                })?;

        let id = ConnectionId::next();
        tracing::debug!(%id, addr, "opened WebSocket connection");

        Ok(WebSocketConnection::new(id, ws))
    }
}

/// A single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    ws: Mutex<WsStream>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: WsStream) -> Self {
        Self {
            id,
            ws: Mutex::new(ws),
        }
    }
}

impl Connection for WebSocketConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        use futures_util::SinkExt;
        let msg = Message::Binary(data.to_vec().into());
        self.ws.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        use futures_util::StreamExt;
        let mut ws = self.ws.lock().await;
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.ws.lock().await.close(None).await.map_err(|e| {
            TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
