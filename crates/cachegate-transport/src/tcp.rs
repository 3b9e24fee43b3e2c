//! Plain TCP transport with length-prefixed frames.
//!
//! Wire format of one frame:
//!
//! ```text
//! +----------------+---------------------+
//! | len: u32 (BE)  | payload: len bytes  |
//! +----------------+---------------------+
//! ```
//!
//! The length is checked against the connection's limit as soon as the
//! four header bytes arrive, so an oversized frame is refused before its
//! body is buffered.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Dial, Incoming, Transport, TransportError};

/// Default upper bound on a single frame (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

/// A length-prefixed TCP [`Transport`].
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_bytes: usize,
}

impl TcpTransport {
    /// Binds a TCP transport with [`DEFAULT_MAX_FRAME_BYTES`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with_limit(addr, DEFAULT_MAX_FRAME_BYTES).await
    }

    /// Binds a TCP transport that refuses frames above `max_frame_bytes`.
    pub async fn bind_with_limit(
        addr: &str,
        max_frame_bytes: usize,
    ) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, max_frame_bytes, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_bytes,
        })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Incoming = TcpIncoming;

    async fn accept(&mut self) -> Result<Self::Incoming, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(TcpIncoming {
            stream,
            addr,
            max_frame_bytes: self.max_frame_bytes,
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// An accepted TCP socket. Framing needs no negotiation, so
/// [`establish`](Incoming::establish) never waits on the peer.
pub struct TcpIncoming {
    stream: TcpStream,
    addr: SocketAddr,
    max_frame_bytes: usize,
}

impl Incoming for TcpIncoming {
    type Connection = TcpConnection;

    async fn establish(self) -> Result<Self::Connection, TransportError> {
        let id = ConnectionId::next();
        tracing::debug!(%id, addr = %self.addr, "accepted TCP connection");
        Ok(TcpConnection::new(id, self.stream, self.max_frame_bytes))
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Opens client-side length-prefixed TCP connections.
#[derive(Debug, Clone, Copy)]
pub struct TcpDialer {
    max_frame_bytes: usize,
}

impl TcpDialer {
    /// Creates a dialer whose connections refuse frames above
    /// `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Dial for TcpDialer {
    type Connection = TcpConnection;

    async fn dial(&self, addr: &str) -> Result<Self::Connection, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let id = ConnectionId::next();
        tracing::debug!(%id, addr, "opened TCP connection");
        Ok(TcpConnection::new(id, stream, self.max_frame_bytes))
    }
}

/// Read side of a connection: the socket plus any bytes received but
/// not yet returned as a complete frame.
struct FrameReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

impl FrameReader {
    /// Pops one complete frame off the front of the buffer, if present.
    fn take_frame(&mut self, max: usize) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buf[..HEADER_LEN]);
        let size = u32::from_be_bytes(header) as usize;
        if size > max {
            return Err(TransportError::FrameTooLarge { size, max });
        }
        if self.buf.len() < HEADER_LEN + size {
            return Ok(None);
        }
        let frame = self.buf[HEADER_LEN..HEADER_LEN + size].to_vec();
        self.buf.drain(..HEADER_LEN + size);
        Ok(Some(frame))
    }
}

/// A single length-prefixed TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    reader: Mutex<FrameReader>,
    writer: Mutex<OwnedWriteHalf>,
    max_frame_bytes: usize,
}

impl TcpConnection {
    fn new(id: ConnectionId, stream: TcpStream, max_frame_bytes: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            id,
            reader: Mutex::new(FrameReader {
                half: read_half,
                buf: Vec::new(),
            }),
            writer: Mutex::new(write_half),
            max_frame_bytes,
        }
    }
}

impl Connection for TcpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > self.max_frame_bytes || data.len() > u32::MAX as usize {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_bytes,
            });
        }
        let header = (data.len() as u32).to_be_bytes();

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&header)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.write_all(data).await.map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;
        loop {
            if let Some(frame) = reader.take_frame(self.max_frame_bytes)? {
                return Ok(Some(frame));
            }
            // `read_buf` is cancel-safe: bytes read so far stay in `buf`.
            let n = reader
                .half
                .read_buf(&mut reader.buf)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if reader.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::ConnectionClosed(format!(
                    "peer closed with {} bytes of an incomplete frame",
                    reader.buf.len()
                )));
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FrameReader needs a real socket half, so these tests drive a
    // loopback pair and poke raw bytes through the writer side.
    async fn pair(max: usize) -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (TcpConnection::new(ConnectionId::next(), server, max), client)
    }

    #[tokio::test]
    async fn test_recv_reassembles_split_frame() {
        let (conn, mut raw) = pair(64).await;

        raw.write_all(&[0, 0, 0, 5, b'h', b'e']).await.unwrap();
        raw.flush().await.unwrap();
        tokio::task::yield_now().await;
        raw.write_all(b"llo").await.unwrap();

        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(frame, b"hello");
    }

    #[tokio::test]
    async fn test_recv_two_frames_in_one_read() {
        let (conn, mut raw) = pair(64).await;

        raw.write_all(&[0, 0, 0, 1, b'a', 0, 0, 0, 2, b'b', b'c'])
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap().unwrap(), b"a");
        assert_eq!(conn.recv().await.unwrap().unwrap(), b"bc");
    }

    #[tokio::test]
    async fn test_recv_oversized_header_returns_frame_too_large() {
        let (conn, mut raw) = pair(16).await;

        raw.write_all(&1000u32.to_be_bytes()).await.unwrap();

        let err = conn.recv().await.unwrap_err();
        assert!(
            matches!(err, TransportError::FrameTooLarge { size: 1000, max: 16 }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_recv_clean_close_returns_none() {
        let (conn, raw) = pair(16).await;
        drop(raw);

        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recv_close_mid_frame_returns_connection_closed() {
        let (conn, mut raw) = pair(16).await;
        raw.write_all(&[0, 0, 0, 8, b'x']).await.unwrap();
        drop(raw);

        let err = conn.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_send_rejects_frame_above_limit() {
        let (conn, _raw) = pair(4).await;

        let err = conn.send(b"too long").await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 8, max: 4 }));
    }
}
