/// Errors that can occur in the transport layer.
///
/// These are network problems, never authentication problems. The
/// handshake layer keeps them apart from its reason codes so a caller
/// can tell "the server is unreachable" from "the password is wrong".
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening an outbound connection failed (refused, unreachable, ...).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A frame announced a length above the transport's limit.
    ///
    /// The body is never read, so an oversized frame costs the server
    /// four bytes of buffer, not `size`.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}

/// Wraps a foreign error (e.g. a tungstenite error) as an I/O error of
/// the given kind so it fits the `#[source]` slots above.
#[cfg(feature = "websocket")]
pub(crate) fn io_error<E>(kind: std::io::ErrorKind, err: E) -> std::io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    std::io::Error::new(kind, err)
}
