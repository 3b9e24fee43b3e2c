//! Unified error type for cachegate.

use cachegate_protocol::ProtocolError;
use cachegate_transport::TransportError;

/// Top-level error for the server side of cachegate.
///
/// When using the `cachegate` crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically: `bind(...).await?`
/// inside [`CacheServerBuilder::build`](crate::CacheServerBuilder::build)
/// turns a `TransportError` into a `CachegateError` without a `map_err`.
///
/// `#[error(transparent)]` forwards both `Display` and `source()` to the
/// wrapped error, so logging a `CachegateError` prints the underlying
/// message unchanged.
///
/// Only failures that stop the server or abort writing a reply live here.
/// Handshake rejections are a normal
/// [`HandshakeOutcome`](crate::HandshakeOutcome) on the server and a
/// [`ConnectError`](crate::ConnectError) on the client. Authenticator and
/// session registry errors never escape the coordinator: they are turned
/// into reason codes on the wire.
#[derive(Debug, thiserror::Error)]
pub enum CachegateError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error, in practice failing to encode a reply.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
