//! Transport channel abstraction.
//!
//! The registry owns a connection's channel handle exclusively. The
//! transport layer constructs one handle per accepted connection, gives it
//! away on `connect`, and from then on addresses the peer by
//! `(group, identity)` — never by handle. The registry closes a handle when
//! the same member reconnects or when the connection is torn down.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a transport channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer's socket task is gone; nothing can be delivered anymore.
    #[error("channel closed: {0}")]
    Closed(String),

    /// The transport reported a write failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One connection's duplex message handle.
///
/// Implementations are expected to hand the payload off to a writer task
/// and fail fast once that task is gone, so a slow socket cannot stall a
/// broadcast loop. There is no send timeout: a send only fails when the
/// transport reports it.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Deliver one serialized event to the peer.
    async fn send(&self, text: &str) -> Result<(), ChannelError>;

    /// Close the underlying connection. Best-effort: callers ignore errors.
    async fn close(&self) -> Result<(), ChannelError>;
}
