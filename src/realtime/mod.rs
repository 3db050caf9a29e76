//! Real-time delivery over WebSocket.
//!
//! Clients upgrade an ordinary HTTP connection on [`WS_PATH`]; each accepted
//! client becomes a [`ClientConnection`] in the shared
//! [`ConnectionRegistry`] until its transport closes. Server→client text
//! frames carry broadcast payloads; anything a client sends is ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub mod connection;
pub mod handshake;
pub mod registry;
pub mod session;

pub use connection::{ClientConnection, Connection, ConnectionId, SendError};
pub use handshake::HandshakeError;
pub use registry::{BroadcastReport, ConnectionRegistry};

/// Path clients connect to.
pub const WS_PATH: &str = "/";

/// Default capacity of each client's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Where upgraded connections are attached.
#[derive(Clone)]
pub struct RealtimeEndpoint {
    registry: Arc<ConnectionRegistry>,
    queue_capacity: usize,
}

impl RealtimeEndpoint {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn path(&self) -> &str {
        WS_PATH
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Serves one client on a stream whose `101` reply was already written.
    pub async fn attach<S>(
        &self,
        stream: S,
        leftover: Vec<u8>,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        session::run_session(
            stream,
            leftover,
            peer,
            Arc::clone(&self.registry),
            self.queue_capacity,
            shutdown,
        )
        .await;
    }
}
