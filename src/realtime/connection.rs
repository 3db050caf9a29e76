//! Handles to live WebSocket clients.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Identity of one client connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Why a payload could not be handed to a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

/// Something the registry can deliver broadcast text to.
///
/// `send` must not block: it either accepts the payload for delivery or
/// reports why it could not.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn send(&self, payload: Arc<str>) -> Result<(), SendError>;
}

/// A connected WebSocket client, fed through a bounded queue drained by its
/// session's writer.
pub struct ClientConnection {
    id: ConnectionId,
    peer: SocketAddr,
    tx: mpsc::Sender<Arc<str>>,
    connected_at: Instant,
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Creates a connection and the receiving end of its outbound queue.
    pub fn channel(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            peer,
            tx,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        };
        (conn, rx)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Payloads refused so far because the queue was full or closed.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Connection for ClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        self.tx.try_send(payload).map_err(|e| {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => SendError::Full,
                TrySendError::Closed(_) => SendError::Closed,
            }
        })
    }
}
