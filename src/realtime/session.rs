//! One WebSocket client from completed handshake to disconnect.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, Connection};
use super::registry::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    PeerClosed,
    TransportError,
    Shutdown,
}

/// Runs a session over an upgraded stream.
///
/// `leftover` holds any bytes read past the handshake request; they are fed
/// to the WebSocket decoder first. The client is registered for broadcasts
/// while the session runs and unregistered when the transport closes or
/// fails. On shutdown, payloads already queued for the client are written
/// before a `1001 Going Away` close frame.
pub async fn run_session<S>(
    stream: S,
    leftover: Vec<u8>,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    queue_capacity: usize,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = WebSocketStream::from_partially_read(stream, leftover, Role::Server, None).await;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (connection, mut outbound) = ClientConnection::channel(peer, queue_capacity);
    let connection = Arc::new(connection);
    let conn_id = connection.id();
    registry.add(connection.clone());
    info!(conn_id = %conn_id, peer = %peer, clients = registry.len(), "client connected");

    let ending = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break Ending::Shutdown,

            queued = outbound.recv() => {
                let Some(text) = queued else { break Ending::TransportError };
                if let Err(e) = ws_tx.send(Message::text(text.to_string())).await {
                    warn!(conn_id = %conn_id, error = %e, "websocket write failed");
                    break Ending::TransportError;
                }
            }

            incoming = ws_rx.next() => match incoming {
                None | Some(Ok(Message::Close(_))) => break Ending::PeerClosed,
                Some(Ok(_)) => {
                    // Inbound frames carry no protocol; pings are answered by tungstenite.
                }
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "websocket error");
                    break Ending::TransportError;
                }
            },
        }
    };

    registry.remove(conn_id);

    if ending == Ending::Shutdown {
        let mut flushed = 0usize;
        while let Ok(text) = outbound.try_recv() {
            if ws_tx.send(Message::text(text.to_string())).await.is_err() {
                break;
            }
            flushed += 1;
        }
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: String::from("server shutting down").into(),
        };
        if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
            debug!(conn_id = %conn_id, error = %e, "close frame not delivered");
        }
        debug!(conn_id = %conn_id, flushed, "session drained for shutdown");
    }

    let _ = ws_tx.close().await;
    info!(
        conn_id = %conn_id,
        peer = %connection.peer(),
        reason = ?ending,
        connected_secs = connection.connected_at().elapsed().as_secs_f64(),
        dropped = connection.dropped_messages(),
        clients = registry.len(),
        "client disconnected"
    );
}
