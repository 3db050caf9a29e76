//! Async TCP server using Tokio.
//!
//! One listener serves both surfaces of the relay: plain HTTP/1.1 requests go
//! through the [`Router`], and a WebSocket upgrade on the realtime path hands
//! the socket to the [`RealtimeEndpoint`]. Persistent connections
//! (keep-alive) are supported for the HTTP side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::realtime::{RealtimeEndpoint, handshake};
use crate::router::Router;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
pub const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Cap on buffered wire bytes of a chunked request, whose framing overhead
/// is not bounded by the decoded size.
const MAX_CHUNKED_WIRE_SIZE: usize = 2 * MAX_REQUEST_SIZE;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The relay's HTTP + WebSocket server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sns_relay::realtime::{ConnectionRegistry, RealtimeEndpoint};
/// use sns_relay::{Router, Server};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     let realtime = RealtimeEndpoint::new(Arc::new(ConnectionRegistry::new()));
///     server
///         .run(Arc::new(Router::new()), realtime, CancellationToken::new())
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_grace: Duration,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// How long in-flight connections get to finish after shutdown starts.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// On shutdown the listener is closed first, then open connections get
    /// the grace period to finish (WebSocket sessions flush and send a close
    /// frame); whatever is still running after that is aborted.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept errors are logged and skipped.
    pub async fn run(
        self,
        router: Arc<Router>,
        realtime: RealtimeEndpoint,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let Self {
            listener,
            local_addr,
            shutdown_grace,
        } = self;
        info!(address = %local_addr, "sns-relay listening");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "connection task failed");
                    }
                }

                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let router = Arc::clone(&router);
                    let realtime = realtime.clone();
                    let shutdown = shutdown.clone();

                    connections.spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer_addr, router, realtime, shutdown).await
                        {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
            }
        }

        drop(listener);
        info!(open = connections.len(), "shutting down");

        let drained = tokio::time::timeout(shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                grace_secs = shutdown_grace.as_secs_f64(),
                "grace period elapsed, aborting connections"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        info!("server stopped");
        Ok(())
    }
}

/// Splits one complete request off the front of `buf`.
///
/// Bodies are framed by `Content-Length` or decoded from
/// `Transfer-Encoding: chunked`; a request carrying both is rejected. Returns
/// `Ok(None)` while more bytes are needed, otherwise the request with its body
/// attached and the number of bytes it occupied.
fn frame_request(buf: &[u8]) -> Result<Option<(Request, usize)>, RequestError> {
    let too_large = RequestError::BodyTooLarge {
        max_bytes: MAX_REQUEST_SIZE,
    };

    let (head, body_offset) = match Request::parse(buf) {
        Ok(pair) => pair,
        Err(RequestError::Incomplete) if buf.len() > MAX_REQUEST_SIZE => return Err(too_large),
        Err(RequestError::Incomplete) => return Ok(None),
        Err(e) => return Err(e),
    };

    if head.is_chunked() {
        if head.headers().contains("content-length") {
            return Err(RequestError::ConflictingFraming);
        }
        return match decode_chunked(&buf[body_offset..])? {
            Some((body, used)) => Ok(Some((head.with_body(&body), body_offset + used))),
            None if buf.len() > MAX_CHUNKED_WIRE_SIZE => Err(too_large),
            None => Ok(None),
        };
    }

    let total = body_offset.saturating_add(head.content_length()?);
    if total > MAX_REQUEST_SIZE {
        return Err(too_large);
    }
    if buf.len() < total {
        return Ok(None);
    }

    let request = head.with_body(&buf[body_offset..total]);
    Ok(Some((request, total)))
}

/// Decodes a chunked body from the front of `buf`.
///
/// Returns the decoded body and the number of wire bytes it used (trailers
/// included), or `Ok(None)` if the terminating chunk has not arrived yet.
fn decode_chunked(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, RequestError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let (size_len, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(_) => return Err(RequestError::InvalidChunk),
        };
        pos += size_len;

        if size == 0 {
            let rest = &buf[pos..];
            if rest.starts_with(b"\r\n") {
                return Ok(Some((body, pos + 2)));
            }
            return Ok(rest
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|end| (body, pos + end + 4)));
        }

        let size = usize::try_from(size).map_err(|_| RequestError::BodyTooLarge {
            max_bytes: MAX_REQUEST_SIZE,
        })?;
        if body.len().saturating_add(size) > MAX_REQUEST_SIZE {
            return Err(RequestError::BodyTooLarge {
                max_bytes: MAX_REQUEST_SIZE,
            });
        }

        let data_end = pos + size;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(RequestError::InvalidChunk);
        }
        body.extend_from_slice(&buf[pos..data_end]);
        pos = data_end + 2;
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection, signals
/// `Connection: close`, upgrades to WebSocket, or the server shuts down.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    router: Arc<Router>,
    realtime: RealtimeEndpoint,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let (request, consumed) = match frame_request(&buf) {
            Ok(Some(framed)) => framed,
            Ok(None) => {
                let bytes_read = tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(peer = %peer_addr, "closing idle connection for shutdown");
                        break;
                    }
                    read = stream.read_buf(&mut buf) => read?,
                };
                if bytes_read == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
            Err(e @ RequestError::BodyTooLarge { .. }) => {
                warn!(peer = %peer_addr, error = %e, "request too large, sending 413");
                let response = Response::new(StatusCode::PayloadTooLarge)
                    .body("Request entity too large")
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Bytes after this request belong to the next request or, after an
        // upgrade, to the WebSocket stream.
        let _ = buf.split_to(consumed);

        if request.is_websocket_upgrade() && request.path() == realtime.path() {
            match handshake::accept(&request) {
                Ok(response) => {
                    stream.write_all(&response.into_bytes()).await?;
                    stream.flush().await?;
                    debug!(peer = %peer_addr, "upgraded to websocket");
                    realtime
                        .attach(stream, buf.to_vec(), peer_addr, shutdown)
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "rejected websocket handshake");
                    let response = Response::new(StatusCode::BadRequest)
                        .body(e.to_string())
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    break;
                }
            }
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = router.route(request).await;
        let keep_alive = keep_alive && !shutdown.is_cancelled();
        stream
            .write_all(&response.keep_alive(keep_alive).into_bytes())
            .await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection after response");
            break;
        }
    }

    Ok(())
}
