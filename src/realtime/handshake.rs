//! Server side of the RFC 6455 opening handshake.

use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::http::{Request, Response};

/// The only protocol version RFC 6455 defines.
const SUPPORTED_VERSION: &str = "13";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unsupported Sec-WebSocket-Version: {0}")]
    UnsupportedVersion(String),
}

/// Validates an upgrade request and builds the `101` reply.
///
/// The caller is expected to have checked [`Request::is_websocket_upgrade`].
pub fn accept(request: &Request) -> Result<Response, HandshakeError> {
    let headers = request.headers();

    let version = headers.get("sec-websocket-version").unwrap_or("").trim();
    if version != SUPPORTED_VERSION {
        return Err(HandshakeError::UnsupportedVersion(version.to_owned()));
    }

    let key = headers
        .get("sec-websocket-key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(Response::switching_protocols(derive_accept_key(key.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request(extra: &str) -> Request {
        let raw = format!(
            "GET / HTTP/1.1\r\nHost: relay\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n{extra}\r\n"
        );
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn rfc_sample_key() {
        let req = upgrade_request(
            "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n",
        );
        let res = accept(&req).unwrap();
        assert_eq!(
            res.headers().get("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn missing_key() {
        let req = upgrade_request("Sec-WebSocket-Version: 13\r\n");
        assert_eq!(accept(&req).unwrap_err(), HandshakeError::MissingKey);
    }

    #[test]
    fn wrong_version() {
        let req = upgrade_request(
            "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n",
        );
        assert_eq!(
            accept(&req).unwrap_err(),
            HandshakeError::UnsupportedVersion("8".into())
        );
    }
}
