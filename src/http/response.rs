//! HTTP/1.1 response builder.
//!
//! A fluent builder for the handful of replies the relay sends, serialized to
//! a byte buffer for the TCP stream.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use sns_relay::http::{Response, StatusCode};
///
/// let bytes = Response::new(StatusCode::Ok).body("Message processed").into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 17\r\n"));
/// assert!(text.ends_with("\r\n\r\nMessage processed"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// `101 Switching Protocols` completing a WebSocket opening handshake.
    pub fn switching_protocols(accept_key: impl Into<String>) -> Self {
        Self::new(StatusCode::SwitchingProtocols)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", accept_key)
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response using HTTP/1.1 wire format.
    ///
    /// Ordinary responses get `Content-Type: text/plain; charset=utf-8` when
    /// the body is non-empty and no type was set, a `Connection` header, and
    /// a trailing `Content-Length`. A `101` is written exactly as built, since
    /// the bytes that follow it belong to the new protocol.
    pub fn into_bytes(mut self) -> BytesMut {
        let upgrading = self.status == StatusCode::SwitchingProtocols;
        let content_length = self.body.len();

        if !upgrading {
            if !self.body.is_empty() && !self.headers.contains("content-type") {
                self.headers
                    .insert("Content-Type", "text/plain; charset=utf-8");
            }
            let connection = if self.keep_alive { "keep-alive" } else { "close" };
            self.headers.insert("Connection", connection);
        }

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        buf.put(self.headers.to_string().as_bytes());
        if !upgrading {
            buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_slice());

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
