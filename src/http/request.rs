//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value}")]
    InvalidContentLength { value: String },

    #[error("malformed chunked body")]
    InvalidChunk,

    #[error("both Content-Length and Transfer-Encoding are set")]
    ConflictingFraming,

    #[error("request exceeds {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },
}

/// A parsed HTTP/1.1 request.
///
/// [`Request::parse`] only needs the head to be complete; the server attaches
/// the body with [`Request::with_body`] once `Content-Length` bytes arrived.
///
/// # Examples
///
/// ```
/// use sns_relay::http::request::Request;
///
/// let raw = b"POST /sns HTTP/1.1\r\nHost: relay\r\nContent-Length: 2\r\n\r\n{}";
/// let (head, offset) = Request::parse(raw).unwrap();
/// let request = head.with_body(&raw[offset..offset + 2]);
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/sns");
/// assert_eq!(request.body().as_ref(), b"{}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses a request head from `buf`.
    ///
    /// Returns the request (with an empty body) and the offset of the first
    /// body byte in `buf`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] if the header block is not terminated yet.
    /// - [`RequestError::Parse`] if the bytes are not a valid HTTP/1.x request.
    /// - [`RequestError::MissingField`] if the method, path or version is missing.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw.path.ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (target.to_owned(), None),
        };

        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                path,
                query,
                version,
                headers: header_map,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the framed body to this request.
    #[must_use]
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = Bytes::copy_from_slice(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 only with an explicit
    /// `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        if self.headers.has_token("connection", "close") {
            return false;
        }
        self.version == 1 || self.headers.has_token("connection", "keep-alive")
    }

    /// Declared body length. A missing header means no body.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidContentLength`] if the header is not a decimal.
    pub fn content_length(&self) -> Result<usize, RequestError> {
        match self.headers.get("content-length") {
            None => Ok(0),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| RequestError::InvalidContentLength {
                    value: v.to_owned(),
                }),
        }
    }

    /// `true` when the body is sent with `Transfer-Encoding: chunked`.
    pub fn is_chunked(&self) -> bool {
        self.headers.has_token("transfer-encoding", "chunked")
    }

    /// `true` when the client asks to switch this connection to WebSocket
    /// (RFC 6455 §4.2.1: `GET` with `Upgrade: websocket` and
    /// `Connection: Upgrade`).
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == Method::Get
            && self.headers.has_token("upgrade", "websocket")
            && self.headers.has_token("connection", "upgrade")
    }
}
