//! Per-request context handed to route handlers.

use crate::Request;

/// Wraps one fully-buffered [`Request`] for a handler.
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Raw request body.
    pub fn body(&self) -> &[u8] {
        self.request.body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_body(body: &str) -> Context {
        let raw = format!(
            "POST /sns HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (head, offset) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(head.with_body(&raw.as_bytes()[offset..]))
    }

    #[test]
    fn exposes_request_and_body() {
        let ctx = ctx_with_body(r#"{"Type":"Notification"}"#);
        assert_eq!(ctx.request().path(), "/sns");
        assert_eq!(ctx.body(), br#"{"Type":"Notification"}"#);
    }

    #[test]
    fn empty_body() {
        let ctx = ctx_with_body("");
        assert!(ctx.body().is_empty());
    }
}
