//! Order-preserving header list with case-insensitive lookup.

use std::fmt;

/// HTTP header fields in the order they were received or inserted.
///
/// Names compare case-insensitively (RFC 9110 §5.1). Repeated names are kept
/// as separate entries so that list-valued headers such as `Connection`
/// can be inspected with [`has_token`](Self::has_token).
///
/// # Examples
///
/// ```
/// use sns_relay::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Connection", "keep-alive, Upgrade");
/// headers.insert("Upgrade", "websocket");
///
/// assert!(headers.has_token("connection", "upgrade"));
/// assert_eq!(headers.get("UPGRADE"), Some("websocket"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry; an existing entry with the same name is left in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns `true` if any `name` entry lists `token` in its comma-separated
    /// value, ignoring case and surrounding whitespace.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert!(h.contains("CONTENT-TYPE"));
        assert!(!h.contains("x-amz-sns-message-type"));
    }

    #[test]
    fn token_search_spans_repeated_headers() {
        let mut h = Headers::new();
        h.insert("Connection", "keep-alive");
        h.insert("connection", " Upgrade ");
        assert!(h.has_token("Connection", "upgrade"));
        assert!(!h.has_token("Connection", "close"));
    }

    #[test]
    fn token_search_does_not_match_substrings() {
        let mut h = Headers::new();
        h.insert("Connection", "upgraded");
        assert!(!h.has_token("connection", "upgrade"));
    }

    #[test]
    fn display_uses_wire_format() {
        let mut h = Headers::new();
        h.insert("Upgrade", "websocket");
        assert_eq!(h.to_string(), "Upgrade: websocket\r\n");
        assert_eq!(h.len(), 1);
    }
}
