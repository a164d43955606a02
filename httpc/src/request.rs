//! Request headers and HTTP/1.0 request serialisation.

use std::fmt;
use url::Url;

pub const PROTOCOL_VERSION: &str = "HTTP/1.0";
pub const CRLF: &str = "\r\n";

/// Request headers in insertion order.
///
/// Re-inserting an existing key replaces its value in place, so the wire
/// order is the order keys were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
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

    /// Parse a `Key:Value` argument. Whitespace around either side is dropped.
    pub fn parse_line(line: &str) -> Option<(String, String)> {
        let (key, value) = line.split_once(':')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.trim().to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// One `Key:Value CRLF` line per header.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            write!(f, "{k}:{v}{CRLF}")?;
        }
        Ok(())
    }
}

/// Path plus `?query` when the URL has one.
pub fn request_target(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

/// `GET target HTTP/1.0 CRLF headers CRLF CRLF`
pub fn format_get(url: &Url, headers: &Headers) -> Vec<u8> {
    format!(
        "GET {} {PROTOCOL_VERSION}{CRLF}{headers}{CRLF}{CRLF}",
        request_target(url)
    )
    .into_bytes()
}

/// `POST target HTTP/1.0 CRLF headers CRLF body CRLF`, with a
/// `Content-Length` header matching `body`.
pub fn format_post(url: &Url, headers: &Headers, body: &[u8]) -> Vec<u8> {
    let mut headers = headers.clone();
    headers.insert("Content-Length", body.len().to_string());

    let mut out = format!(
        "POST {} {PROTOCOL_VERSION}{CRLF}{headers}{CRLF}",
        request_target(url)
    )
    .into_bytes();
    out.extend_from_slice(body);
    out.extend_from_slice(CRLF.as_bytes());
    out
}
