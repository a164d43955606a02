//! Response parsing: status line, headers, body.

use crate::error::HttpcError;

const HEAD_END: &str = "\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub protocol: String,
    pub status_code: u16,
    /// Header lines in wire order, keys as sent.
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// The response exactly as received.
    pub raw: String,
}

impl Response {
    /// Parse a response.
    ///
    /// Head and body are split at the first blank line. Header parsing
    /// stops at the first line without a `:` separator.
    pub fn parse(bytes: &[u8]) -> Result<Self, HttpcError> {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        let (head, body) = raw
            .split_once(HEAD_END)
            .ok_or_else(|| HttpcError::MalformedResponse("no blank line after headers".into()))?;

        let mut lines = head.split('\n').map(|l| l.trim_end_matches('\r'));
        let status_line = lines.next().unwrap_or_default();
        if !status_line.starts_with("HTTP") {
            return Err(HttpcError::BadStatusLine(status_line.to_string()));
        }
        let mut parts = status_line.split(' ');
        let protocol = parts.next().unwrap_or_default().to_string();
        let status_code = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| HttpcError::BadStatusLine(status_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let Some((key, value)) = line.split_once(':') else {
                break;
            };
            headers.push((key.to_string(), value.trim().to_string()));
        }

        let body = body.to_string();
        Ok(Self {
            protocol,
            status_code,
            headers,
            body,
            raw,
        })
    }

    /// First header whose key is exactly `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Non-empty `Location` header, if any.
    pub fn location(&self) -> Option<&str> {
        self.header("Location").filter(|l| !l.is_empty())
    }

    /// 301, 302 or 303.
    pub fn is_redirect(&self) -> bool {
        (301..=303).contains(&self.status_code)
    }
}
