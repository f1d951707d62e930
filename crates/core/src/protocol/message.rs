//! Shared line-oriented message framing for RTSP and HTTP.
//!
//! Both protocols use the same wire shape (RFC 2326 borrows HTTP/1.1
//! syntax):
//!
//! ```text
//! Start-Line CRLF
//! *(Header: Value CRLF)
//! CRLF
//! [body of Content-Length bytes]
//! ```
//!
//! The protocol tag on the start line (`RTSP` vs `HTTP`) and the method set
//! differ; those are owned by [`crate::rtsp`] and [`crate::http`]. This
//! module owns what is common: reading a message head off a buffered
//! socket, header parsing with case-insensitive lookup, and body framing.

use std::io::{BufRead, Read};

use crate::error::{GatewayError, ParseErrorKind, Result};

/// Ordered header collection with case-insensitive lookup.
///
/// Names are stored as supplied by the writer and emitted in insertion
/// order; lookups compare ASCII case-insensitively per RFC 2326 §4.2 /
/// RFC 2616 §4.2.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a header, keeping the supplied canonical form.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Look up a header value by name (case-insensitive, first match).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value of `Content-Length`, defaulting to 0 when absent or malformed.
    pub fn content_length(&self) -> usize {
        self.get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `Name: Value\r\n` lines (no trailing blank line).
    pub fn serialize_into(&self, out: &mut String) {
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
    }
}

/// Read lines until the blank line that terminates a message head.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything (the normal end of a keep-alive HTTP conversation), and
/// [`GatewayError::Transport`] on a mid-message close or read failure.
pub fn read_head<R: BufRead>(reader: &mut R) -> Result<Option<Vec<String>>> {
    let mut lines = Vec::new();

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            if lines.is_empty() {
                return Ok(None);
            }
            return Err(GatewayError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-message",
            )));
        }
        if line == "\r\n" || line == "\n" {
            return Ok(Some(lines));
        }
        // Strip the line terminator; header parsing tolerates a bare \n.
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        lines.push(line);
    }
}

/// Read exactly `len` body bytes.
pub fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Split a start line into its three space-separated tokens.
pub fn split_start_line(line: &str) -> Result<(&str, &str, &str)> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(a), Some(b), Some(c)) => Ok((a, b, c)),
        _ => Err(GatewayError::parse(ParseErrorKind::InvalidStartLine)),
    }
}

/// Validate a `TAG/version` token against the expected protocol tag and
/// return the version part.
pub fn expect_protocol<'a>(token: &'a str, expected: &str) -> Result<&'a str> {
    match token.split_once('/') {
        Some((tag, version)) if tag == expected => Ok(version),
        _ => Err(GatewayError::parse(ParseErrorKind::WrongProtocol(
            token.to_string(),
        ))),
    }
}

/// Parse `Name: Value` header lines into a [`Headers`] collection.
///
/// Tolerates missing space after the colon and trims surrounding
/// whitespace from both name and value.
pub fn parse_headers<S: AsRef<str>>(lines: &[S]) -> Result<Headers> {
    let mut headers = Headers::new();
    for line in lines {
        let line = line.as_ref();
        let colon = line
            .find(':')
            .ok_or_else(|| GatewayError::parse(ParseErrorKind::InvalidHeader))?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn header_lookup_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "42");
        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.get("Content-Length"), Some("42"));
        assert_eq!(headers.content_length(), 42);
    }

    #[test]
    fn headers_keep_canonical_form_and_order() {
        let mut headers = Headers::new();
        headers.insert("CSeq", "1");
        headers.insert("Session", "12345");
        let mut out = String::new();
        headers.serialize_into(&mut out);
        assert_eq!(out, "CSeq: 1\r\nSession: 12345\r\n");
    }

    #[test]
    fn read_head_until_blank_line() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\nbody";
        let mut reader = BufReader::new(&raw[..]);
        let lines = read_head(&mut reader).unwrap().unwrap();
        assert_eq!(lines, vec!["RTSP/1.0 200 OK", "CSeq: 2"]);

        let body = read_body(&mut reader, 4).unwrap();
        assert_eq!(&body, b"body");
    }

    #[test]
    fn read_head_clean_eof_is_none() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_head(&mut reader).unwrap().is_none());
    }

    #[test]
    fn read_head_mid_message_eof_is_error() {
        let mut reader = BufReader::new(&b"GET / HTTP/1.0\r\n"[..]);
        assert!(read_head(&mut reader).is_err());
    }

    #[test]
    fn parse_headers_tolerates_spacing() {
        let headers = parse_headers(&["CSeq:2", "Session:  abc  "]).unwrap();
        assert_eq!(headers.get("cseq"), Some("2"));
        assert_eq!(headers.get("session"), Some("abc"));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        assert!(parse_headers(&["not a header"]).is_err());
    }

    #[test]
    fn start_line_splitting() {
        let (method, url, proto) =
            split_start_line("GET /playlist.m3u HTTP/1.0").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(url, "/playlist.m3u");
        assert_eq!(expect_protocol(proto, "HTTP").unwrap(), "1.0");
        assert!(expect_protocol(proto, "RTSP").is_err());
        assert!(split_start_line("JUST_A_METHOD").is_err());
    }
}
