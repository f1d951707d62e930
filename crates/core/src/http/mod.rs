//! HTTP/1.0 request and response types for the HLS origin.
//!
//! Shares the line-oriented framing in [`crate::protocol::message`] with
//! the RTSP side; only the protocol tag and method set differ. Requests
//! are read destructively from a buffered stream (head until the blank
//! line, then `Content-Length` bytes of body). Responses use a builder
//! and compute `Content-Length` automatically when a body is present.

use std::io::BufRead;
use std::str::FromStr;

use crate::error::{GatewayError, ParseErrorKind, Result};
use crate::protocol::message::{self, Headers};

/// HTTP request methods understood by the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl FromStr for Method {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(GatewayError::parse(ParseErrorKind::UnknownMethod(
                other.to_string(),
            ))),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A parsed HTTP request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Request target as sent by the client (origin-form path for the
    /// clients we serve).
    pub url: String,
    /// Protocol version from the request line (`1.0`, `1.1`).
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Read one request off a buffered stream.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly
    /// between requests.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Option<Self>> {
        let Some(lines) = message::read_head(reader)? else {
            return Ok(None);
        };
        let start = lines
            .first()
            .ok_or_else(|| GatewayError::parse(ParseErrorKind::EmptyMessage))?;

        let (method, url, proto) = message::split_start_line(start)?;
        let version = message::expect_protocol(proto, "HTTP")?;
        let method = method.parse()?;
        let headers = message::parse_headers(&lines[1..])?;
        let body = message::read_body(reader, headers.content_length())?;

        Ok(Some(HttpRequest {
            method,
            url: url.to_string(),
            version: version.to_string(),
            headers,
            body,
        }))
    }
}

/// An HTTP response under construction.
///
/// ```
/// use hls_gateway::http::HttpResponse;
///
/// let bytes = HttpResponse::ok()
///     .with_body(b"hello".to_vec())
///     .serialize();
/// let text = String::from_utf8(bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 5\r\n"));
/// ```
#[must_use]
#[derive(Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        HttpResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// 200 OK.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request — malformed request line or URL.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 404 Not Found — no servlet or no such resource.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 500 Internal Server Error — dispatch-internal failure.
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }

    /// 501 Not Implemented — method not supported by the servlet.
    pub fn not_implemented() -> Self {
        Self::new(501, "Not Implemented")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Serialize to the wire format. `Content-Length` is appended
    /// automatically when a body is present and the caller did not set
    /// one.
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.0 {} {}\r\n", self.status_code, self.status_text);
        self.headers.serialize_into(&mut head);
        if !self.body.is_empty() && !self.headers.contains("Content-Length") {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}
