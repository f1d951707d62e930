//! Error types for the media gateway.
//!
//! Variants map to specific failure modes across the stack:
//!
//! - **Transport**: [`Transport`](GatewayError::Transport) — socket/network
//!   failures. Fatal for the session that owns the socket.
//! - **Protocol**: [`Parse`](GatewayError::Parse),
//!   [`Protocol`](GatewayError::Protocol) — malformed RTSP/HTTP/SDP input or
//!   an unexpected status/header from the upstream server. Session fatal.
//! - **Media**: [`MediaFormat`](GatewayError::MediaFormat) — a malformed
//!   RTP/MJPEG packet. Logged and dropped; the pipeline continues.
//! - **Muxing**: [`Muxer`](GatewayError::Muxer) — the transcoder or TS muxer
//!   reported failure. Fatal to the pipeline.
//!
//! HTTP-level dispatch failures (404/400/500) are responses, not errors —
//! see [`crate::port::RequestDispatcher`].

use std::fmt;

/// Errors that can occur in the media gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Transport(#[from] std::io::Error),

    /// Failed to parse an RTSP/HTTP message or an SDP body.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The upstream server violated the RTSP contract (bad status code,
    /// missing required header, unsupported method set).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A malformed RTP or MJPEG packet. The offending packet is dropped.
    #[error("malformed media packet: {0}")]
    MediaFormat(String),

    /// The transcoder or container muxer failed. Fatal to the pipeline.
    #[error("muxer error: {0}")]
    Muxer(String),
}

/// Specific kind of message/URL parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Start line did not have the expected three-token format.
    InvalidStartLine,
    /// The start line carried a protocol tag other than the expected one.
    WrongProtocol(String),
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The method token is not part of the protocol's method set.
    UnknownMethod(String),
    /// A required SDP key was absent or out of order.
    InvalidSdp(String),
    /// The stream URL could not be split into scheme/host/path.
    BadUrl(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidStartLine => write!(f, "invalid start line"),
            Self::WrongProtocol(got) => write!(f, "unexpected protocol {got:?}"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::UnknownMethod(m) => write!(f, "unknown method {m:?}"),
            Self::InvalidSdp(detail) => write!(f, "invalid SDP: {detail}"),
            Self::BadUrl(url) => write!(f, "bad url {url:?}"),
        }
    }
}

impl GatewayError {
    /// Shorthand for a [`Parse`](Self::Parse) error.
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        GatewayError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, GatewayError>`.
pub type Result<T> = std::result::Result<T, GatewayError>;
