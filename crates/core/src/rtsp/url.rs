//! `rtsp://` stream URL handling.
//!
//! `rtsp://host:5544/jpeg`  → host `host`, port 5544, path `/jpeg`
//! `rtsp://host/jpeg/`      → host `host`, port 554 (default), path `/jpeg`
//! `rtsp://host`            → path `/`

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{GatewayError, ParseErrorKind, Result};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// A split `rtsp://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUrl {
    host: String,
    port: u16,
    path: String,
}

impl StreamUrl {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute path component, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full URL in canonical form, used on RTSP request lines.
    pub fn as_request_target(&self) -> String {
        format!("rtsp://{}:{}{}", self.host, self.port, self.path)
    }

    /// Append a track sub-path (from the SDP `control` attribute).
    pub fn join(&self, sub_path: &str) -> StreamUrl {
        let mut path = self.path.clone();
        if !sub_path.starts_with('/') {
            path.push('/');
        }
        path.push_str(sub_path);
        StreamUrl {
            host: self.host.clone(),
            port: self.port,
            path,
        }
    }

    /// Resolve the host to the first IPv4 socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| {
                GatewayError::Protocol(format!("no IPv4 address for host {:?}", self.host))
            })
    }
}

impl FromStr for StreamUrl {
    type Err = GatewayError;

    fn from_str(url: &str) -> Result<Self> {
        let bad = || GatewayError::parse(ParseErrorKind::BadUrl(url.to_string()));

        let rest = url.strip_prefix("rtsp://").ok_or_else(bad)?;

        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| bad())?),
            None => (authority, DEFAULT_RTSP_PORT),
        };
        if host.is_empty() {
            return Err(bad());
        }

        // Trailing-slash strip is a plain suffix check; `/` alone stays.
        let path = match path.strip_suffix('/') {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => path,
        };

        Ok(StreamUrl {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

impl std::fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_request_target())
    }
}
