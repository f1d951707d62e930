//! Listening-port ownership and HTTP request dispatch.
//!
//! A [`PortHandler`] owns one listening TCP socket and a
//! [`RequestDispatcher`]; each accepted client gets its own worker thread
//! that loops read → dispatch → write until the peer closes. The
//! [`PortHandlerManager`] polls all registered listeners with a bounded
//! timeout so the main loop can observe the shutdown flag between polls.
//!
//! Dispatch outcomes map to responses, not errors: no matching servlet is
//! `404`, an unparseable URL is `400`, a servlet failure is `500`.

use std::collections::BTreeMap;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{GatewayError, Result};
use crate::http::{HttpRequest, HttpResponse};

/// Poll slice while waiting for a listener to become ready.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A handler for HTTP requests below one URL prefix.
///
/// Returning `Err` is an internal failure; the dispatcher answers `500`
/// and keeps the connection open.
pub trait Servlet: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Routes requests to the servlet with the longest matching URL prefix.
pub struct RequestDispatcher {
    servlets: BTreeMap<String, Arc<dyn Servlet>>,
}

impl RequestDispatcher {
    pub fn new() -> Self {
        Self {
            servlets: BTreeMap::new(),
        }
    }

    /// Register a servlet for a URL prefix. Replaces any previous servlet
    /// on the same prefix.
    pub fn register(&mut self, prefix: &str, servlet: Arc<dyn Servlet>) -> &mut Self {
        self.servlets.insert(prefix.to_string(), servlet);
        self
    }

    /// Dispatch one request, translating failures into status responses.
    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        let path = match extract_path(&request.url) {
            Ok(path) => path,
            Err(_) => {
                tracing::debug!(url = %request.url, "unparseable request url");
                return HttpResponse::bad_request();
            }
        };

        let servlet = self
            .servlets
            .iter()
            .rev()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, servlet)| servlet);

        match servlet {
            Some(servlet) => servlet.handle(request).unwrap_or_else(|e| {
                tracing::error!(error = %e, url = %request.url, "servlet failure");
                HttpResponse::internal_error()
            }),
            None => HttpResponse::not_found(),
        }
    }
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the absolute path from a request target.
///
/// Origin-form targets (`/playlist.m3u`) pass through; absolute URLs
/// (`http://host:port/path`) are reduced to their path. A trailing slash
/// is stripped with a plain suffix check, keeping `/` itself.
fn extract_path(url: &str) -> Result<&str> {
    let path = if url.starts_with('/') {
        url
    } else {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| GatewayError::Protocol(format!("bad request url {url:?}")))?;
        match rest.find('/') {
            Some(slash) => &rest[slash..],
            None => "/",
        }
    };

    Ok(match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    })
}

/// One listening socket plus the dispatcher for its clients.
pub struct PortHandler {
    listener: TcpListener,
    dispatcher: Arc<RequestDispatcher>,
    local_addr: SocketAddr,
}

impl PortHandler {
    /// Bind a non-blocking listener on `addr` (e.g. `0.0.0.0:8080`).
    pub fn bind(addr: &str, dispatcher: RequestDispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "HTTP port handler listening");
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending client, if any, and hand it to a worker thread.
    fn try_accept(&self) -> bool {
        match self.listener.accept() {
            Ok((stream, peer_addr)) => {
                let dispatcher = self.dispatcher.clone();
                thread::spawn(move || {
                    Connection::handle(stream, peer_addr, dispatcher);
                });
                true
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
                false
            }
        }
    }
}

/// Owns all port handlers and multiplexes their accept readiness.
pub struct PortHandlerManager {
    handlers: Vec<PortHandler>,
}

impl PortHandlerManager {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: PortHandler) {
        self.handlers.push(handler);
    }

    /// Accept clients on any registered port within `timeout_ms`.
    ///
    /// Returns as soon as at least one client was accepted, or when the
    /// timeout elapses; listeners are polled in bounded slices so the
    /// caller's loop stays responsive to its shutdown flag.
    pub fn try_accept_clients(&self, timeout_ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let mut accepted = false;
            for handler in &self.handlers {
                while handler.try_accept() {
                    accepted = true;
                }
            }
            if accepted {
                return;
            }

            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Default for PortHandlerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A single HTTP client connection with its own lifecycle.
struct Connection;

impl Connection {
    fn handle(stream: TcpStream, peer_addr: SocketAddr, dispatcher: Arc<RequestDispatcher>) {
        tracing::info!(%peer_addr, "client connected");

        if stream.set_nonblocking(false).is_err() {
            return;
        }
        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut reader = BufReader::new(reader_stream);
        let mut writer = stream;

        let reason = loop {
            let request = match HttpRequest::read_from(&mut reader) {
                Ok(Some(request)) => request,
                Ok(None) => break "connection closed by client",
                Err(GatewayError::Transport(_)) => break "read error",
                Err(e) => {
                    // Malformed request: answer 400 and drop the
                    // connection, the stream may be desynchronized.
                    tracing::warn!(%peer_addr, error = %e, "request parse error");
                    let _ = writer.write_all(&HttpResponse::bad_request().serialize());
                    break "parse error";
                }
            };

            tracing::debug!(%peer_addr, method = %request.method, url = %request.url, "request");
            let response = dispatcher.dispatch(&request);
            tracing::debug!(%peer_addr, status = response.status_code, "response");

            if writer.write_all(&response.serialize()).is_err() {
                break "write error";
            }
        };

        tracing::info!(%peer_addr, reason, "client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::protocol::message::Headers;

    struct Tagged(&'static str);

    impl Servlet for Tagged {
        fn handle(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse::ok().with_body(self.0.as_bytes().to_vec()))
        }
    }

    struct Failing;

    impl Servlet for Failing {
        fn handle(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            Err(GatewayError::Protocol("servlet blew up".into()))
        }
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            version: "1.0".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/", Arc::new(Tagged("root")));
        dispatcher.register("/hls", Arc::new(Tagged("hls")));

        assert_eq!(dispatcher.dispatch(&get("/hls/playlist.m3u")).body, b"hls");
        assert_eq!(dispatcher.dispatch(&get("/other")).body, b"root");
    }

    #[test]
    fn no_servlet_is_404() {
        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/hls", Arc::new(Tagged("hls")));
        assert_eq!(dispatcher.dispatch(&get("/elsewhere")).status_code, 404);

        let empty = RequestDispatcher::new();
        assert_eq!(empty.dispatch(&get("/x")).status_code, 404);
    }

    #[test]
    fn bad_url_is_400() {
        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/", Arc::new(Tagged("root")));
        assert_eq!(dispatcher.dispatch(&get("not-a-url")).status_code, 400);
    }

    #[test]
    fn servlet_failure_is_500() {
        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/", Arc::new(Failing));
        assert_eq!(dispatcher.dispatch(&get("/x")).status_code, 500);
    }

    #[test]
    fn absolute_urls_are_reduced_to_paths() {
        assert_eq!(
            extract_path("http://host:8080/playlist.m3u").unwrap(),
            "/playlist.m3u"
        );
        assert_eq!(extract_path("http://host").unwrap(), "/");
        assert_eq!(extract_path("/a/b/").unwrap(), "/a/b");
        assert_eq!(extract_path("/").unwrap(), "/");
        assert!(extract_path("garbage").is_err());
    }
}
