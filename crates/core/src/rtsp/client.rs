//! RTSP client session (RFC 2326) and its RTP media receiver.
//!
//! The session walks the classic client state machine over one TCP
//! control connection used strictly synchronously:
//!
//! ```text
//! Idle → Connected → OptionsOk → Described → SetUp → Playing → Closed
//! ```
//!
//! - **OPTIONS** verifies the server supports DESCRIBE, SETUP, PLAY and
//!   TEARDOWN (the `Public` header).
//! - **DESCRIBE** yields the SDP; the first video media block supplies
//!   the frame geometry (`cliprect`), the frame rate (`framerate`) and
//!   the track sub-path (`control`) appended to the stream URL.
//! - **SETUP** binds a local even UDP port and negotiates
//!   `RTP/AVP;unicast`; the response's `Session` header identifies the
//!   session from here on.
//! - **PLAY** starts the media receiver thread, which reassembles JPEG
//!   frames from RTP and fans them out to the pipeline.
//! - **TEARDOWN** is best-effort: failures are logged, never raised.
//!
//! CSeq numbering starts at 1 and increments before every request. The
//! receiver thread checks a stop flag on every iteration (the socket has
//! a short read timeout) so `Drop` can tear the session down promptly.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::{GatewayError, ParseErrorKind, Result};
use crate::media::JpegFrame;
use crate::pipeline::{Notifier, Sink};
use crate::protocol::message::{self, Headers};
use crate::protocol::sdp::SessionDescription;
use crate::rtp::mjpeg::MjpegDepacketizer;
use crate::rtp::RtpPacket;
use crate::rtsp::url::StreamUrl;

/// User agent advertised on every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "hls-gateway/0.1";

/// Methods the upstream server must advertise in `Public`.
const REQUIRED_METHODS: [&str; 4] = ["DESCRIBE", "SETUP", "PLAY", "TEARDOWN"];

/// Read timeout on the media socket, bounding stop-flag latency.
const MEDIA_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Client session state (RFC 2326 §A.1, client side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    OptionsOk,
    Described,
    SetUp,
    Playing,
    Closed,
}

/// Video stream parameters learned from the SDP.
#[derive(Debug, Clone, Copy)]
pub struct VideoParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// An RTSP response as read off the control socket.
#[derive(Debug)]
pub struct RtspResponse {
    pub code: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// RTSP client session. Owns the control socket, the media socket, and
/// (while playing) the receiver thread.
pub struct RtspClient {
    url: StreamUrl,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    media_socket: Option<UdpSocket>,
    cseq: u32,
    state: SessionState,
    session_id: Option<String>,
    video: Option<VideoParameters>,
    observers: Notifier<JpegFrame>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RtspClient {
    /// Resolve the URL's host to IPv4 and open the TCP control
    /// connection.
    pub fn connect(url: StreamUrl) -> Result<Self> {
        let addr = url.resolve()?;
        tracing::info!(%url, %addr, "connecting to RTSP server");
        let stream = TcpStream::connect(addr)?;
        let reader_stream = stream.try_clone()?;

        Ok(RtspClient {
            url,
            reader: BufReader::new(reader_stream),
            writer: stream,
            media_socket: None,
            cseq: 0,
            state: SessionState::Connected,
            session_id: None,
            video: None,
            observers: Notifier::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Register a consumer of reconstructed JPEG frames.
    ///
    /// Must happen before [`play`](Self::play) — the observer list moves
    /// into the receiver thread.
    pub fn subscribe(&mut self, sink: Arc<dyn Sink<JpegFrame>>) {
        self.observers.subscribe(sink);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Video parameters, available once DESCRIBE succeeded.
    pub fn video_parameters(&self) -> Option<VideoParameters> {
        self.video
    }

    /// OPTIONS: require `200 OK` and a `Public` header covering every
    /// method this client needs.
    pub fn options(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected, "OPTIONS")?;
        let response = self.request("OPTIONS", &[])?;

        let public = response
            .headers
            .get("Public")
            .ok_or_else(|| GatewayError::Protocol("server sent no Public header".to_string()))?;
        let advertised: Vec<&str> = public.split(',').map(str::trim).collect();
        for required in REQUIRED_METHODS {
            if !advertised.contains(&required) {
                return Err(GatewayError::Protocol(format!(
                    "server does not accept required {required} method"
                )));
            }
        }

        self.state = SessionState::OptionsOk;
        Ok(())
    }

    /// DESCRIBE: parse the SDP, capture the video geometry and frame
    /// rate, and extend the URL with the video track's control sub-path.
    pub fn describe(&mut self) -> Result<()> {
        self.expect_state(SessionState::OptionsOk, "DESCRIBE")?;
        let response = self.request("DESCRIBE", &[("Accept", "application/sdp")])?;

        let body = String::from_utf8_lossy(&response.body);
        let sdp = SessionDescription::parse(&body)?;
        let video = sdp
            .video()
            .ok_or_else(|| GatewayError::Protocol("SDP has no video media".to_string()))?;

        let (width, height) = video.clip_rect().ok_or_else(|| {
            GatewayError::Protocol("video media lacks a cliprect attribute".to_string())
        })?;
        let fps = video.framerate().ok_or_else(|| {
            GatewayError::Protocol("video media lacks a framerate attribute".to_string())
        })?;
        let fps = fps.round() as u32;
        if fps == 0 {
            return Err(GatewayError::Protocol("framerate is zero".to_string()));
        }

        if let Some(control) = video.control() {
            self.url = self.url.join(control);
        }

        tracing::info!(width, height, fps, url = %self.url, "stream described");
        self.video = Some(VideoParameters { width, height, fps });
        self.state = SessionState::Described;
        Ok(())
    }

    /// SETUP: bind a local even UDP port pair base and negotiate unicast
    /// RTP. Stores the session id from the response.
    pub fn setup(&mut self) -> Result<()> {
        self.expect_state(SessionState::Described, "SETUP")?;

        let socket = bind_even_udp()?;
        let rtp_port = socket.local_addr()?.port();
        let transport = format!(
            "RTP/AVP;unicast;client_port={}-{}",
            rtp_port,
            rtp_port + 1
        );

        let response = self.request("SETUP", &[("Transport", transport.as_str())])?;

        let echoed = response.headers.get("Transport").ok_or_else(|| {
            GatewayError::Protocol("SETUP response lacks a Transport header".to_string())
        })?;
        if !echoed.contains("RTP/AVP") {
            return Err(GatewayError::Protocol(format!(
                "server negotiated unsupported transport {echoed:?}"
            )));
        }

        let session = response.headers.get("Session").ok_or_else(|| {
            GatewayError::Protocol("SETUP response lacks a Session header".to_string())
        })?;
        let session_id = parse_session_id(session);

        tracing::info!(session_id, rtp_port, "session set up");
        self.session_id = Some(session_id);
        self.media_socket = Some(socket);
        self.state = SessionState::SetUp;
        Ok(())
    }

    /// PLAY: start media delivery and the receiver thread.
    pub fn play(&mut self) -> Result<()> {
        self.expect_state(SessionState::SetUp, "PLAY")?;
        let session = self.session_header()?;

        self.request("PLAY", &[("Range", "npt=0.000-"), ("Session", session.as_str())])?;

        let socket = self
            .media_socket
            .take()
            .ok_or_else(|| GatewayError::Protocol("no media socket after SETUP".to_string()))?;
        socket.set_read_timeout(Some(MEDIA_READ_TIMEOUT))?;

        let receiver = MediaReceiver {
            socket,
            depacketizer: MjpegDepacketizer::new(),
            observers: std::mem::take(&mut self.observers),
            stop: self.stop.clone(),
        };
        self.worker = Some(thread::spawn(move || receiver.run()));

        tracing::info!("playback started");
        self.state = SessionState::Playing;
        Ok(())
    }

    /// TEARDOWN: best-effort — failures are logged, not raised.
    pub fn teardown(&mut self) {
        if self.session_id.is_none() || self.state == SessionState::Closed {
            self.state = SessionState::Closed;
            return;
        }

        match self.session_header() {
            Ok(session) => match self.request("TEARDOWN", &[("Session", session.as_str())]) {
                Ok(_) => tracing::info!("session torn down"),
                Err(e) => tracing::warn!(error = %e, "TEARDOWN failed"),
            },
            Err(e) => tracing::warn!(error = %e, "TEARDOWN skipped"),
        }
        self.state = SessionState::Closed;
    }

    /// Whether the media receiver is still delivering frames.
    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
            && self
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished())
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GatewayError::Protocol(format!(
                "{operation} is invalid in state {:?}",
                self.state
            )))
        }
    }

    fn session_header(&self) -> Result<String> {
        self.session_id
            .clone()
            .ok_or_else(|| GatewayError::Protocol("no session id".to_string()))
    }

    /// Send one request and read its response, requiring `200 OK`.
    fn request(&mut self, method: &str, extra_headers: &[(&str, &str)]) -> Result<RtspResponse> {
        self.cseq += 1;

        let mut text = format!("{method} {} RTSP/1.0\r\n", self.url.as_request_target());
        text.push_str(&format!("CSeq: {}\r\n", self.cseq));
        text.push_str(&format!("User-Agent: {USER_AGENT}\r\n"));
        for (name, value) in extra_headers {
            text.push_str(&format!("{name}: {value}\r\n"));
        }
        text.push_str("\r\n");

        tracing::debug!(method, cseq = self.cseq, url = %self.url, "request");
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;

        let response = read_response(&mut self.reader)?;
        tracing::debug!(method, code = response.code, "response");

        if response.code != 200 {
            return Err(GatewayError::Protocol(format!(
                "{method} answered {} {}",
                response.code, response.reason
            )));
        }
        Ok(response)
    }
}

impl Drop for RtspClient {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::SetUp | SessionState::Playing) {
            // Let the server release its session before we stop reading.
            self.teardown();
        }
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Read one RTSP response off the control socket.
pub(crate) fn read_response<R: BufRead>(reader: &mut R) -> Result<RtspResponse> {
    let lines = message::read_head(reader)?.ok_or_else(|| {
        GatewayError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the control connection",
        ))
    })?;
    let status = lines
        .first()
        .ok_or_else(|| GatewayError::parse(ParseErrorKind::EmptyMessage))?;

    // Status-Line: RTSP/1.0 SP code SP reason
    let (proto, code, reason) = {
        let mut tokens = status.splitn(3, ' ');
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(proto), Some(code), reason) => (proto, code, reason.unwrap_or("")),
            _ => return Err(GatewayError::parse(ParseErrorKind::InvalidStartLine)),
        }
    };
    message::expect_protocol(proto, "RTSP")?;
    let code = code
        .parse()
        .map_err(|_| GatewayError::parse(ParseErrorKind::InvalidStartLine))?;

    let headers = message::parse_headers(&lines[1..])?;
    let body = message::read_body(reader, headers.content_length())?;

    Ok(RtspResponse {
        code,
        reason: reason.to_string(),
        headers,
        body,
    })
}

/// `Session` header value without its `;timeout=` suffix.
fn parse_session_id(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or(value)
        .trim()
        .to_string()
}

/// Bind a UDP socket on a random even port (RTP convention: RTP even,
/// RTCP = RTP + 1).
fn bind_even_udp() -> Result<UdpSocket> {
    let mut rng = rand::rng();
    for _ in 0..16 {
        let port: u16 = rng.random_range(10_000..60_000) & !1;
        if let Ok(socket) = UdpSocket::bind(("0.0.0.0", port)) {
            return Ok(socket);
        }
    }
    Err(GatewayError::Transport(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        "could not bind an even UDP port",
    )))
}

/// The per-session RTP receive loop.
///
/// Malformed packets are warnings (dropped, loop continues); a pipeline
/// failure ends the loop and with it the session's media flow.
struct MediaReceiver {
    socket: UdpSocket,
    depacketizer: MjpegDepacketizer,
    observers: Notifier<JpegFrame>,
    stop: Arc<AtomicBool>,
}

impl MediaReceiver {
    fn run(mut self) {
        let mut buf = vec![0u8; 65536];

        while !self.stop.load(Ordering::SeqCst) {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "media socket failed");
                    break;
                }
            };

            let packet = match RtpPacket::parse(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping RTP packet");
                    continue;
                }
            };

            match self.depacketizer.push(&packet) {
                Ok(Some(frame)) => {
                    if let Err(e) = self.observers.broadcast(&frame) {
                        tracing::error!(error = %e, "pipeline failure, stopping media flow");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, seq = packet.sequence_number, "dropping frame");
                }
            }
        }

        tracing::debug!("media receive loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader as IoBufReader;

    #[test]
    fn parses_response_with_body() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\n";
        let mut reader = IoBufReader::new(&raw[..]);
        let response = read_response(&mut reader).unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.headers.get("cseq"), Some("2"));
        assert_eq!(response.body, b"v=0\r\n");
    }

    #[test]
    fn parses_error_status_with_spaces_in_reason() {
        let raw = b"RTSP/1.0 454 Session Not Found\r\n\r\n";
        let mut reader = IoBufReader::new(&raw[..]);
        let response = read_response(&mut reader).unwrap();
        assert_eq!(response.code, 454);
        assert_eq!(response.reason, "Session Not Found");
    }

    #[test]
    fn rejects_http_tagged_response() {
        let raw = b"HTTP/1.0 200 OK\r\n\r\n";
        let mut reader = IoBufReader::new(&raw[..]);
        assert!(read_response(&mut reader).is_err());
    }

    #[test]
    fn session_id_strips_timeout_suffix() {
        assert_eq!(parse_session_id("12345678;timeout=60"), "12345678");
        assert_eq!(parse_session_id(" 42 "), "42");
    }

    #[test]
    fn even_udp_port() {
        let socket = bind_even_udp().unwrap();
        assert_eq!(socket.local_addr().unwrap().port() % 2, 0);
    }
}
