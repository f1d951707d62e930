//! Integration tests: RTSP handshake against a mock camera, the HLS
//! origin over real sockets, and the media pipeline end to end.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use hls_gateway::error::{GatewayError, Result};
use hls_gateway::hls::{HlsServlet, PLAYLIST_PATH};
use hls_gateway::media::segmenter::{TsMuxer, TsSegmenter};
use hls_gateway::media::transcode::{H264Encoder, MjpegToH264};
use hls_gateway::media::{H264Frame, TsSegment};
use hls_gateway::pipeline::Sink;
use hls_gateway::port::{PortHandler, PortHandlerManager, RequestDispatcher};
use hls_gateway::rtsp::{RtspClient, SessionState};
use hls_gateway::rtp::mjpeg::MjpegDepacketizer;
use hls_gateway::rtp::RtpPacket;

const CAMERA_SDP: &str = "v=0\r\n\
                          o=- 0 0 IN IP4 0.0.0.0\r\n\
                          s=Cam\r\n\
                          m=video 0 RTP/AVP 26\r\n\
                          a=control:trackID=1\r\n\
                          a=cliprect:0,0,960,1280\r\n\
                          a=framerate:10\r\n";

/// What the mock camera records about the conversation.
#[derive(Default)]
struct MockLog {
    cseqs: Vec<u32>,
    request_lines: Vec<String>,
}

/// Minimal RTSP camera: answers one client's handshake on a fixed
/// script. `send_public` toggles the `Public` header on OPTIONS.
fn spawn_mock_camera(send_public: bool) -> (SocketAddr, Arc<Mutex<MockLog>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock camera");
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(MockLog::default()));
    let log_for_thread = log.clone();

    thread::spawn(move || {
        let (stream, _) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(_) => return,
        };
        let mut reader = BufReader::new(stream.try_clone().expect("clone mock stream"));
        let mut writer = stream;

        loop {
            let mut head = Vec::new();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => return,
                    Ok(_) => {
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                        head.push(line.trim_end().to_string());
                    }
                    Err(_) => return,
                }
            }
            let request_line = head.first().cloned().unwrap_or_default();
            let method = request_line
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            let cseq: u32 = head
                .iter()
                .find(|l| l.to_ascii_lowercase().starts_with("cseq"))
                .and_then(|l| l.split(':').nth(1))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);

            {
                let mut log = log_for_thread.lock();
                log.cseqs.push(cseq);
                log.request_lines.push(request_line);
            }

            let response = match method.as_str() {
                "OPTIONS" if send_public => format!(
                    "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\
                     Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN\r\n\r\n"
                ),
                "OPTIONS" => format!("RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\r\n"),
                "DESCRIBE" => format!(
                    "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\
                     Content-Type: application/sdp\r\n\
                     Content-Length: {}\r\n\r\n{}",
                    CAMERA_SDP.len(),
                    CAMERA_SDP
                ),
                "SETUP" => format!(
                    "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\
                     Transport: RTP/AVP;unicast;client_port=5000-5001;server_port=6000-6001\r\n\
                     Session: 12345678;timeout=60\r\n\r\n"
                ),
                "PLAY" => format!(
                    "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\nSession: 12345678\r\n\r\n"
                ),
                "TEARDOWN" => format!("RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\n\r\n"),
                _ => format!("RTSP/1.0 501 Not Implemented\r\nCSeq: {cseq}\r\n\r\n"),
            };
            if writer.write_all(response.as_bytes()).is_err() {
                return;
            }
        }
    });

    (addr, log)
}

#[test]
fn full_handshake_against_mock_camera() {
    let (addr, log) = spawn_mock_camera(true);
    let url = format!("rtsp://127.0.0.1:{}/jpeg", addr.port())
        .parse()
        .unwrap();

    let mut client = RtspClient::connect(url).expect("connect");
    client.options().expect("OPTIONS");
    client.describe().expect("DESCRIBE");

    let video = client.video_parameters().expect("video parameters");
    assert_eq!(video.width, 1280);
    assert_eq!(video.height, 960);
    assert_eq!(video.fps, 10);

    client.setup().expect("SETUP");
    assert_eq!(client.session_id(), Some("12345678"));

    client.play().expect("PLAY");
    assert_eq!(client.state(), SessionState::Playing);
    assert!(client.is_playing());

    drop(client); // sends TEARDOWN, joins the receiver

    let log = log.lock();
    assert_eq!(
        log.cseqs,
        vec![1, 2, 3, 4, 5],
        "CSeq must increase strictly from 1"
    );

    // The SETUP request targets the video track sub-path from the SDP.
    let setup_line = log
        .request_lines
        .iter()
        .find(|l| l.starts_with("SETUP"))
        .expect("SETUP seen");
    assert!(
        setup_line.contains("/jpeg/trackID=1"),
        "control sub-path appended to the stream url: {setup_line}"
    );
    assert!(log
        .request_lines
        .iter()
        .any(|l| l.starts_with("TEARDOWN")));
}

#[test]
fn options_without_public_header_is_rejected() {
    let (addr, _log) = spawn_mock_camera(false);
    let url = format!("rtsp://127.0.0.1:{}/jpeg", addr.port())
        .parse()
        .unwrap();

    let mut client = RtspClient::connect(url).expect("connect");
    let err = client.options().unwrap_err();
    assert!(
        matches!(err, GatewayError::Protocol(_)),
        "missing Public header must fail session setup: {err}"
    );
}

/// Send one HTTP request and read the full response (headers + body).
fn http_request(addr: SocketAddr, request: &str) -> (u16, Vec<(String, String)>, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect to origin");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).expect("send request");

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).expect("status line");
    let code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|c| c.parse().ok())
        .expect("status code");

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("header line");
        if line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let content_length: usize = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).expect("body");
    }

    (code, headers, body)
}

/// Origin running on an OS-assigned port with a background accept loop.
struct TestOrigin {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_loop: Option<thread::JoinHandle<()>>,
}

impl TestOrigin {
    fn start(servlet: Arc<HlsServlet>) -> Self {
        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/", servlet);
        let handler = PortHandler::bind("127.0.0.1:0", dispatcher).expect("bind origin");
        let addr = handler.local_addr();
        let mut manager = PortHandlerManager::new();
        manager.register(handler);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_loop = stop.clone();
        let accept_loop = thread::spawn(move || {
            while !stop_for_loop.load(Ordering::SeqCst) {
                manager.try_accept_clients(100);
            }
        });

        Self {
            addr,
            stop,
            accept_loop: Some(accept_loop),
        }
    }

    fn get(&self, path: &str) -> (u16, Vec<(String, String)>, Vec<u8>) {
        http_request(self.addr, &format!("GET {path} HTTP/1.0\r\n\r\n"))
    }
}

impl Drop for TestOrigin {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_loop.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn hls_origin_serves_sliding_window_over_http() {
    let servlet = Arc::new(HlsServlet::new(3, 2.0));
    for msn in 1..=5u64 {
        servlet
            .receive(&TsSegment {
                media_sequence_number: msn,
                duration: 2.0,
                data: vec![msn as u8; 376],
            })
            .unwrap();
    }
    let origin = TestOrigin::start(servlet);

    let (code, headers, body) = origin.get(PLAYLIST_PATH);
    assert_eq!(code, 200);
    let body_text = String::from_utf8(body.clone()).unwrap();
    assert!(body_text.contains("#EXT-X-MEDIA-SEQUENCE:3\n"));
    assert_eq!(body_text.matches("#EXTINF:").count(), 3);
    for k in 3..=5 {
        assert!(body_text.contains(&format!("/chunk{k}.ts\n")));
    }
    let content_length: usize = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse().unwrap())
        .expect("playlist Content-Length");
    assert_eq!(content_length, body.len());

    let (code, _, body) = origin.get("/chunk3.ts");
    assert_eq!(code, 200);
    assert_eq!(body, vec![3u8; 376]);

    let (code, _, body) = origin.get("/chunk2.ts");
    assert_eq!(code, 200, "one generation back is still cached");
    assert_eq!(body, vec![2u8; 376]);

    assert_eq!(origin.get("/chunk1.ts").0, 404);
    assert_eq!(origin.get("/chunk6.ts").0, 404);
}

#[test]
fn hls_origin_gates_methods_and_paths() {
    let origin = TestOrigin::start(Arc::new(HlsServlet::new(3, 2.0)));

    let (code, _, _) = http_request(
        origin.addr,
        &format!("POST {PLAYLIST_PATH} HTTP/1.0\r\n\r\n"),
    );
    assert_eq!(code, 501);

    assert_eq!(origin.get("/foo").0, 404);
}

#[test]
fn origin_serves_concurrent_readers_against_live_writer() {
    let servlet = Arc::new(HlsServlet::new(3, 2.0));
    let origin = TestOrigin::start(servlet.clone());

    let writer = {
        let servlet = servlet.clone();
        thread::spawn(move || {
            for msn in 1..=50u64 {
                servlet
                    .receive(&TsSegment {
                        media_sequence_number: msn,
                        duration: 2.0,
                        data: vec![msn as u8; 188],
                    })
                    .unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    // Readers poll the playlist while the window slides underneath.
    for _ in 0..20 {
        let (code, headers, body) = origin.get(PLAYLIST_PATH);
        assert_eq!(code, 200);
        let content_length: usize = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert_eq!(content_length, body.len(), "no torn playlist reads");
        assert_eq!(
            String::from_utf8(body).unwrap().matches("#EXTINF:").count(),
            3
        );
    }

    writer.join().unwrap();
}

// ---------------------------------------------------------------------
// Pipeline end to end with codec test doubles.

/// Encoder double: one access unit per JPEG, passthrough bytes.
struct PassthroughEncoder;

impl H264Encoder for PassthroughEncoder {
    fn encode(&mut self, jpeg: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(vec![jpeg.to_vec()])
    }
}

/// Muxer double: byte markers for container events.
struct MarkerMuxer;

impl TsMuxer for MarkerMuxer {
    fn write_header(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.push(b'H');
        Ok(())
    }

    fn write_frame(&mut self, _frame: &H264Frame, out: &mut Vec<u8>) -> Result<()> {
        out.push(b'f');
        Ok(())
    }

    fn write_trailer(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.push(b'T');
        Ok(())
    }
}

fn mjpeg_fragment(offset: u32, scan: &[u8]) -> Vec<u8> {
    let mut payload = vec![
        0,
        (offset >> 16) as u8,
        (offset >> 8) as u8,
        offset as u8,
        1,   // type
        50,  // Q
        160, // width/8
        120, // height/8
    ];
    payload.extend_from_slice(scan);
    payload
}

fn rtp_packet(marker: bool, seq: u16, ts: u32, payload: Vec<u8>) -> RtpPacket {
    RtpPacket {
        version: 2,
        padding: false,
        extension: false,
        csrc_count: 0,
        marker,
        payload_type: 26,
        sequence_number: seq,
        timestamp: ts,
        ssrc: 7,
        csrcs: Vec::new(),
        payload,
    }
}

#[test]
fn rtp_to_hls_window_end_to_end() {
    // fps 10, 0.5 s segments ⇒ 5 frames per segment.
    let servlet = Arc::new(HlsServlet::new(3, 0.5));
    let segmenter = Arc::new(TsSegmenter::new(10, 0.5, Box::new(MarkerMuxer)));
    segmenter.subscribe(servlet.clone());
    let transcoder = Arc::new(MjpegToH264::new(10, Box::new(PassthroughEncoder)));
    transcoder.subscribe(segmenter);

    let mut depacketizer = MjpegDepacketizer::new();
    let mut seq = 0u16;
    for frame_index in 0..12u32 {
        let ts = frame_index * 9000;
        // Each frame arrives as two fragments.
        let first = depacketizer
            .push(&rtp_packet(false, seq, ts, mjpeg_fragment(0, &[0xA0; 40])))
            .unwrap();
        assert!(first.is_none());
        seq = seq.wrapping_add(1);

        let done = depacketizer
            .push(&rtp_packet(true, seq, ts, mjpeg_fragment(40, &[0xB0; 24])))
            .unwrap()
            .expect("marker completes the frame");
        seq = seq.wrapping_add(1);

        transcoder.receive(&done).unwrap();
    }

    // 12 frames at 5 per segment ⇒ segments 1 and 2 emitted.
    let (code, _, body) = {
        let origin = TestOrigin::start(servlet);
        let out = origin.get(PLAYLIST_PATH);
        assert_eq!(origin.get("/chunk2.ts").0, 200);
        assert_eq!(origin.get("/chunk3.ts").0, 404, "third segment not cut yet");
        out
    };
    assert_eq!(code, 200);
    let playlist = String::from_utf8(body).unwrap();
    assert!(playlist.contains("/chunk1.ts\n"));
    assert!(playlist.contains("/chunk2.ts\n"));

    // Each emitted segment wraps exactly five frames.
    // (Segment layout proven in the segmenter unit tests; here we assert
    // the window contents made it through the chain.)
}
