//! HLS origin: sliding segment window, playlist, chunk serving.
//!
//! The servlet owns two parallel rings of `chunk_count` segments under a
//! single mutex:
//!
//! - `live` — the most recent segments, listed in the playlist;
//! - `cache` — evicted segments kept so a player that just fetched the
//!   playlist can still pull the chunk that slid out one generation ago.
//!
//! `receive` shifts both rings in place; readers take the same mutex, so
//! a playlist or chunk read never observes a half-shifted window. Bodies
//! are copied out of the critical section before the socket write.
//!
//! HTTP surface:
//!
//! ```text
//! GET /playlist.m3u   → 200, the media playlist
//! GET /chunk<K>.ts    → 200 with the segment bytes, 404 outside the window
//! GET anything else   → 404
//! non-GET             → 501
//! ```

use parking_lot::Mutex;

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::media::TsSegment;
use crate::pipeline::Sink;
use crate::port::Servlet;

/// URL path of the media playlist.
pub const PLAYLIST_PATH: &str = "/playlist.m3u";

/// Number of live segments kept when not configured otherwise.
pub const DEFAULT_CHUNK_COUNT: usize = 3;

struct Window {
    live: Vec<TsSegment>,
    cache: Vec<TsSegment>,
}

/// The HLS origin servlet; also the terminal sink of the media pipeline.
pub struct HlsServlet {
    target_duration: f32,
    window: Mutex<Window>,
}

impl HlsServlet {
    /// `chunk_count` is the live-window length N; `segment_duration` in
    /// seconds feeds `#EXT-X-TARGETDURATION`.
    pub fn new(chunk_count: usize, segment_duration: f32) -> Self {
        let chunk_count = chunk_count.max(1);
        Self {
            target_duration: segment_duration,
            window: Mutex::new(Window {
                live: vec![TsSegment::default(); chunk_count],
                cache: vec![TsSegment::default(); chunk_count],
            }),
        }
    }

    fn playlist(&self) -> Vec<u8> {
        let window = self.window.lock();

        let mut body = format!(
            "#EXTM3U\n\
             #EXT-X-VERSION:3\n\
             #EXT-X-TARGETDURATION:{}\n\
             #EXT-X-MEDIA-SEQUENCE:{}\n",
            self.target_duration.ceil() as u64,
            window.live[0].media_sequence_number,
        );
        for chunk in &window.live {
            body.push_str(&format!(
                "#EXTINF:{},\n/chunk{}.ts\n",
                chunk.duration, chunk.media_sequence_number
            ));
        }
        body.into_bytes()
    }

    /// Segment bytes for media sequence number `k`, if inside the served
    /// window.
    ///
    /// Served numbers span the live window plus exactly one generation
    /// back: `live[0] − 1 ≤ k ≤ live[N−1]`. Lookups below the live floor
    /// go to the cache ring. Linear scans — N is small.
    fn chunk(&self, k: u64) -> Option<Vec<u8>> {
        let window = self.window.lock();
        let newest = window.live[window.live.len() - 1].media_sequence_number;
        let oldest_live = window.live[0].media_sequence_number;

        if k > newest || k + 1 < oldest_live {
            return None;
        }

        let ring = if k >= oldest_live {
            &window.live
        } else {
            &window.cache
        };
        ring.iter()
            .find(|chunk| chunk.media_sequence_number == k)
            .map(|chunk| chunk.data.clone())
    }

    fn handle_get(&self, request: &HttpRequest) -> HttpResponse {
        if request.url == PLAYLIST_PATH {
            let body = self.playlist();
            return HttpResponse::ok()
                .add_header("Content-Length", &body.len().to_string())
                .with_body(body);
        }

        if let Some(k) = chunk_number(&request.url) {
            return match self.chunk(k) {
                Some(body) => HttpResponse::ok()
                    .add_header("Content-Length", &body.len().to_string())
                    .with_body(body),
                None => HttpResponse::not_found(),
            };
        }

        HttpResponse::not_found()
    }
}

impl Servlet for HlsServlet {
    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse> {
        match request.method {
            Method::Get => Ok(self.handle_get(request)),
            _ => Ok(HttpResponse::not_implemented()),
        }
    }
}

impl Sink<TsSegment> for HlsServlet {
    fn receive(&self, segment: &TsSegment) -> Result<()> {
        let mut window = self.window.lock();
        let n = window.live.len();

        // In-place double shift: the oldest live segment moves to the
        // cache ring, the new segment enters at the tail.
        window.cache.rotate_left(1);
        window.live.rotate_left(1);
        let evicted = std::mem::replace(&mut window.live[n - 1], segment.clone());
        window.cache[n - 1] = evicted;

        tracing::debug!(
            media_sequence_number = segment.media_sequence_number,
            bytes = segment.data.len(),
            "segment entered the HLS window"
        );
        Ok(())
    }
}

/// Match `/chunk<K>.ts` and extract `K`.
fn chunk_number(url: &str) -> Option<u64> {
    let digits = url.strip_prefix("/chunk")?.strip_suffix(".ts")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Headers;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            version: "1.0".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    fn segment(msn: u64) -> TsSegment {
        TsSegment {
            media_sequence_number: msn,
            duration: 2.0,
            data: vec![msn as u8; 188],
        }
    }

    fn servlet_with_segments(n: usize, count: u64) -> HlsServlet {
        let servlet = HlsServlet::new(n, 2.0);
        for msn in 1..=count {
            servlet.receive(&segment(msn)).unwrap();
        }
        servlet
    }

    #[test]
    fn playlist_reflects_live_window() {
        let servlet = servlet_with_segments(3, 5);
        let response = servlet.handle(&get(PLAYLIST_PATH)).unwrap();
        assert_eq!(response.status_code, 200);

        let body = String::from_utf8(response.body.clone()).unwrap();
        assert!(body.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(body.contains("#EXT-X-TARGETDURATION:2\n"));
        assert!(body.contains("#EXT-X-MEDIA-SEQUENCE:3\n"));
        assert_eq!(body.matches("#EXTINF:").count(), 3);
        assert!(body.contains("/chunk3.ts\n"));
        assert!(body.contains("/chunk4.ts\n"));
        assert!(body.contains("/chunk5.ts\n"));

        let content_length: usize = response
            .headers
            .get("Content-Length")
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(content_length, response.body.len());
    }

    #[test]
    fn window_slides_one_generation_back() {
        let servlet = servlet_with_segments(3, 5);

        // Live window 3..5 plus one older generation.
        assert_eq!(servlet.handle(&get("/chunk5.ts")).unwrap().status_code, 200);
        assert_eq!(servlet.handle(&get("/chunk3.ts")).unwrap().status_code, 200);
        assert_eq!(servlet.handle(&get("/chunk2.ts")).unwrap().status_code, 200);
        assert_eq!(servlet.handle(&get("/chunk1.ts")).unwrap().status_code, 404);
        assert_eq!(servlet.handle(&get("/chunk6.ts")).unwrap().status_code, 404);
    }

    #[test]
    fn chunk_body_matches_segment_bytes() {
        let servlet = servlet_with_segments(3, 4);
        let response = servlet.handle(&get("/chunk4.ts")).unwrap();
        assert_eq!(response.body, vec![4u8; 188]);
        assert_eq!(
            response.headers.get("content-length"),
            Some("188"),
            "Content-Length must equal the body byte length"
        );
    }

    #[test]
    fn every_live_chunk_is_served() {
        let servlet = servlet_with_segments(3, 7);
        for k in 5..=7 {
            let response = servlet.handle(&get(&format!("/chunk{k}.ts"))).unwrap();
            assert_eq!(response.status_code, 200, "chunk {k} must be live");
            let content_length: usize = response
                .headers
                .get("Content-Length")
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(content_length, response.body.len());
        }
    }

    #[test]
    fn non_get_is_not_implemented() {
        let servlet = servlet_with_segments(3, 3);
        let mut request = get(PLAYLIST_PATH);
        request.method = Method::Post;
        assert_eq!(servlet.handle(&request).unwrap().status_code, 501);
    }

    #[test]
    fn unknown_path_is_not_found() {
        let servlet = servlet_with_segments(3, 3);
        assert_eq!(servlet.handle(&get("/foo")).unwrap().status_code, 404);
    }

    #[test]
    fn chunk_url_matcher() {
        assert_eq!(chunk_number("/chunk12.ts"), Some(12));
        assert_eq!(chunk_number("/chunk0.ts"), Some(0));
        assert_eq!(chunk_number("/chunk.ts"), None);
        assert_eq!(chunk_number("/chunkAB.ts"), None);
        assert_eq!(chunk_number("/chunk1.ts.ts"), None);
        assert_eq!(chunk_number("/playlist.m3u"), None);
    }

    #[test]
    fn fresh_window_serves_placeholders() {
        // Before any segment arrives the playlist references generation
        // zero; players retry until real segments slide in.
        let servlet = HlsServlet::new(3, 2.0);
        let response = servlet.handle(&get(PLAYLIST_PATH)).unwrap();
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("#EXT-X-MEDIA-SEQUENCE:0\n"));
        assert_eq!(body.matches("/chunk0.ts").count(), 3);
    }
}
