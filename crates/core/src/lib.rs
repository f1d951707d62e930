//! # hls-gateway — RTSP/MJPEG to HLS republishing
//!
//! A pull-based media gateway: it connects to an upstream RTSP/1.0
//! camera speaking RTP-over-UDP with an MJPEG payload, reassembles the
//! JPEG frames, transcodes them to H.264, packages fixed-duration
//! MPEG-2 TS segments, and serves them as an HLS endpoint any standard
//! player can consume.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Client session lifecycle, request/response framing |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | DESCRIBE body parsing, video geometry and track path |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Fixed-header parsing, marker/timestamp semantics |
//! | [RFC 2435](https://tools.ietf.org/html/rfc2435) | JPEG over RTP | Payload headers, JPEG header reconstruction |
//! | ISO/IEC 13818-1 | MPEG-2 TS | Segment container (PAT/PMT/PES) |
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │  Gateway      — orchestrator, accept poll loop │
//! ├────────────────────────────────────────────────┤
//! │  Rtsp         — client state machine, receiver │
//! │  Rtp          — RTP/MJPEG parsing, JPEG tables │
//! ├────────────────────────────────────────────────┤
//! │  Media        — transcode seam, TS segmenter   │
//! │  Hls          — sliding window, playlist       │
//! ├────────────────────────────────────────────────┤
//! │  Port / Http  — listeners, dispatch, framing   │
//! │  Pipeline     — typed Sink/Notifier fan-out    │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! Stages run synchronously on the RTP receiver thread; there is no
//! queue between them. The HLS window is the only structure shared with
//! other threads and sits behind a single mutex.
//!
//! ## Quick start
//!
//! ```no_run
//! use hls_gateway::gateway::{Gateway, GatewayConfig};
//! use hls_gateway::media::mpegts::MpegTsMuxer;
//! # use hls_gateway::error::Result;
//! # use hls_gateway::media::transcode::{H264Encoder, TranscodeConfig};
//! # fn my_encoder(_cfg: TranscodeConfig) -> Result<Box<dyn H264Encoder>> { unimplemented!() }
//!
//! # fn main() -> Result<()> {
//! let url = "rtsp://192.168.0.16:5544/jpeg".parse()?;
//! let gateway = Gateway::connect(
//!     url,
//!     GatewayConfig::default(),
//!     my_encoder,
//!     Box::new(MpegTsMuxer::new()),
//! )?;
//! // gateway.run(&shutdown_flag)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate layout
//!
//! - [`gateway`] — [`Gateway`](gateway::Gateway) orchestrator and
//!   [`GatewayConfig`](gateway::GatewayConfig).
//! - [`rtsp`] — RTSP client, stream URLs, session state machine.
//! - [`rtp`] — RTP parsing, MJPEG depacketizer, JPEG reconstruction.
//! - [`media`] — frame/segment types, transcode and muxer seams, the
//!   built-in TS muxer.
//! - [`hls`] — the HLS origin servlet.
//! - [`http`] / [`port`] — HTTP framing, servlets, port handling.
//! - [`protocol`] — shared wire framing and the SDP parser.
//! - [`pipeline`] — typed observer plumbing between stages.
//! - [`error`] — [`GatewayError`] and [`Result`] alias.

pub mod error;
pub mod gateway;
pub mod hls;
pub mod http;
pub mod media;
pub mod pipeline;
pub mod port;
pub mod protocol;
pub mod rtp;
pub mod rtsp;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayConfig};
pub use rtsp::{RtspClient, StreamUrl};
