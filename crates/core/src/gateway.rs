//! Gateway orchestrator: owns the RTSP session, the media pipeline, and
//! the HTTP origin, and drives the accept poll loop.
//!
//! Construction order mirrors the dataflow in reverse — the HLS servlet
//! exists first, then the segmenter that feeds it, then the transcoder,
//! and finally the RTSP client is subscribed and told to PLAY:
//!
//! ```text
//! RtspClient → MjpegToH264 → TsSegmenter → HlsServlet ← PortHandler
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::hls::{HlsServlet, DEFAULT_CHUNK_COUNT};
use crate::media::segmenter::{TsMuxer, TsSegmenter};
use crate::media::transcode::{H264Encoder, MjpegToH264, TranscodeConfig};
use crate::port::{PortHandler, PortHandlerManager, RequestDispatcher};
use crate::rtsp::{RtspClient, StreamUrl, VideoParameters};

/// Gateway-level configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// TCP port the HLS origin listens on.
    pub hls_port: u16,
    /// Live-window length N of the HLS origin.
    pub chunk_count: usize,
    /// Target duration of one TS segment in seconds.
    pub segment_duration: f32,
    /// H.264 encoder target bitrate in bits per second.
    pub bit_rate: u32,
    /// Upper bound of one accept poll iteration in milliseconds; also
    /// the worst-case shutdown latency.
    pub accept_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            hls_port: 8080,
            chunk_count: DEFAULT_CHUNK_COUNT,
            segment_duration: 10.0,
            bit_rate: 2_000_000,
            accept_timeout_ms: 2000,
        }
    }
}

/// The assembled media gateway.
pub struct Gateway {
    client: RtspClient,
    manager: PortHandlerManager,
    video: VideoParameters,
    config: GatewayConfig,
}

impl Gateway {
    /// Perform the full RTSP handshake, wire the pipeline, open the HLS
    /// port, and start playback.
    ///
    /// The encoder is built by `make_encoder` once the stream geometry is
    /// known from DESCRIBE.
    pub fn connect<E>(
        url: StreamUrl,
        config: GatewayConfig,
        make_encoder: E,
        muxer: Box<dyn TsMuxer>,
    ) -> Result<Self>
    where
        E: FnOnce(TranscodeConfig) -> Result<Box<dyn H264Encoder>>,
    {
        let mut client = RtspClient::connect(url)?;
        client.options()?;
        client.describe()?;
        client.setup()?;

        let video = client
            .video_parameters()
            .ok_or_else(|| GatewayError::Protocol("DESCRIBE yielded no video".to_string()))?;

        let encoder = make_encoder(TranscodeConfig {
            width: video.width,
            height: video.height,
            fps: video.fps,
            bit_rate: config.bit_rate,
        })?;

        let servlet = Arc::new(HlsServlet::new(config.chunk_count, config.segment_duration));
        let segmenter = Arc::new(TsSegmenter::new(video.fps, config.segment_duration, muxer));
        segmenter.subscribe(servlet.clone());
        let transcoder = Arc::new(MjpegToH264::new(video.fps, encoder));
        transcoder.subscribe(segmenter);
        client.subscribe(transcoder);

        let mut dispatcher = RequestDispatcher::new();
        dispatcher.register("/", servlet);
        let handler = PortHandler::bind(&format!("0.0.0.0:{}", config.hls_port), dispatcher)?;
        let mut manager = PortHandlerManager::new();
        manager.register(handler);

        client.play()?;

        tracing::info!(
            hls_port = config.hls_port,
            chunk_count = config.chunk_count,
            segment_duration = config.segment_duration,
            "gateway running"
        );

        Ok(Gateway {
            client,
            manager,
            video,
            config,
        })
    }

    pub fn video_parameters(&self) -> VideoParameters {
        self.video
    }

    /// Serve HLS clients until `shutdown` is set.
    ///
    /// Returns `Ok(())` on a requested shutdown. If the media pipeline
    /// stops on its own (muxer failure, dead socket) the loop ends with
    /// an error — restarting is the operator's call.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            self.manager.try_accept_clients(self.config.accept_timeout_ms);

            if !self.client.is_playing() {
                return Err(GatewayError::Muxer(
                    "media pipeline stopped unexpectedly".to_string(),
                ));
            }
        }
        tracing::info!("shutdown requested");
        Ok(())
    }

    /// Tear the RTSP session down explicitly (also happens on drop).
    pub fn close(&mut self) {
        self.client.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.hls_port, 8080);
        assert_eq!(config.chunk_count, 3);
        assert_eq!(config.accept_timeout_ms, 2000);
        assert!(config.bit_rate >= 1_000_000, "bitrate default must be realistic");
    }
}
