use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use hls_gateway::gateway::{Gateway, GatewayConfig};
use hls_gateway::media::mpegts::MpegTsMuxer;
use hls_gateway::media::transcode::H264Encoder;
use hls_gateway::rtsp::StreamUrl;

mod codec;

#[derive(Parser)]
#[command(
    name = "media-gateway",
    about = "Republish an RTSP/MJPEG camera as an HLS endpoint"
)]
struct Args {
    /// Upstream stream url, e.g. rtsp://192.168.0.16:5544/jpeg
    stream_url: String,

    /// TCP port of the HLS origin
    #[arg(long, default_value_t = 8080)]
    hls_port: u16,

    /// Number of live segments in the HLS window
    #[arg(long, default_value_t = 3)]
    chunks: usize,

    /// Target duration of one segment in seconds
    #[arg(long, default_value_t = 10.0)]
    segment_duration: f32,

    /// H.264 encoder bitrate in bits per second
    #[arg(long, default_value_t = 2_000_000)]
    bitrate: u32,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .expect("install SIGINT/SIGTERM handler");
    }

    if let Err(e) = run(args, &shutdown) {
        tracing::error!(error = %e, "gateway failed");
        std::process::exit(1);
    }
}

fn run(args: Args, shutdown: &AtomicBool) -> hls_gateway::Result<()> {
    let url: StreamUrl = args.stream_url.parse()?;

    let config = GatewayConfig {
        hls_port: args.hls_port,
        chunk_count: args.chunks,
        segment_duration: args.segment_duration,
        bit_rate: args.bitrate,
        ..GatewayConfig::default()
    };

    let gateway = Gateway::connect(
        url,
        config,
        |transcode| {
            let encoder = codec::OpenH264Encoder::new(transcode)?;
            Ok(Box::new(encoder) as Box<dyn H264Encoder>)
        },
        Box::new(MpegTsMuxer::new()),
    )?;

    gateway.run(shutdown)
}
