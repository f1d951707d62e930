//! OpenH264-backed encoder for the JPEG → H.264 seam.
//!
//! Decodes each JPEG to RGB with `jpeg-decoder`, converts to I420 through
//! openh264's RGB source adapter, and encodes to Annex-B access units.
//! The encoder may withhold output while it builds its first GOP, so a
//! call can legitimately produce no access unit.

use std::io::Cursor;

use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate};
use openh264::formats::{RgbSliceU8, YUVBuffer};
use openh264::OpenH264API;

use hls_gateway::error::{GatewayError, Result};
use hls_gateway::media::transcode::{H264Encoder, TranscodeConfig};

pub struct OpenH264Encoder {
    encoder: Encoder,
}

impl OpenH264Encoder {
    pub fn new(config: TranscodeConfig) -> Result<Self> {
        let api = OpenH264API::from_source();
        let encoder_config = EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(config.fps as f32))
            .bitrate(BitRate::from_bps(config.bit_rate));

        let encoder = Encoder::with_api_config(api, encoder_config)
            .map_err(|e| GatewayError::Muxer(format!("openh264 encoder init failed: {e}")))?;

        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bit_rate = config.bit_rate,
            "OpenH264 encoder ready"
        );
        Ok(Self { encoder })
    }
}

impl H264Encoder for OpenH264Encoder {
    fn encode(&mut self, jpeg: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(jpeg));
        let pixels = decoder
            .decode()
            .map_err(|e| GatewayError::Muxer(format!("JPEG decode failed: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| GatewayError::Muxer("JPEG decoder yielded no info".to_string()))?;
        if info.pixel_format != jpeg_decoder::PixelFormat::RGB24 {
            return Err(GatewayError::Muxer(format!(
                "unsupported JPEG pixel format {:?}",
                info.pixel_format
            )));
        }

        let rgb = RgbSliceU8::new(&pixels, (info.width as usize, info.height as usize));
        let yuv = YUVBuffer::from_rgb_source(rgb);

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| GatewayError::Muxer(format!("H.264 encode failed: {e}")))?;

        let access_unit = bitstream.to_vec();
        if access_unit.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![access_unit])
        }
    }
}
