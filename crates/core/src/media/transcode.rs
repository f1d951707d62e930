//! JPEG → H.264 transcode stage.
//!
//! The codec work itself is an external collaborator behind the
//! [`H264Encoder`] trait (a deployment plugs in openh264, GStreamer,
//! ffmpeg, ...). This module owns what the pipeline needs around it:
//! feeding reconstructed JPEG frames in, stamping the resulting access
//! units with 90 kHz timestamps, and fanning them out to the segmenter.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::media::{H264Frame, JpegFrame};
use crate::pipeline::{Notifier, Sink};

/// H.264 clock rate in Hz (RFC 6184).
pub const H264_CLOCK_RATE: u32 = 90_000;

/// Contract for the JPEG → H.264 codec backend.
///
/// One `encode` call corresponds to one input picture; the backend may
/// buffer internally and emit zero or more access units per call, in
/// decoding order (B-frames are expected to be disabled, so decoding
/// order is presentation order). A failure is fatal to the pipeline.
pub trait H264Encoder: Send {
    fn encode(&mut self, jpeg: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Per-stream encoder parameters handed to backend constructors.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bit_rate: u32,
}

struct TranscodeState {
    encoder: Box<dyn H264Encoder>,
    /// Access units emitted so far; the next unit's timestamp index.
    emitted: u64,
}

/// Pipeline node converting [`JpegFrame`]s into timestamped
/// [`H264Frame`]s.
///
/// Timestamps are `pts = dts = index · 90000 / fps` from an instance
/// counter, so several pipelines can run in one process without
/// cross-talk.
pub struct MjpegToH264 {
    ticks_per_frame: i64,
    state: Mutex<TranscodeState>,
    output: Mutex<Notifier<H264Frame>>,
}

impl MjpegToH264 {
    pub fn new(fps: u32, encoder: Box<dyn H264Encoder>) -> Self {
        Self {
            ticks_per_frame: i64::from(H264_CLOCK_RATE / fps.max(1)),
            state: Mutex::new(TranscodeState {
                encoder,
                emitted: 0,
            }),
            output: Mutex::new(Notifier::new()),
        }
    }

    /// Register a consumer of the H.264 output.
    pub fn subscribe(&self, sink: Arc<dyn Sink<H264Frame>>) {
        self.output.lock().subscribe(sink);
    }
}

impl Sink<JpegFrame> for MjpegToH264 {
    fn receive(&self, frame: &JpegFrame) -> Result<()> {
        let (units, first_index) = {
            let mut state = self.state.lock();
            let units = state.encoder.encode(&frame.data)?;
            let first_index = state.emitted;
            state.emitted += units.len() as u64;
            (units, first_index)
        };
        let output = self.output.lock();
        for (i, data) in units.into_iter().enumerate() {
            let pts = (first_index as i64 + i as i64) * self.ticks_per_frame;
            output.broadcast(&H264Frame {
                data,
                pts,
                dts: pts,
            })?;
        }
        Ok(())
    }
}
