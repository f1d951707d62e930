//! Fixed-duration MPEG-2 TS segmentation.
//!
//! Access units stream in; every `round(fps · segment_duration)` frames
//! the current container is closed (trailer), its bytes become one
//! [`TsSegment`], and a fresh container generation is opened (header) in
//! the same in-memory sink. Segment numbers start at 1 and increase by 1;
//! each segment records its actual duration `frames_per_chunk / fps`.
//!
//! Container byte layout is the [`TsMuxer`]'s business — the built-in
//! implementation lives in [`crate::media::mpegts`].

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::media::{H264Frame, TsSegment};
use crate::pipeline::{Notifier, Sink};

/// Contract for the MPEG-2 TS container writer.
///
/// The sink is a plain growable byte vector owned by the segmenter; every
/// method appends to it. `write_header` begins a new container generation
/// and must reset any per-segment muxer state. Any error is fatal to the
/// pipeline.
pub trait TsMuxer: Send {
    fn write_header(&mut self, out: &mut Vec<u8>) -> Result<()>;
    fn write_frame(&mut self, frame: &H264Frame, out: &mut Vec<u8>) -> Result<()>;
    fn write_trailer(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

struct SegmenterState {
    muxer: Box<dyn TsMuxer>,
    sink: Vec<u8>,
    frames_in_chunk: u32,
    next_sequence_number: u64,
    header_written: bool,
}

/// Pipeline node cutting the H.264 stream into TS segments.
pub struct TsSegmenter {
    frames_per_chunk: u32,
    segment_duration: f32,
    state: Mutex<SegmenterState>,
    output: Mutex<Notifier<TsSegment>>,
}

impl TsSegmenter {
    /// `fps` and `segment_duration` determine the cut cadence:
    /// `frames_per_chunk = round(fps · segment_duration)`, at least 1.
    pub fn new(fps: u32, segment_duration: f32, muxer: Box<dyn TsMuxer>) -> Self {
        let frames_per_chunk = ((fps as f32 * segment_duration).round() as u32).max(1);
        Self {
            frames_per_chunk,
            segment_duration: frames_per_chunk as f32 / fps.max(1) as f32,
            state: Mutex::new(SegmenterState {
                muxer,
                sink: Vec::new(),
                frames_in_chunk: 0,
                next_sequence_number: 1,
                header_written: false,
            }),
            output: Mutex::new(Notifier::new()),
        }
    }

    /// Register a consumer of finished segments.
    pub fn subscribe(&self, sink: Arc<dyn Sink<TsSegment>>) {
        self.output.lock().subscribe(sink);
    }

    /// Frames per emitted segment.
    pub fn frames_per_chunk(&self) -> u32 {
        self.frames_per_chunk
    }

    /// The duration each emitted segment advertises, in seconds.
    pub fn segment_duration(&self) -> f32 {
        self.segment_duration
    }
}

impl Sink<H264Frame> for TsSegmenter {
    fn receive(&self, frame: &H264Frame) -> Result<()> {
        let finished = {
            let mut state = self.state.lock();
            let state = &mut *state;

            if !state.header_written {
                state.muxer.write_header(&mut state.sink)?;
                state.header_written = true;
            }

            state.muxer.write_frame(frame, &mut state.sink)?;
            state.frames_in_chunk += 1;

            if state.frames_in_chunk < self.frames_per_chunk {
                None
            } else {
                state.muxer.write_trailer(&mut state.sink)?;

                let segment = TsSegment {
                    media_sequence_number: state.next_sequence_number,
                    duration: self.segment_duration,
                    data: std::mem::take(&mut state.sink),
                };
                state.next_sequence_number += 1;
                state.frames_in_chunk = 0;

                // Reopen immediately so the next generation's header is
                // in place before its first frame.
                state.muxer.write_header(&mut state.sink)?;

                tracing::debug!(
                    media_sequence_number = segment.media_sequence_number,
                    bytes = segment.data.len(),
                    "TS segment finished"
                );
                Some(segment)
            }
        };

        if let Some(segment) = finished {
            self.output.lock().broadcast(&segment)?;
        }
        Ok(())
    }
}
