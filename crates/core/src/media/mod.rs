//! Media value types flowing through the pipeline, and the transform
//! stages that produce them.
//!
//! Each stage has its own strongly typed output — [`JpegFrame`],
//! [`H264Frame`], [`TsSegment`] — delivered through a typed
//! [`Notifier`](crate::pipeline::Notifier) rather than an untyped byte
//! span, so stages can be tested and rewired independently.

pub mod mpegts;
pub mod segmenter;
pub mod transcode;

/// One complete JPEG image as reconstructed by the depacketizer.
///
/// The byte stream starts with SOI (`FF D8`) and is parseable by any
/// baseline JPEG decoder.
#[derive(Debug, Clone)]
pub struct JpegFrame {
    pub data: Vec<u8>,
}

/// One H.264 access unit with its presentation/decoding timestamps in
/// 90 kHz units.
#[derive(Debug, Clone)]
pub struct H264Frame {
    pub data: Vec<u8>,
    pub pts: i64,
    pub dts: i64,
}

/// One finished MPEG-2 TS segment of the HLS window.
#[derive(Debug, Clone, Default)]
pub struct TsSegment {
    /// Monotonically increasing segment number (`#EXT-X-MEDIA-SEQUENCE`).
    pub media_sequence_number: u64,
    /// Actual segment duration in seconds.
    pub duration: f32,
    pub data: Vec<u8>,
}
