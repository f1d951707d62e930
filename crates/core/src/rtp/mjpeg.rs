//! MJPEG payload parsing and frame depacketizing (RFC 2435).
//!
//! The RTP payload of a JPEG stream starts with an 8-byte main header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Type-specific |              Fragment Offset                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Type     |       Q       |     Width     |     Height    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! followed by a 4-byte restart-marker header when `64 ≤ type < 128`
//! (§3.1.7) and a quantization-table header when `Q ≥ 128` (§3.1.8).
//! Width and height are carried in 8-pixel units.
//!
//! The [`MjpegDepacketizer`] collects fragments until the RTP marker bit,
//! orders them by fragment offset, and emits one complete JPEG per frame
//! with reconstructed headers from [`super::jpeg`].

use crate::error::{GatewayError, Result};
use crate::media::JpegFrame;
use crate::rtp::jpeg::{self, QUANT_TABLE_SIZE};
use crate::rtp::RtpPacket;

/// A parsed MJPEG payload (borrows the RTP payload bytes).
#[derive(Debug)]
pub struct MjpegPacket<'a> {
    pub type_specific: u8,
    /// 24-bit byte offset of this fragment within the frame's scan data.
    pub fragment_offset: u32,
    /// JPEG type: 0 → 4:2:2 sampling, 1 → 4:2:0; 64..128 adds restart
    /// markers.
    pub jpeg_type: u8,
    /// Q factor; ≥ 128 means the quantization tables are carried inline.
    pub q: u8,
    /// Frame width in 8-pixel units.
    pub width_blocks: u8,
    /// Frame height in 8-pixel units.
    pub height_blocks: u8,
    /// Restart interval from the restart-marker header, when present.
    pub restart_interval: Option<u16>,
    /// Inline quantization table data, when `Q ≥ 128`.
    pub quantization_data: Option<&'a [u8]>,
    /// Scan-data fragment.
    pub payload: &'a [u8],
}

impl<'a> MjpegPacket<'a> {
    /// Parse an RTP payload as an MJPEG packet.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(GatewayError::MediaFormat(format!(
                "MJPEG payload too short: {} bytes",
                data.len()
            )));
        }

        let type_specific = data[0];
        let fragment_offset =
            (u32::from(data[1]) << 16) | (u32::from(data[2]) << 8) | u32::from(data[3]);
        let jpeg_type = data[4];
        let q = data[5];
        let width_blocks = data[6];
        let height_blocks = data[7];

        let mut offset = 8;

        let restart_interval = if (64..128).contains(&jpeg_type) {
            if data.len() < offset + 4 {
                return Err(GatewayError::MediaFormat(
                    "MJPEG payload shorter than its restart-marker header".to_string(),
                ));
            }
            let interval = u16::from_be_bytes([data[offset], data[offset + 1]]);
            offset += 4;
            Some(interval)
        } else {
            None
        };

        // The quantization-table header travels only in the fragment
        // that opens the frame (RFC 2435 §3.1.8).
        let quantization_data = if q >= 128 && fragment_offset == 0 {
            if data.len() < offset + 4 {
                return Err(GatewayError::MediaFormat(
                    "MJPEG payload shorter than its quantization-table header".to_string(),
                ));
            }
            let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4;
            if data.len() < offset + length {
                return Err(GatewayError::MediaFormat(format!(
                    "quantization-table header claims {length} bytes beyond the payload",
                )));
            }
            let table = &data[offset..offset + length];
            offset += length;
            Some(table)
        } else {
            None
        };

        Ok(MjpegPacket {
            type_specific,
            fragment_offset,
            jpeg_type,
            q,
            width_blocks,
            height_blocks,
            restart_interval,
            quantization_data,
            payload: &data[offset..],
        })
    }
}

/// Frame-level parameters captured from the fragment at offset 0.
struct FrameParams {
    jpeg_type: u8,
    width_blocks: u8,
    height_blocks: u8,
    restart_interval: u16,
    luma_qt: [u8; QUANT_TABLE_SIZE],
    chroma_qt: [u8; QUANT_TABLE_SIZE],
}

/// Reassembles JPEG frames from MJPEG fragments.
///
/// Fragments accumulate in arrival order; the RTP marker bit terminates
/// the frame. At that point fragments are ordered by their declared
/// fragment offset (which repairs out-of-order UDP delivery within the
/// frame) and must be contiguous from offset 0 — a frame with a gap is
/// dropped as [`GatewayError::MediaFormat`]. There is no buffering across
/// frame boundaries.
pub struct MjpegDepacketizer {
    fragments: Vec<(u32, Vec<u8>)>,
    params: Option<FrameParams>,
}

impl MjpegDepacketizer {
    pub fn new() -> Self {
        Self {
            fragments: Vec::new(),
            params: None,
        }
    }

    /// Feed one RTP packet; returns a complete frame on the marker bit.
    ///
    /// On any error the partial frame is discarded and the depacketizer is
    /// ready for the next frame — per-packet errors never poison the
    /// stream.
    pub fn push(&mut self, packet: &RtpPacket) -> Result<Option<JpegFrame>> {
        match self.accumulate(packet) {
            Ok(done) => {
                if !done {
                    return Ok(None);
                }
                let result = self.assemble();
                self.reset();
                result.map(Some)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn accumulate(&mut self, packet: &RtpPacket) -> Result<bool> {
        let mjpeg = MjpegPacket::parse(&packet.payload)?;

        if mjpeg.fragment_offset == 0 {
            self.params = Some(Self::frame_params(&mjpeg)?);
        }

        self.fragments
            .push((mjpeg.fragment_offset, mjpeg.payload.to_vec()));

        Ok(packet.marker)
    }

    fn frame_params(mjpeg: &MjpegPacket<'_>) -> Result<FrameParams> {
        let (luma_qt, chroma_qt) = match mjpeg.quantization_data {
            Some(data) => {
                if data.len() < 2 * QUANT_TABLE_SIZE {
                    return Err(GatewayError::MediaFormat(format!(
                        "inline quantization data too short: {} bytes",
                        data.len()
                    )));
                }
                let mut luma = [0u8; QUANT_TABLE_SIZE];
                let mut chroma = [0u8; QUANT_TABLE_SIZE];
                luma.copy_from_slice(&data[..QUANT_TABLE_SIZE]);
                chroma.copy_from_slice(&data[QUANT_TABLE_SIZE..2 * QUANT_TABLE_SIZE]);
                (luma, chroma)
            }
            None => jpeg::scaled_quantizers(mjpeg.q),
        };

        Ok(FrameParams {
            jpeg_type: mjpeg.jpeg_type & 0x3F,
            width_blocks: mjpeg.width_blocks,
            height_blocks: mjpeg.height_blocks,
            restart_interval: mjpeg.restart_interval.unwrap_or(0),
            luma_qt,
            chroma_qt,
        })
    }

    fn assemble(&mut self) -> Result<JpegFrame> {
        let params = self.params.as_ref().ok_or_else(|| {
            GatewayError::MediaFormat("frame is missing its first fragment".to_string())
        })?;

        self.fragments.sort_by_key(|(offset, _)| *offset);

        let mut expected = 0u32;
        for (offset, fragment) in &self.fragments {
            if *offset != expected {
                return Err(GatewayError::MediaFormat(format!(
                    "fragment gap: expected offset {expected}, got {offset}"
                )));
            }
            expected += fragment.len() as u32;
        }

        let mut data = jpeg::build_headers(
            params.jpeg_type,
            params.width_blocks,
            params.height_blocks,
            &params.luma_qt,
            &params.chroma_qt,
            params.restart_interval,
        );
        for (_, fragment) in &self.fragments {
            data.extend_from_slice(fragment);
        }

        Ok(JpegFrame { data })
    }

    fn reset(&mut self) {
        self.fragments.clear();
        self.params = None;
    }
}

impl Default for MjpegDepacketizer {
    fn default() -> Self {
        Self::new()
    }
}
