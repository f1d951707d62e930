//! RTP packet parsing (RFC 3550) and the MJPEG payload format (RFC 2435).
//!
//! - [`RtpPacket`] — fixed-header parsing for datagrams read off the media
//!   socket.
//! - [`mjpeg`] — MJPEG payload headers and the frame depacketizer.
//! - [`jpeg`] — JPEG header reconstruction tables shared by the
//!   depacketizer.

pub mod jpeg;
pub mod mjpeg;

use crate::error::{GatewayError, Result};

/// Maximum number of CSRC entries (4-bit count field).
pub const MAX_CSRC_COUNT: usize = 15;

/// A parsed RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        CSRC list (0..15)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |              extension header + data (if X set)               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// CSRC entries and extension content are skipped, not interpreted —
/// the payload offset accounts for their length.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    /// Set on the last packet of a frame.
    pub marker: bool,
    /// 7-bit payload type (26 for JPEG, RFC 3551).
    pub payload_type: u8,
    pub sequence_number: u16,
    /// 90 kHz media clock for video.
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    /// Payload bytes after header, CSRC list, and extension.
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Parse one UDP datagram as an RTP packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(GatewayError::MediaFormat(format!(
                "RTP packet too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0] >> 6;
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = data[0] & 0x0F;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = 12 + 4 * csrc_count as usize;
        if data.len() < offset {
            return Err(GatewayError::MediaFormat(
                "RTP packet shorter than its CSRC list".to_string(),
            ));
        }
        let csrcs = data[12..offset]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if extension {
            // 4-byte extension header; length counts 32-bit words of data.
            if data.len() < offset + 4 {
                return Err(GatewayError::MediaFormat(
                    "RTP packet shorter than its extension header".to_string(),
                ));
            }
            let ext_words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + 4 * ext_words;
            if data.len() < offset {
                return Err(GatewayError::MediaFormat(
                    "RTP packet shorter than its extension data".to_string(),
                ));
            }
        }

        Ok(RtpPacket {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            payload: data[offset..].to_vec(),
        })
    }
}
