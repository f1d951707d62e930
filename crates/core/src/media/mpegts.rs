//! Minimal MPEG-2 transport stream muxer (ISO/IEC 13818-1).
//!
//! Just enough of a TS writer for HLS segments carrying one H.264
//! elementary stream:
//!
//! - `write_header` emits PAT (PID 0) and PMT (PID 0x1000) for a single
//!   program whose video PID is 0x0100, stream type 0x1B (H.264).
//! - `write_frame` wraps each access unit in one PES packet (stream id
//!   0xE0, PTS and DTS) and splits it across 188-byte TS packets with
//!   adaptation-field stuffing, a PCR on the packet that starts the PES,
//!   and per-PID continuity counters.
//! - `write_trailer` is a no-op — a transport stream has no trailer
//!   structure; the segment simply ends on a packet boundary.
//!
//! Every emitted packet is exactly [`TS_PACKET_SIZE`] bytes and starts
//! with the 0x47 sync byte.

use crate::error::Result;
use crate::media::segmenter::TsMuxer;
use crate::media::H264Frame;

/// Transport packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// Sync byte opening every transport packet.
pub const SYNC_BYTE: u8 = 0x47;

const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x0100;
const PROGRAM_NUMBER: u16 = 1;
const STREAM_TYPE_H264: u8 = 0x1B;
const STREAM_ID_VIDEO: u8 = 0xE0;

/// Built-in [`TsMuxer`] implementation.
pub struct MpegTsMuxer {
    pat_continuity: u8,
    pmt_continuity: u8,
    video_continuity: u8,
}

impl MpegTsMuxer {
    pub fn new() -> Self {
        Self {
            pat_continuity: 0,
            pmt_continuity: 0,
            video_continuity: 0,
        }
    }
}

impl Default for MpegTsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsMuxer for MpegTsMuxer {
    fn write_header(&mut self, out: &mut Vec<u8>) -> Result<()> {
        // Fresh container generation: counters restart with the tables.
        self.pat_continuity = 0;
        self.pmt_continuity = 0;
        self.video_continuity = 0;

        write_section_packet(out, PAT_PID, &mut self.pat_continuity, &pat_section());
        write_section_packet(out, PMT_PID, &mut self.pmt_continuity, &pmt_section());
        Ok(())
    }

    fn write_frame(&mut self, frame: &H264Frame, out: &mut Vec<u8>) -> Result<()> {
        let pes = pes_packet(frame);
        let mut remaining = pes.as_slice();
        let mut first = true;

        while !remaining.is_empty() {
            remaining = write_media_packet(
                out,
                VIDEO_PID,
                &mut self.video_continuity,
                first,
                first.then_some(frame.pts.max(0) as u64),
                remaining,
            );
            first = false;
        }
        Ok(())
    }

    fn write_trailer(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// PAT: one program mapping [`PROGRAM_NUMBER`] to [`PMT_PID`].
fn pat_section() -> Vec<u8> {
    let mut section = vec![
        0x00, // table_id: program association
        0xB0, // section_syntax_indicator + reserved
        0x0D, // section_length: 13 bytes follow
        0x00,
        0x01, // transport_stream_id
        0xC1, // version 0, current_next = 1
        0x00, // section_number
        0x00, // last_section_number
    ];
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.push(0xE0 | (PMT_PID >> 8) as u8);
    section.push(PMT_PID as u8);
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// PMT: PCR on the video PID, one H.264 elementary stream.
fn pmt_section() -> Vec<u8> {
    let mut section = vec![
        0x02, // table_id: program map
        0xB0, 0x12, // section_length: 18 bytes follow
    ];
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.extend_from_slice(&[0xC1, 0x00, 0x00]);
    section.push(0xE0 | (VIDEO_PID >> 8) as u8); // PCR_PID
    section.push(VIDEO_PID as u8);
    section.extend_from_slice(&[0xF0, 0x00]); // program_info_length = 0
    section.push(STREAM_TYPE_H264);
    section.push(0xE0 | (VIDEO_PID >> 8) as u8);
    section.push(VIDEO_PID as u8);
    section.extend_from_slice(&[0xF0, 0x00]); // ES_info_length = 0
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// One PSI packet: pointer field, section, 0xFF padding.
fn write_section_packet(out: &mut Vec<u8>, pid: u16, continuity: &mut u8, section: &[u8]) {
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[0] = SYNC_BYTE;
    packet[1] = 0x40 | (pid >> 8) as u8; // payload_unit_start_indicator
    packet[2] = pid as u8;
    packet[3] = 0x10 | (*continuity & 0x0F); // payload only
    *continuity = (*continuity + 1) & 0x0F;
    packet[4] = 0x00; // pointer_field
    packet[5..5 + section.len()].copy_from_slice(section);
    out.extend_from_slice(&packet);
}

/// PES packet for one access unit, PTS and DTS both present.
fn pes_packet(frame: &H264Frame) -> Vec<u8> {
    const HEADER_DATA_LEN: usize = 10; // PTS(5) + DTS(5)

    let mut pes = vec![0x00, 0x00, 0x01, STREAM_ID_VIDEO];
    // Video PES may use length 0 (unbounded) when the payload exceeds
    // the 16-bit field.
    let length = 3 + HEADER_DATA_LEN + frame.data.len();
    let length: u16 = if length > usize::from(u16::MAX) {
        0
    } else {
        length as u16
    };
    pes.extend_from_slice(&length.to_be_bytes());
    pes.push(0x80); // marker bits '10'
    pes.push(0xC0); // PTS_DTS_flags = both
    pes.push(HEADER_DATA_LEN as u8);
    push_timestamp(&mut pes, 0b0011, frame.pts);
    push_timestamp(&mut pes, 0b0001, frame.dts);
    pes.extend_from_slice(&frame.data);
    pes
}

/// 33-bit timestamp in the 5-byte marker format (ISO 13818-1 §2.4.3.7).
fn push_timestamp(out: &mut Vec<u8>, prefix: u8, ts: i64) {
    let ts = (ts as u64) & 0x1_FFFF_FFFF;
    out.push((prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1);
    out.push((ts >> 22) as u8);
    out.push(((ts >> 14) as u8 & 0xFE) | 1);
    out.push((ts >> 7) as u8);
    out.push(((ts << 1) as u8) | 1);
}

/// Write one TS packet carrying as much of `data` as fits; returns the
/// unwritten rest.
///
/// The packet that starts a PES gets the payload_unit_start_indicator,
/// a random-access indicator and a PCR; short payloads are padded with
/// adaptation-field stuffing so the packet is exactly 188 bytes.
fn write_media_packet<'a>(
    out: &mut Vec<u8>,
    pid: u16,
    continuity: &mut u8,
    start: bool,
    pcr: Option<u64>,
    data: &'a [u8],
) -> &'a [u8] {
    // 1 length byte + 1 flags byte + 6 PCR bytes when a PCR is carried.
    let min_adaptation = if pcr.is_some() { 8 } else { 0 };
    let payload_len = data.len().min(184 - min_adaptation);
    let adaptation_len = 184 - payload_len;

    out.push(SYNC_BYTE);
    out.push(if start { 0x40 } else { 0x00 } | (pid >> 8) as u8);
    out.push(pid as u8);
    out.push(
        if adaptation_len > 0 { 0x30 } else { 0x10 } | (*continuity & 0x0F),
    );
    *continuity = (*continuity + 1) & 0x0F;

    if adaptation_len == 1 {
        out.push(0x00);
    } else if adaptation_len >= 2 {
        out.push((adaptation_len - 1) as u8);
        let flags_at = out.len();
        out.push(0x00);
        if let Some(base) = pcr {
            out[flags_at] = 0x50; // random_access + PCR_flag
            out.push((base >> 25) as u8);
            out.push((base >> 17) as u8);
            out.push((base >> 9) as u8);
            out.push((base >> 1) as u8);
            out.push(((base as u8 & 0x01) << 7) | 0x7E); // reserved, ext=0
            out.push(0x00);
        }
        let written = out.len() % TS_PACKET_SIZE;
        for _ in written..(4 + adaptation_len) {
            out.push(0xFF);
        }
    }

    out.extend_from_slice(&data[..payload_len]);
    &data[payload_len..]
}

/// MPEG CRC-32 (polynomial 0x04C11DB7, no reflection).
fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}
