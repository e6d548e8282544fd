//! Synthetic disc fixtures shared by the unit tests.
//!
//! Every builder produces real on-disc layouts (CLPI, MPLS, BDAV packets,
//! codec headers) so tests exercise the same parsers as a physical disc.

use bytes::Bytes;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::scan::AbortHandle;
use crate::stream::{CodecKind, StreamType};
use crate::vfs::{DirRef, FileInfo, MemoryTree, ReadSeek};

const TICKS_PER_SECOND: f64 = 45_000.0;

fn ticks(seconds: f64) -> [u8; 4] {
    ((seconds * TICKS_PER_SECOND).round() as u32).to_be_bytes()
}

// ============================================================================
// Bit Writer
// ============================================================================

#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bit(&mut self, bit: bool) {
        if self.used == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 0x80 >> self.used;
            }
        }
        self.used = (self.used + 1) % 8;
    }

    pub fn put_bits(&mut self, value: u64, count: u32) {
        for i in (0..count).rev() {
            self.put_bit((value >> i) & 1 == 1);
        }
    }

    /// Exp-Golomb, unsigned.
    pub fn put_ue(&mut self, value: u32) {
        let coded = value as u64 + 1;
        let width = 64 - coded.leading_zeros();
        self.put_bits(0, width - 1);
        self.put_bits(coded, width);
    }

    /// Stop bit plus zero padding.
    pub fn trailing_bits(&mut self) {
        self.put_bit(true);
        self.used = 0;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Insert emulation-prevention bytes.
pub fn escape_rbsp(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + 8);
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 3 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    out
}

// ============================================================================
// Stream Coding Info
// ============================================================================

/// StreamCodingInfo body as stored in CLPI ProgramInfo and MPLS STN tables.
#[derive(Debug, Clone)]
pub struct CodingInfo {
    bytes: Vec<u8>,
}

impl CodingInfo {
    pub fn video(code: u8, format: u8, rate: u8, aspect: u8) -> Self {
        Self {
            bytes: vec![code, (format << 4) | rate, aspect << 4, 0, 0, 0],
        }
    }

    pub fn audio(code: u8, layout: u8, rate: u8, language: &str) -> Self {
        let mut bytes = vec![code, (layout << 4) | rate];
        bytes.extend_from_slice(language.as_bytes());
        Self { bytes }
    }

    pub fn graphics(code: u8, language: &str) -> Self {
        let mut bytes = vec![code];
        bytes.extend_from_slice(language.as_bytes());
        Self { bytes }
    }

    pub fn text(language: &str) -> Self {
        let mut bytes = vec![0x92, 0x01];
        bytes.extend_from_slice(language.as_bytes());
        Self { bytes }
    }

    pub fn raw(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    fn code(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.bytes.len() as u8);
        out.extend_from_slice(&self.bytes);
    }
}

// ============================================================================
// Clip Info
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ClipInfoBuilder {
    presentation: Option<(f64, f64)>,
    source_packets: u32,
    streams: Vec<(u16, CodingInfo)>,
}

impl ClipInfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clip presentation window in seconds.
    pub fn presentation(mut self, start: f64, end: f64) -> Self {
        self.presentation = Some((start, end));
        self
    }

    pub fn source_packets(mut self, count: u32) -> Self {
        self.source_packets = count;
        self
    }

    pub fn stream(mut self, pid: u16, coding: CodingInfo) -> Self {
        self.streams.push((pid, coding));
        self
    }

    /// Header, ClipInfo at 40, SequenceInfo at 60, ProgramInfo last.
    pub fn build(self) -> Vec<u8> {
        let (sequence_start, program_start) = match self.presentation {
            Some(_) => (60u32, 86u32),
            None => (0, 60),
        };
        let mut out = b"HDMV0200".to_vec();
        out.extend_from_slice(&sequence_start.to_be_bytes());
        out.extend_from_slice(&program_start.to_be_bytes());
        out.resize(40, 0);

        out.extend_from_slice(&16u32.to_be_bytes());
        out.extend_from_slice(&[0, 0, 1, 1, 0, 0, 0, 0]);
        out.extend_from_slice(&6_000_000u32.to_be_bytes());
        out.extend_from_slice(&self.source_packets.to_be_bytes());

        if let Some((begin, end)) = self.presentation {
            out.extend_from_slice(&22u32.to_be_bytes());
            out.extend_from_slice(&[0, 1]);
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&[1, 0]);
            out.extend_from_slice(&0x1001u16.to_be_bytes());
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&ticks(begin));
            out.extend_from_slice(&ticks(end));
        }

        let mut body = vec![0u8, 1];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0x0100u16.to_be_bytes());
        body.push(self.streams.len() as u8);
        body.push(0);
        for (pid, coding) in &self.streams {
            body.extend_from_slice(&pid.to_be_bytes());
            coding.write(&mut body);
        }
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

// ============================================================================
// Playlist
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlayItem {
    clip_id: String,
    time_in: f64,
    time_out: f64,
    streams: Vec<(u16, CodingInfo)>,
    angles: Vec<String>,
}

impl PlayItem {
    pub fn new(clip_id: &str, time_in: f64, time_out: f64) -> Self {
        Self {
            clip_id: clip_id.to_string(),
            time_in,
            time_out,
            streams: Vec::new(),
            angles: Vec::new(),
        }
    }

    pub fn stream(mut self, pid: u16, coding: CodingInfo) -> Self {
        self.streams.push((pid, coding));
        self
    }

    pub fn angle(mut self, clip_id: &str) -> Self {
        self.angles.push(clip_id.to_string());
        self
    }

    fn write(&self, out: &mut Vec<u8>) {
        let mut item = Vec::new();
        item.extend_from_slice(self.clip_id.as_bytes());
        item.extend_from_slice(b"M2TS");
        item.push(0);
        item.push(if self.angles.is_empty() { 0x01 } else { 0x11 });
        item.push(0);
        item.extend_from_slice(&ticks(self.time_in));
        item.extend_from_slice(&ticks(self.time_out));
        item.extend_from_slice(&[0; 12]);
        if !self.angles.is_empty() {
            item.push(self.angles.len() as u8 + 1);
            item.push(0);
            for angle in &self.angles {
                item.extend_from_slice(angle.as_bytes());
                item.extend_from_slice(b"M2TS");
                item.push(0);
            }
        }
        self.write_stream_table(&mut item);

        out.extend_from_slice(&(item.len() as u16).to_be_bytes());
        out.extend_from_slice(&item);
    }

    fn write_stream_table(&self, out: &mut Vec<u8>) {
        // video, audio, PG + text, IG
        let mut groups: [Vec<&(u16, CodingInfo)>; 4] = Default::default();
        for entry in &self.streams {
            let slot = match StreamType::from_code(entry.1.code()) {
                StreamType::InteractiveGraphics => 3,
                t if t.kind() == CodecKind::Video => 0,
                t if t.kind() == CodecKind::Audio => 1,
                _ => 2,
            };
            groups[slot].push(entry);
        }

        let mut table = vec![0u8, 0];
        for group in &groups {
            table.push(group.len() as u8);
        }
        table.extend_from_slice(&[0; 3 + 5]);
        for (pid, coding) in groups.iter().flatten() {
            table.extend_from_slice(&[9, 1]);
            table.extend_from_slice(&pid.to_be_bytes());
            table.extend_from_slice(&[0; 6]);
            coding.write(&mut table);
        }
        out.extend_from_slice(&(table.len() as u16).to_be_bytes());
        out.extend_from_slice(&table);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistBuilder {
    items: Vec<PlayItem>,
    marks: Vec<(u16, f64)>,
}

impl PlaylistBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(mut self, item: PlayItem) -> Self {
        self.items.push(item);
        self
    }

    /// Chapter mark on play item `item` at clip time `time` seconds.
    pub fn chapter(mut self, item: u16, time: f64) -> Self {
        self.marks.push((item, time));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut list = vec![0u8, 0];
        list.extend_from_slice(&(self.items.len() as u16).to_be_bytes());
        list.extend_from_slice(&0u16.to_be_bytes());
        for item in &self.items {
            item.write(&mut list);
        }

        let mut marks = (self.marks.len() as u16).to_be_bytes().to_vec();
        for (item, time) in &self.marks {
            marks.extend_from_slice(&[0, 1]);
            marks.extend_from_slice(&item.to_be_bytes());
            marks.extend_from_slice(&ticks(*time));
            marks.extend_from_slice(&0xFFFFu16.to_be_bytes());
            marks.extend_from_slice(&0u32.to_be_bytes());
        }

        let playlist_start = 20u32;
        let marks_start = playlist_start + 4 + list.len() as u32;
        let mut out = b"MPLS0200".to_vec();
        out.extend_from_slice(&playlist_start.to_be_bytes());
        out.extend_from_slice(&marks_start.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(list.len() as u32).to_be_bytes());
        out.extend_from_slice(&list);
        out.extend_from_slice(&(marks.len() as u32).to_be_bytes());
        out.extend_from_slice(&marks);
        out
    }
}

// ============================================================================
// Transport Stream
// ============================================================================

const PMT_PID: u16 = 0x0100;

#[derive(Debug)]
pub struct TsBuilder {
    packet_size: usize,
    out: Vec<u8>,
    counters: HashMap<u16, u8>,
}

impl TsBuilder {
    /// 192-byte BDAV source packets.
    pub fn new() -> Self {
        Self {
            packet_size: 192,
            out: Vec::new(),
            counters: HashMap::new(),
        }
    }

    /// Plain 188-byte packets.
    pub fn plain() -> Self {
        Self {
            packet_size: 188,
            ..Self::new()
        }
    }

    /// PAT for program 1 plus a PMT listing `(pid, stream type)`.
    pub fn pat_pmt(mut self, streams: &[(u16, u8)]) -> Self {
        let mut pat = vec![0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01];
        pat.extend_from_slice(&(0xE000 | PMT_PID).to_be_bytes());
        self.push_section(0x0000, 0x00, &pat);

        let mut pmt = vec![0x00, 0x01, 0xC1, 0x00, 0x00, 0xF0, 0x01, 0xF0, 0x00];
        for &(pid, stream_type) in streams {
            pmt.push(stream_type);
            pmt.extend_from_slice(&(0xE000 | pid).to_be_bytes());
            pmt.extend_from_slice(&[0xF0, 0x00]);
        }
        self.push_section(PMT_PID, 0x02, &pmt);
        self
    }

    /// One PES unit; it always starts a fresh packet.
    pub fn pes(mut self, pid: u16, stream_id: u8, pts: Option<u64>, payload: &[u8]) -> Self {
        let header_data = pts.map(encode_pts).unwrap_or_default();
        let length = 3 + header_data.len() + payload.len();
        let mut unit = vec![0x00, 0x00, 0x01, stream_id];
        unit.extend_from_slice(&(if length <= 0xFFFF { length as u16 } else { 0 }).to_be_bytes());
        unit.push(0x80);
        unit.push(if pts.is_some() { 0x80 } else { 0x00 });
        unit.push(header_data.len() as u8);
        unit.extend_from_slice(&header_data);
        unit.extend_from_slice(payload);

        for (n, chunk) in unit.chunks(184).enumerate() {
            self.push_packet(pid, n == 0, chunk);
        }
        self
    }

    /// A packet continuing whatever unit is open on `pid`.
    pub fn continuation(mut self, pid: u16, chunk: &[u8]) -> Self {
        self.push_packet(pid, false, chunk);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.out
    }

    fn push_section(&mut self, pid: u16, table_id: u8, body: &[u8]) {
        let section_length = body.len() + 4;
        let mut section = vec![table_id, 0xB0 | (section_length >> 8) as u8, section_length as u8];
        section.extend_from_slice(body);
        let crc = crc32_mpeg(&section);
        section.extend_from_slice(&crc.to_be_bytes());

        let mut payload = vec![0x00];
        payload.extend_from_slice(&section);
        self.push_packet(pid, true, &payload);
    }

    fn push_packet(&mut self, pid: u16, unit_start: bool, chunk: &[u8]) {
        let counter = self.counters.entry(pid).or_insert(0);
        let cc = *counter;
        *counter = (cc + 1) & 0x0F;

        if self.packet_size == 192 {
            self.out.extend_from_slice(&[0; 4]);
        }
        self.out.push(0x47);
        self.out.push(((unit_start as u8) << 6) | ((pid >> 8) as u8 & 0x1F));
        self.out.push(pid as u8);
        if chunk.len() >= 184 {
            self.out.push(0x10 | cc);
            self.out.extend_from_slice(&chunk[..184]);
            return;
        }
        let stuffing = 183 - chunk.len();
        self.out.push(0x30 | cc);
        self.out.push(stuffing as u8);
        if stuffing > 0 {
            self.out.push(0x00);
            self.out.extend(std::iter::repeat(0xFF).take(stuffing - 1));
        }
        self.out.extend_from_slice(chunk);
    }
}

fn encode_pts(pts: u64) -> Vec<u8> {
    vec![
        0x21 | (((pts >> 30) as u8 & 0x07) << 1),
        (pts >> 22) as u8,
        ((((pts >> 15) & 0x7F) as u8) << 1) | 1,
        (pts >> 7) as u8,
        (((pts & 0x7F) as u8) << 1) | 1,
    ]
}

fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc ^= (b as u32) << 24;
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

// ============================================================================
// Codec Payloads
// ============================================================================

/// PCS with one object, WDS, `objects` ODS segments and END.
pub fn pgs_display_set(width: u16, height: u16, composition: u16, forced: bool, objects: usize) -> Vec<u8> {
    let mut pcs = Vec::new();
    pcs.extend_from_slice(&width.to_be_bytes());
    pcs.extend_from_slice(&height.to_be_bytes());
    pcs.push(0x10);
    pcs.extend_from_slice(&composition.to_be_bytes());
    pcs.extend_from_slice(&[0x80, 0x00, 0x00, 0x01]);
    pcs.extend_from_slice(&[0x00, 0x00, 0x00, if forced { 0x40 } else { 0x00 }]);
    pcs.extend_from_slice(&[0x01, 0x00, 0x03, 0x00]);

    let wds = [0x01, 0x00, 0x01, 0x00, 0x03, 0x00, 0x02, 0x00, 0x00, 0x40];
    let ods = [0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x08, 0x00, 0x10, 0x00, 0x08, 0x11, 0x22, 0x33, 0x44];

    let mut set = Vec::new();
    let mut segment = |kind: u8, body: &[u8]| {
        set.push(kind);
        set.extend_from_slice(&(body.len() as u16).to_be_bytes());
        set.extend_from_slice(body);
    };
    segment(0x16, &pcs);
    segment(0x17, &wds);
    for _ in 0..objects {
        segment(0x15, &ods);
    }
    segment(0x80, &[]);
    set
}

/// High Profile 4.1 1920x1080 progressive SPS NAL (header byte included).
pub fn avc_sps_1080p() -> Vec<u8> {
    avc_sps(0, 119, 67, 4)
}

/// High Profile SPS with the given luma depth, geometry in macroblocks and
/// bottom crop.
pub fn avc_sps(bit_depth_minus8: u32, width_mbs_minus1: u32, map_units_minus1: u32, crop_bottom: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(100, 8);
    w.put_bits(0, 8);
    w.put_bits(41, 8);
    w.put_ue(0); // sps id
    w.put_ue(1); // 4:2:0
    w.put_ue(bit_depth_minus8);
    w.put_ue(0);
    w.put_bit(false);
    w.put_bit(false); // no scaling matrix
    w.put_ue(0); // log2_max_frame_num_minus4
    w.put_ue(0); // poc type
    w.put_ue(0);
    w.put_ue(4); // ref frames
    w.put_bit(false);
    w.put_ue(width_mbs_minus1);
    w.put_ue(map_units_minus1);
    w.put_bit(true); // frame_mbs_only
    w.put_bit(true);
    w.put_bit(true); // cropping
    w.put_ue(0);
    w.put_ue(0);
    w.put_ue(0);
    w.put_ue(crop_bottom);
    w.put_bit(false); // no VUI
    w.trailing_bits();

    let mut nal = vec![0x67];
    nal.extend(escape_rbsp(&w.into_bytes()));
    nal
}

/// AUD, optional SPS, then one slice of type `slice_type` padded with
/// `payload_len` bytes of slice data.
pub fn avc_access_unit(with_sps: bool, slice_type: u32, payload_len: usize) -> Vec<u8> {
    let mut unit = vec![0, 0, 0, 1, 0x09, 0xF0];
    if with_sps {
        unit.extend_from_slice(&[0, 0, 0, 1]);
        unit.extend(avc_sps_1080p());
    }
    unit.extend_from_slice(&[0, 0, 1]);
    unit.push(if slice_type % 5 == 2 { 0x65 } else { 0x41 });
    let mut w = BitWriter::new();
    w.put_ue(0);
    w.put_ue(slice_type);
    w.put_ue(0);
    w.trailing_bits();
    unit.extend(w.into_bytes());
    unit.extend(std::iter::repeat(0x5A).take(payload_len));
    unit
}

/// Main 10, High tier, level 5.1, 3840x2160 SPS NAL (2-byte header included).
pub fn hevc_sps_2160p() -> Vec<u8> {
    hevc_sps(3840, 2160, 0, 2)
}

/// Main 10 high-tier SPS. A non-zero `crop_right` writes a conformance
/// window.
pub fn hevc_sps(width: u32, height: u32, crop_right: u32, bit_depth_minus8: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(0, 4); // vps id
    w.put_bits(0, 3); // one sub-layer
    w.put_bit(true);
    w.put_bits(0, 2);
    w.put_bit(true); // high tier
    w.put_bits(2, 5); // Main 10
    w.put_bits(0x6000_0000, 32);
    w.put_bits(0b1001, 4); // progressive, frame only
    w.put_bits(0, 44);
    w.put_bits(153, 8);
    w.put_ue(0); // sps id
    w.put_ue(1); // 4:2:0
    w.put_ue(width);
    w.put_ue(height);
    w.put_bit(crop_right > 0);
    if crop_right > 0 {
        w.put_ue(0);
        w.put_ue(crop_right);
        w.put_ue(0);
        w.put_ue(0);
    }
    w.put_ue(bit_depth_minus8);
    w.put_ue(bit_depth_minus8);
    w.trailing_bits();

    let mut nal = vec![0x42, 0x01];
    nal.extend(escape_rbsp(&w.into_bytes()));
    nal
}

/// AUD with `pic_type`, optional SPS, then one VCL NAL of `slice_nal_type`.
pub fn hevc_access_unit(with_sps: bool, pic_type: u8, slice_nal_type: u8, payload_len: usize) -> Vec<u8> {
    let mut unit = vec![0, 0, 0, 1, 0x46, 0x01, (pic_type << 5) | 0x10];
    if with_sps {
        unit.extend_from_slice(&[0, 0, 0, 1]);
        unit.extend(hevc_sps_2160p());
    }
    unit.extend_from_slice(&[0, 0, 1, slice_nal_type << 1, 0x01]);
    unit.extend(std::iter::repeat(0x5A).take(payload_len));
    unit
}

/// AC-3 syncframe (sync word included) padded to 64 bytes.
pub fn ac3_frame(fscod: u8, frmsizecod: u8, acmod: u8, lfe: bool, dialnorm: u8) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(0x0B77, 16);
    w.put_bits(0, 16); // crc1
    w.put_bits(fscod as u64, 2);
    w.put_bits(frmsizecod as u64, 6);
    w.put_bits(8, 5); // bsid
    w.put_bits(0, 3);
    w.put_bits(acmod as u64, 3);
    if acmod & 0x01 != 0 && acmod != 1 {
        w.put_bits(0, 2);
    }
    if acmod & 0x04 != 0 {
        w.put_bits(0, 2);
    }
    if acmod == 2 {
        w.put_bits(0, 2);
    }
    w.put_bit(lfe);
    w.put_bits(dialnorm as u64, 5);
    w.trailing_bits();
    let mut frame = w.into_bytes();
    frame.resize(64, 0);
    frame
}

/// E-AC-3 dependent substream frame, 5.1 at 48 kHz.
pub fn eac3_dependent_frame() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(0x0B77, 16);
    w.put_bits(1, 2); // dependent
    w.put_bits(0, 3);
    w.put_bits(0x17F, 11);
    w.put_bits(0, 2);
    w.put_bits(3, 2);
    w.put_bits(7, 3);
    w.put_bit(true);
    w.put_bits(16, 5);
    w.put_bits(31, 5);
    w.trailing_bits();
    let mut frame = w.into_bytes();
    frame.resize(32, 0);
    frame
}

/// DTS core frame (sync word included), 24-bit source PCM.
pub fn dts_core_frame(amode: u8, sfreq: u8, rate: u8, lfe: bool) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.put_bits(0x7FFE_8001, 32);
    w.put_bit(true); // normal frame
    w.put_bits(31, 5);
    w.put_bit(false);
    w.put_bits(15, 7);
    w.put_bits(1023, 14);
    w.put_bits(amode as u64, 6);
    w.put_bits(sfreq as u64, 4);
    w.put_bits(rate as u64, 5);
    w.put_bits(0, 5);
    w.put_bits(0, 3); // ext_audio_id
    w.put_bit(false);
    w.put_bit(true); // aspf
    w.put_bits(u64::from(lfe), 2);
    w.put_bits(0, 2);
    w.put_bits(7, 4);
    w.put_bits(0, 2);
    w.put_bits(6, 3); // 24-bit
    w.trailing_bits();
    let mut frame = w.into_bytes();
    frame.resize(32, 0);
    frame
}

// ============================================================================
// Disc Trees
// ============================================================================

/// CLPI and M2TS bytes for a clip holding AC-3 on 0x1100 (two frames per
/// second) and PGS on 0x1200 (`captions` display sets, one per second).
pub fn standard_clip(start: u32, seconds: u32, captions: u32) -> (Vec<u8>, Vec<u8>) {
    let clpi = ClipInfoBuilder::new()
        .presentation(start as f64, (start + seconds) as f64)
        .stream(0x1100, CodingInfo::audio(0x81, 6, 1, "eng"))
        .stream(0x1200, CodingInfo::graphics(0x90, "eng"))
        .build();

    let mut ts = TsBuilder::new().pat_pmt(&[(0x1100, 0x81), (0x1200, 0x90)]);
    for s in 0..seconds {
        let pts = (start + s) as u64 * 90_000;
        ts = ts
            .pes(0x1100, 0xBD, Some(pts), &ac3_frame(0, 0x24, 7, true, 27))
            .pes(0x1100, 0xBD, Some(pts + 45_000), &ac3_frame(0, 0x24, 7, true, 27));
        if s < captions {
            ts = ts.pes(0x1200, 0xBD, Some(pts), &pgs_display_set(1920, 1080, s as u16, false, 1));
        }
    }
    (clpi, ts.build())
}

/// Selection table matching [`standard_clip`].
pub fn standard_item(clip_id: &str, time_in: f64, time_out: f64) -> PlayItem {
    PlayItem::new(clip_id, time_in, time_out)
        .stream(0x1100, CodingInfo::audio(0x81, 6, 1, "eng"))
        .stream(0x1200, CodingInfo::graphics(0x90, "eng"))
}

pub struct DiscFixture {
    tree: MemoryTree,
}

impl DiscFixture {
    pub fn new() -> Self {
        let mut tree = MemoryTree::new("DISC");
        tree.add_dir("BDMV/PLAYLIST")
            .add_dir("BDMV/CLIPINF")
            .add_dir("BDMV/STREAM");
        Self { tree }
    }

    pub fn clip(mut self, id: &str, (clpi, m2ts): (Vec<u8>, Vec<u8>)) -> Self {
        self.tree
            .add_file(&format!("BDMV/CLIPINF/{}.CLPI", id), clpi)
            .add_file(&format!("BDMV/STREAM/{}.M2TS", id), m2ts);
        self
    }

    pub fn playlist(mut self, name: &str, playlist: PlaylistBuilder) -> Self {
        self.tree
            .add_file(&format!("BDMV/PLAYLIST/{}.MPLS", name), playlist.build());
        self
    }

    pub fn file(mut self, path: &str, data: impl Into<Bytes>) -> Self {
        self.tree.add_file(path, data);
        self
    }

    pub fn build(self) -> DirRef {
        self.tree.build()
    }
}

// ============================================================================
// Tripwire File
// ============================================================================

/// A file that raises an abort flag as soon as it is read.
#[derive(Debug)]
pub struct TripwireFile {
    name: String,
    data: Bytes,
    abort: AbortHandle,
}

impl TripwireFile {
    pub fn new(name: &str, data: Vec<u8>, abort: AbortHandle) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            data: data.into(),
            abort,
        })
    }
}

impl FileInfo for TripwireFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn full_name(&self) -> String {
        self.name.clone()
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(TripwireReader {
            inner: Cursor::new(self.data.clone()),
            abort: self.abort.clone(),
        }))
    }
}

struct TripwireReader {
    inner: Cursor<Bytes>,
    abort: AbortHandle,
}

impl Read for TripwireReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.abort.abort();
        Ok(n)
    }
}

impl Seek for TripwireReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
