// TS DEMUXER - BDAV MPEG-2 Transport Stream reader
//
// Blu-ray clips are a sequence of 192-byte source packets: a 4-byte arrival
// timestamp header followed by a 188-byte TS packet. Plain 188-byte streams
// are accepted too.
//
// The demuxer owns sync recovery and PES reassembly. Everything it learns is
// pushed into a PacketSink; it keeps no per-stream statistics itself.

use bytes::{Buf, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use tracing::{debug, warn};

use crate::error::{Result, ScanError};

// ============================================================================
// Constants
// ============================================================================

pub const TS_PACKET_SIZE: usize = 188;
pub const M2TS_PACKET_SIZE: usize = 192; // 4-byte arrival header + 188-byte TS
const TS_SYNC_BYTE: u8 = 0x47;
const READ_CHUNK: usize = M2TS_PACKET_SIZE * 1024;

/// Ceiling for a PES without a declared length (video). Far above any
/// Blu-ray access unit.
const MAX_UNBOUNDED_PES: usize = 16 * 1024 * 1024;

const PAT_PID: u16 = 0x0000;
const NULL_PID: u16 = 0x1FFF;

// ============================================================================
// Types
// ============================================================================

/// Per-packet facts handed to the sink.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub pid: u16,
    pub payload_len: usize,
    /// PTS of a PES unit starting in this packet, 90 kHz.
    pub pts: Option<u64>,
    pub random_access: bool,
}

/// A reassembled PES payload (header stripped).
#[derive(Debug, Clone)]
pub struct PesUnit {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtEntry {
    pub pid: u16,
    pub stream_type: u8,
    pub language: Option<String>,
}

pub trait PacketSink {
    /// Every packet with a valid header, in file order.
    fn packet(&mut self, packet: &PacketInfo);

    fn pes(&mut self, unit: PesUnit);

    /// Streams announced by a program map table.
    fn program(&mut self, _entries: &[PmtEntry]) {}

    /// Whether PES units on `pid` should be reassembled.
    fn wants_pes(&self, pid: u16) -> bool;

    /// Called between packet reads with the byte offset reached so far.
    /// Returning `false` stops the demuxer without flushing.
    fn poll(&mut self, _position: u64) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub packet_size: usize,
    pub packets: u64,
    pub corrupt_packets: u64,
    pub resyncs: u64,
    pub bytes_read: u64,
    /// Stopped by the sink before the end of the file.
    pub stopped: bool,
}

// ============================================================================
// TS Packet Header
// ============================================================================

#[derive(Debug, Clone)]
struct TsHeader {
    transport_error: bool,
    payload_unit_start: bool,
    pid: u16,
    adaptation_field_exists: bool,
    payload_exists: bool,
}

impl TsHeader {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 || data[0] != TS_SYNC_BYTE {
            return None;
        }

        Some(Self {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            payload_exists: (data[3] & 0x10) != 0,
        })
    }
}

/// Returns (adaptation field length, random access indicator).
fn parse_adaptation_field(data: &[u8]) -> (usize, bool) {
    match data {
        [] => (0, false),
        [length, flags, ..] if *length > 0 => (*length as usize, flags & 0x40 != 0),
        [length, ..] => (*length as usize, false),
    }
}

// ============================================================================
// PES Parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PesHeader {
    stream_id: u8,
    pts: Option<u64>,
    dts: Option<u64>,
    header_len: usize,
    /// 0 = unbounded (video).
    packet_length: usize,
}

fn has_extended_header(stream_id: u8) -> bool {
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
}

fn parse_pes_header(data: &[u8]) -> Option<PesHeader> {
    if data.len() < 6 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return None;
    }

    let stream_id = data[3];
    let packet_length = ((data[4] as usize) << 8) | data[5] as usize;

    if !has_extended_header(stream_id) {
        return Some(PesHeader {
            stream_id,
            pts: None,
            dts: None,
            header_len: 6,
            packet_length,
        });
    }
    if data.len() < 9 {
        return None;
    }

    let pts_dts_flags = (data[7] >> 6) & 0x03;
    let header_len = 9 + data[8] as usize;

    let mut pts = None;
    let mut dts = None;
    if pts_dts_flags >= 2 && data.len() >= 14 {
        pts = Some(parse_timestamp(&data[9..14]));
    }
    if pts_dts_flags == 3 && data.len() >= 19 {
        dts = Some(parse_timestamp(&data[14..19]));
    }

    Some(PesHeader {
        stream_id,
        pts,
        dts,
        header_len,
        packet_length,
    })
}

/// 33-bit timestamp, 90 kHz.
fn parse_timestamp(data: &[u8]) -> u64 {
    (((data[0] as u64) >> 1) & 0x07) << 30
        | ((data[1] as u64) << 22)
        | (((data[2] as u64) >> 1) << 15)
        | ((data[3] as u64) << 7)
        | ((data[4] as u64) >> 1)
}

struct PesAssembler {
    buf: BytesMut,
    /// Bytes this unit may grow to, header included.
    limit: usize,
}

impl PesAssembler {
    fn start(payload: &[u8]) -> Self {
        let limit = match parse_pes_header(payload) {
            Some(header) if header.packet_length > 0 => header.packet_length + 6,
            _ => MAX_UNBOUNDED_PES,
        };
        Self {
            buf: BytesMut::from(payload),
            limit,
        }
    }

    /// Append a continuation payload; anything past the limit is dropped.
    fn extend(&mut self, payload: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        let take = payload.len().min(room);
        self.buf.extend_from_slice(&payload[..take]);
    }

    fn finish(self, pid: u16) -> Option<PesUnit> {
        let mut buf = self.buf;
        let header = parse_pes_header(&buf)?;
        if header.header_len > buf.len() {
            return None;
        }
        if header.packet_length > 0 && buf.len() > header.packet_length + 6 {
            buf.truncate(header.packet_length + 6);
        }
        buf.advance(header.header_len);
        Some(PesUnit {
            pid,
            stream_id: header.stream_id,
            pts: header.pts,
            dts: header.dts,
            data: buf.freeze(),
        })
    }
}

// ============================================================================
// PSI
// ============================================================================

fn psi_section(payload: &[u8], table_id: u8) -> Option<&[u8]> {
    let pointer = *payload.first()? as usize;
    let section = payload.get(1 + pointer..)?;
    if section.len() < 8 || section[0] != table_id {
        return None;
    }
    let section_length = (((section[1] as usize) & 0x0F) << 8) | section[2] as usize;
    // drop the trailing CRC
    let end = (3 + section_length).min(section.len()).checked_sub(4)?;
    section.get(..end)
}

fn parse_pat(payload: &[u8]) -> Vec<u16> {
    let mut pmt_pids = Vec::new();
    let Some(section) = psi_section(payload, 0x00) else {
        return pmt_pids;
    };

    let mut pos = 8;
    while pos + 4 <= section.len() {
        let program_num = ((section[pos] as u16) << 8) | section[pos + 1] as u16;
        let pid = (((section[pos + 2] as u16) & 0x1F) << 8) | section[pos + 3] as u16;
        if program_num != 0 {
            pmt_pids.push(pid);
        }
        pos += 4;
    }
    pmt_pids
}

fn parse_pmt(payload: &[u8]) -> Vec<PmtEntry> {
    let mut entries = Vec::new();
    let Some(section) = psi_section(payload, 0x02) else {
        return entries;
    };
    if section.len() < 12 {
        return entries;
    }

    let program_info_length = (((section[10] as usize) & 0x0F) << 8) | section[11] as usize;
    let mut pos = 12 + program_info_length;

    while pos + 5 <= section.len() {
        let stream_type = section[pos];
        let pid = (((section[pos + 1] as u16) & 0x1F) << 8) | section[pos + 2] as u16;
        let es_info_length = (((section[pos + 3] as usize) & 0x0F) << 8) | section[pos + 4] as usize;

        let language = section
            .get(pos + 5..pos + 5 + es_info_length)
            .and_then(parse_language_descriptor);

        entries.push(PmtEntry {
            pid,
            stream_type,
            language,
        });
        pos += 5 + es_info_length;
    }
    entries
}

fn parse_language_descriptor(data: &[u8]) -> Option<String> {
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;

        if tag == 0x0A && length >= 3 && pos + 2 + length <= data.len() {
            // ISO 639 language descriptor
            let lang_bytes = &data[pos + 2..pos + 5];
            if lang_bytes.iter().all(|b| b.is_ascii_alphabetic()) {
                return Some(String::from_utf8_lossy(lang_bytes).to_ascii_lowercase());
            }
        }

        pos += 2 + length;
    }

    None
}

// ============================================================================
// TS Demuxer
// ============================================================================

pub struct TsDemuxer<R: Read> {
    reader: R,
    name: String,
    max_resync_failures: u32,
    buf: BytesMut,
    eof: bool,
    pmt_pids: Vec<u16>,
    assemblers: BTreeMap<u16, PesAssembler>,
    stats: DemuxStats,
}

impl<R: Read> TsDemuxer<R> {
    pub fn new(reader: R, name: impl Into<String>, max_resync_failures: u32) -> Self {
        Self {
            reader,
            name: name.into(),
            max_resync_failures: max_resync_failures.max(1),
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
            pmt_pids: Vec::new(),
            assemblers: BTreeMap::new(),
            stats: DemuxStats::default(),
        }
    }

    /// Read the whole stream, pushing packets and PES units into `sink`.
    ///
    /// A lost sync is recovered by scanning forward for a sync byte that is
    /// confirmed one packet later. `max_resync_failures` consecutive packet
    /// windows without one make the file corrupt.
    pub fn run<S: PacketSink>(mut self, sink: &mut S) -> Result<DemuxStats> {
        self.fill()?;
        let packet_size = detect_packet_size(&self.buf);
        let sync_offset = packet_size - TS_PACKET_SIZE;
        self.stats.packet_size = packet_size;
        let mut failures = 0u32;

        loop {
            if !sink.poll(self.stats.bytes_read) {
                self.stats.stopped = true;
                return Ok(self.stats);
            }
            if self.buf.len() < packet_size * 2 {
                self.fill()?;
            }
            if self.buf.len() < packet_size {
                // trailing partial packet
                self.stats.bytes_read += self.buf.len() as u64;
                self.buf.clear();
                break;
            }

            if self.buf[sync_offset] == TS_SYNC_BYTE {
                failures = 0;
                let packet = self.buf.split_to(packet_size).freeze();
                self.stats.bytes_read += packet_size as u64;
                self.handle_packet(&packet[sync_offset..], sink);
                continue;
            }

            match find_sync(&self.buf, packet_size, sync_offset) {
                Some(skip) => {
                    self.stats.resyncs += 1;
                    self.stats.corrupt_packets += 1;
                    debug!(
                        "{}: resync after {} bytes at offset {}",
                        self.name, skip, self.stats.bytes_read
                    );
                    self.buf.advance(skip);
                    self.stats.bytes_read += skip as u64;
                }
                None => {
                    failures += 1;
                    if failures >= self.max_resync_failures {
                        warn!("{}: lost sync at offset {}", self.name, self.stats.bytes_read);
                        return Err(ScanError::corrupt(
                            &self.name,
                            format!(
                                "no packet sync for {} consecutive packets at offset {}",
                                failures, self.stats.bytes_read
                            ),
                        ));
                    }
                    let skip = packet_size.min(self.buf.len());
                    self.buf.advance(skip);
                    self.stats.bytes_read += skip as u64;
                    self.stats.corrupt_packets += 1;
                }
            }
        }

        let pending = std::mem::take(&mut self.assemblers);
        for (pid, assembler) in pending {
            if let Some(unit) = assembler.finish(pid) {
                sink.pes(unit);
            }
        }
        Ok(self.stats)
    }

    fn fill(&mut self) -> Result<()> {
        while !self.eof && self.buf.len() < READ_CHUNK {
            let start = self.buf.len();
            self.buf.resize(READ_CHUNK, 0);
            let read = loop {
                match self.reader.read(&mut self.buf[start..]) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.buf.truncate(start);
                        return Err(e.into());
                    }
                }
            };
            self.buf.truncate(start + read);
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    fn handle_packet<S: PacketSink>(&mut self, ts: &[u8], sink: &mut S) {
        let Some(header) = TsHeader::parse(ts) else {
            return;
        };
        self.stats.packets += 1;
        if header.transport_error {
            self.stats.corrupt_packets += 1;
            return;
        }

        let mut payload_offset = 4;
        let mut random_access = false;
        if header.adaptation_field_exists {
            let (length, rai) = parse_adaptation_field(&ts[4..]);
            payload_offset = 5 + length;
            random_access = rai;
        }
        let payload: &[u8] = if header.payload_exists && payload_offset < ts.len() {
            &ts[payload_offset..]
        } else {
            &[]
        };

        let pid = header.pid;
        let mut pts = None;
        if pid == PAT_PID {
            if header.payload_unit_start {
                let pmt_pids = parse_pat(payload);
                if !pmt_pids.is_empty() {
                    self.pmt_pids = pmt_pids;
                }
            }
        } else if self.pmt_pids.contains(&pid) {
            if header.payload_unit_start {
                let entries = parse_pmt(payload);
                if !entries.is_empty() {
                    sink.program(&entries);
                }
            }
        } else if pid != NULL_PID && !payload.is_empty() && sink.wants_pes(pid) {
            if header.payload_unit_start {
                if let Some(previous) = self.assemblers.remove(&pid) {
                    if let Some(unit) = previous.finish(pid) {
                        sink.pes(unit);
                    }
                }
                pts = parse_pes_header(payload).and_then(|h| h.pts);
                self.assemblers.insert(pid, PesAssembler::start(payload));
            } else if let Some(assembler) = self.assemblers.get_mut(&pid) {
                assembler.extend(payload);
            }
        }

        sink.packet(&PacketInfo {
            pid,
            payload_len: payload.len(),
            pts,
            random_access,
        });
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn detect_packet_size(buf: &[u8]) -> usize {
    // Look for sync bytes at 188-byte intervals
    let mut ts_score = 0;
    for i in 0..5 {
        let offset = i * TS_PACKET_SIZE;
        if offset < buf.len() && buf[offset] == TS_SYNC_BYTE {
            ts_score += 1;
        }
    }

    // Look for sync bytes at 192-byte intervals (M2TS)
    let mut m2ts_score = 0;
    for i in 0..5 {
        let offset = i * M2TS_PACKET_SIZE + 4;
        if offset < buf.len() && buf[offset] == TS_SYNC_BYTE {
            m2ts_score += 1;
        }
    }

    if ts_score > m2ts_score {
        TS_PACKET_SIZE
    } else {
        M2TS_PACKET_SIZE
    }
}

/// Bytes to skip until the next packet whose sync byte is confirmed one
/// packet later (or sits in the final packet of the buffer).
fn find_sync(buf: &[u8], packet_size: usize, sync_offset: usize) -> Option<usize> {
    (1..=packet_size).find(|&skip| {
        let at = skip + sync_offset;
        at < buf.len()
            && buf[at] == TS_SYNC_BYTE
            && (at + packet_size >= buf.len() || buf[at + packet_size] == TS_SYNC_BYTE)
    })
}
