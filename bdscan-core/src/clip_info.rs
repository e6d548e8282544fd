//! Clip information (`CLIPINF/*.CLPI`) parser.
//!
//! Layout of the parts we read:
//!
//! ```text
//!   0  type indicator   "HDMV0100" | "HDMV0200" | "HDMV0300"
//!   8  SequenceInfo start address
//!  12  ProgramInfo start address
//!  40  ClipInfo (length, stream type, TS recording rate, source packet count)
//! ```
//!
//! ProgramInfo lists every elementary stream as PID + StreamCodingInfo.
//! Anything past the mandatory header is parsed leniently: a bad entry is
//! noted in `anomalies` and skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::reader::ByteReader;
use crate::stream::{
    AspectRatio, ChannelLayout, CodecKind, FrameRate, SampleRate, Stream, StreamDetails,
    StreamType, VideoFormat,
};

const TYPE_INDICATOR: &str = "HDMV";
const VERSIONS: [&str; 3] = ["0100", "0200", "0300"];
const CLIP_INFO_OFFSET: u64 = 40;
const TICKS_PER_SECOND: f64 = 45_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipInfo {
    pub name: String,
    pub file_type: String,
    pub streams: BTreeMap<u16, Stream>,
    /// PIDs in declaration order.
    pub stream_order: Vec<u16>,
    /// Seconds, start of the first STC sequence.
    pub presentation_start: Option<f64>,
    /// Seconds, sum over STC sequences.
    pub duration: Option<f64>,
    /// Bytes per second.
    pub recording_rate: u32,
    pub source_packet_count: u32,
    pub anomalies: Vec<String>,
}

pub fn parse_clip_info(name: &str, data: &[u8]) -> Result<ClipInfo> {
    parse(name, data).map_err(|e| e.in_file(name))
}

fn parse(name: &str, data: &[u8]) -> Result<ClipInfo> {
    let mut reader = ByteReader::new(Cursor::new(data))?;
    if reader.len() < CLIP_INFO_OFFSET {
        return Err(ScanError::malformed(name, "file too short for clip info header"));
    }

    let file_type = reader.read_ascii(8)?;
    if !file_type.starts_with(TYPE_INDICATOR) || !VERSIONS.contains(&&file_type[4..]) {
        return Err(ScanError::malformed(
            name,
            format!("unknown file type {:?}", file_type),
        ));
    }

    let sequence_start = reader.read_u32()? as u64;
    let program_start = reader.read_u32()? as u64;
    if program_start == 0 || program_start >= reader.len() {
        return Err(ScanError::malformed(
            name,
            format!("program info address {} out of range", program_start),
        ));
    }

    let mut info = ClipInfo {
        name: name.to_string(),
        file_type,
        ..Default::default()
    };

    if let Err(e) = read_clip_info(&mut reader, &mut info) {
        info.anomalies.push(format!("clip info: {}", e));
    }
    if sequence_start > 0 {
        if let Err(e) = read_sequence_info(&mut reader, sequence_start, &mut info) {
            info.anomalies.push(format!("sequence info: {}", e));
        }
    }
    read_program_info(&mut reader, program_start, &mut info)?;

    if !info.anomalies.is_empty() {
        debug!("{}: {} anomalies: {:?}", name, info.anomalies.len(), info.anomalies);
    }
    Ok(info)
}

fn read_clip_info(reader: &mut ByteReader<Cursor<&[u8]>>, info: &mut ClipInfo) -> Result<()> {
    reader.seek_to(CLIP_INFO_OFFSET)?;
    let _length = reader.read_u32()?;
    reader.skip(2)?;
    let _clip_stream_type = reader.read_u8()?;
    let _application_type = reader.read_u8()?;
    reader.skip(4)?;
    info.recording_rate = reader.read_u32()?;
    info.source_packet_count = reader.read_u32()?;
    Ok(())
}

fn read_sequence_info(
    reader: &mut ByteReader<Cursor<&[u8]>>,
    start: u64,
    info: &mut ClipInfo,
) -> Result<()> {
    reader.seek_to(start)?;
    let _length = reader.read_u32()?;
    reader.skip(1)?;
    let atc_count = reader.read_u8()?;

    let mut duration = 0.0;
    for _ in 0..atc_count {
        let _spn_atc_start = reader.read_u32()?;
        let stc_count = reader.read_u8()?;
        let _offset_stc_id = reader.read_u8()?;
        for _ in 0..stc_count {
            let _pcr_pid = reader.read_u16()?;
            let _spn_stc_start = reader.read_u32()?;
            let begin = reader.read_u32()? as f64 / TICKS_PER_SECOND;
            let end = reader.read_u32()? as f64 / TICKS_PER_SECOND;
            if info.presentation_start.is_none() {
                info.presentation_start = Some(begin);
            }
            if end > begin {
                duration += end - begin;
            }
        }
    }
    if duration > 0.0 {
        info.duration = Some(duration);
    }
    Ok(())
}

fn read_program_info(
    reader: &mut ByteReader<Cursor<&[u8]>>,
    start: u64,
    info: &mut ClipInfo,
) -> Result<()> {
    reader.seek_to(start)?;
    let length = reader.read_u32()? as u64;
    let end = start + 4 + length;
    if end > reader.len() {
        return Err(ScanError::malformed(
            &info.name,
            format!("program info length {} exceeds file", length),
        ));
    }

    reader.skip(1)?;
    let program_count = reader.read_u8()?;
    for program in 0..program_count {
        let header = (|| -> Result<u8> {
            let _spn_program_sequence_start = reader.read_u32()?;
            let _program_map_pid = reader.read_u16()?;
            let stream_count = reader.read_u8()?;
            let _group_count = reader.read_u8()?;
            Ok(stream_count)
        })();
        let stream_count = match header {
            Ok(n) => n,
            Err(e) => {
                info.anomalies.push(format!("program {}: {}", program, e));
                return Ok(());
            }
        };

        for index in 0..stream_count {
            match read_stream_entry(reader, end) {
                Ok(stream) => {
                    if info.streams.contains_key(&stream.pid) {
                        info.anomalies
                            .push(format!("duplicate PID 0x{:04X} ignored", stream.pid));
                        continue;
                    }
                    info.stream_order.push(stream.pid);
                    info.streams.insert(stream.pid, stream);
                }
                Err(e) => {
                    info.anomalies
                        .push(format!("program {} stream {}: {}", program, index, e));
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn read_stream_entry(reader: &mut ByteReader<Cursor<&[u8]>>, end: u64) -> Result<Stream> {
    let pid = reader.read_u16()?;
    let coding_length = reader.read_u8()? as usize;
    if reader.position()? + coding_length as u64 > end || coding_length == 0 {
        return Err(ScanError::UnexpectedEndOfData);
    }
    let coding = reader.read_bytes(coding_length)?;
    Ok(stream_from_coding_info(pid, &coding))
}

/// Build a stream from a StreamCodingInfo body (coding type byte first).
///
/// Shared with the playlist STN table, which uses the same attribute layout.
pub(crate) fn stream_from_coding_info(pid: u16, coding: &[u8]) -> Stream {
    let stream_type = StreamType::from_code(coding[0]);
    let mut stream = Stream::new(pid, stream_type);
    let attr = |i: usize| coding.get(i).copied().unwrap_or(0);

    match (&mut stream.details, stream_type.kind()) {
        (StreamDetails::Video(v), CodecKind::Video) => {
            v.format = VideoFormat::from_code(attr(1) >> 4);
            v.frame_rate = FrameRate::from_code(attr(1) & 0x0F);
            v.aspect_ratio = AspectRatio::from_code(attr(2) >> 4);
            v.interlaced = v.format.is_interlaced();
        }
        (StreamDetails::Audio(a), CodecKind::Audio) => {
            a.channel_layout = ChannelLayout::from_code(attr(1) >> 4);
            a.sample_rate = SampleRate::from_code(attr(1) & 0x0F);
            stream.language = language_at(coding, 2);
        }
        (StreamDetails::Graphics(_), CodecKind::Graphics) => {
            stream.language = language_at(coding, 1);
        }
        (_, CodecKind::TextSubtitle) => {
            stream.language = language_at(coding, 2);
        }
        _ => {}
    }
    stream
}

fn language_at(data: &[u8], offset: usize) -> Option<String> {
    let bytes = data.get(offset..offset + 3)?;
    if bytes.iter().all(|b| b.is_ascii_alphabetic()) {
        Some(String::from_utf8_lossy(bytes).to_ascii_lowercase())
    } else {
        None
    }
}
