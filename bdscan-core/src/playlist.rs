//! Movie playlist (`PLAYLIST/*.MPLS`) parser and validity policy.
//!
//! ```text
//!   0  type indicator   "MPLS0100" | "MPLS0200" | "MPLS0300"
//!   8  PlayList start address
//!  12  PlayListMark start address
//! ```
//!
//! The parser always hands back a best-effort [`Playlist`]; whether that
//! playlist counts is a separate [`Playlist::verdict`] under the caller's
//! [`Settings`].

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use tracing::debug;

use crate::clip_info::stream_from_coding_info;
use crate::error::{Result, ScanError};
use crate::reader::ByteReader;
use crate::settings::Settings;
use crate::stream::Stream;

const TYPE_INDICATOR: &str = "MPLS";
const VERSIONS: [&str; 3] = ["0100", "0200", "0300"];
const HEADER_LENGTH: u64 = 20;
const TICKS_PER_SECOND: f64 = 45_000.0;
const CHAPTER_MARK_ENTRY: u32 = 1;

// ============================================================================
// Types
// ============================================================================

/// One clip as this playlist sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamClip {
    /// Container file name, e.g. `00001.M2TS`; key into the disc's clips.
    pub clip_name: String,
    /// Play item index.
    pub index: usize,
    /// 0 for the main path, 1.. for alternate angles.
    pub angle_index: u32,
    pub connection_condition: u8,
    /// Clip presentation time, seconds.
    pub time_in: f64,
    pub time_out: f64,
    /// Playlist time, seconds.
    pub relative_time_in: f64,
    pub relative_time_out: f64,
    pub length: f64,
    /// Scanned source packets falling inside `[time_in, time_out)`.
    pub packet_count: u64,
    pub file_size: u64,
    pub interleaved_file_size: u64,
}

impl StreamClip {
    /// Bytes of 192-byte source packets inside this entry's window.
    pub fn packet_size(&self) -> u64 {
        self.packet_count * 192
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    NoClips,
    MissingClips,
    Looping,
    TooShort,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Playlist {
    pub name: String,
    pub file_type: String,
    /// Angle-0 entries in play order, each followed by its alternate angles.
    pub stream_clips: Vec<StreamClip>,
    /// Chapter starts, playlist seconds.
    pub chapters: Vec<f64>,
    /// Merged streams for the main path. Starts as the selection table.
    pub streams: BTreeMap<u16, Stream>,
    /// Merged streams per alternate angle (index 0 = angle 1).
    pub angle_streams: Vec<BTreeMap<u16, Stream>>,
    /// PIDs in selection-table order; becomes display order after resolution.
    pub stream_order: Vec<u16>,
    pub total_length: f64,
    pub angle_count: u32,
    /// Highest number of extra repetitions of one clip + in + out entry.
    pub loop_repeats: u32,
    pub has_hidden_tracks: bool,
    pub missing_clips: Vec<String>,
    pub valid: bool,
    pub invalid_reasons: Vec<InvalidReason>,
    pub file_size: u64,
    pub interleaved_file_size: u64,
    /// File size actually read when scanning (interleaved if enabled and present).
    pub estimated_size: u64,
    /// Scanned packet bytes, main path only.
    pub total_size: u64,
    /// Scanned packet bytes, every angle.
    pub total_angle_size: u64,
    pub anomalies: Vec<String>,
}

impl Playlist {
    pub fn main_clips(&self) -> impl Iterator<Item = &StreamClip> {
        self.stream_clips.iter().filter(|c| c.angle_index == 0)
    }

    pub fn angle_clips(&self, angle: u32) -> impl Iterator<Item = &StreamClip> {
        self.stream_clips.iter().filter(move |c| c.angle_index == angle)
    }

    pub fn references(&self, clip_name: &str) -> bool {
        self.stream_clips.iter().any(|c| c.clip_name == clip_name)
    }

    pub fn is_multi_angle(&self) -> bool {
        self.angle_count > 0
    }

    pub fn is_looping(&self, settings: &Settings) -> bool {
        self.loop_repeats > settings.loop_repeat_tolerance
    }

    /// Why this playlist should be left out of disc statistics under
    /// `settings`. Empty means valid.
    pub fn verdict(&self, settings: &Settings) -> Vec<InvalidReason> {
        let mut reasons = Vec::new();
        if self.main_clips().next().is_none() {
            reasons.push(InvalidReason::NoClips);
        }
        if !self.missing_clips.is_empty() {
            reasons.push(InvalidReason::MissingClips);
        }
        if settings.filter_looping_playlists && self.is_looping(settings) {
            reasons.push(InvalidReason::Looping);
        }
        if let Some(min) = settings.min_playlist_length() {
            if self.total_length < min {
                reasons.push(InvalidReason::TooShort);
            }
        }
        reasons
    }

    pub fn apply_verdict(&mut self, settings: &Settings) {
        self.invalid_reasons = self.verdict(settings);
        self.valid = self.invalid_reasons.is_empty();
    }
}

// ============================================================================
// Parsing
// ============================================================================

type Reader<'a> = ByteReader<Cursor<&'a [u8]>>;

pub fn parse_playlist(name: &str, data: &[u8]) -> Result<Playlist> {
    parse(name, data).map_err(|e| e.in_file(name))
}

fn parse(name: &str, data: &[u8]) -> Result<Playlist> {
    let mut reader = ByteReader::new(Cursor::new(data))?;
    if reader.len() < HEADER_LENGTH {
        return Err(ScanError::malformed(name, "file too short for playlist header"));
    }

    let file_type = reader.read_ascii(8)?;
    if !file_type.starts_with(TYPE_INDICATOR) || !VERSIONS.contains(&&file_type[4..]) {
        return Err(ScanError::malformed(
            name,
            format!("unknown file type {:?}", file_type),
        ));
    }

    let playlist_start = reader.read_u32()? as u64;
    let marks_start = reader.read_u32()? as u64;
    if playlist_start < HEADER_LENGTH || playlist_start >= reader.len() {
        return Err(ScanError::malformed(
            name,
            format!("playlist address {} out of range", playlist_start),
        ));
    }

    let mut playlist = Playlist {
        name: name.to_string(),
        file_type,
        ..Default::default()
    };

    read_play_items(&mut reader, playlist_start, &mut playlist)?;
    count_loops(&mut playlist);

    if marks_start > 0 {
        if let Err(e) = read_marks(&mut reader, marks_start, &mut playlist) {
            playlist.anomalies.push(format!("marks: {}", e));
        }
    }

    if !playlist.anomalies.is_empty() {
        debug!("{}: {:?}", name, playlist.anomalies);
    }
    Ok(playlist)
}

fn read_play_items(reader: &mut Reader<'_>, start: u64, playlist: &mut Playlist) -> Result<()> {
    reader.seek_to(start)?;
    let _length = reader.read_u32()?;
    reader.skip(2)?;
    let item_count = reader.read_u16()?;
    let _subpath_count = reader.read_u16()?;

    for index in 0..item_count as usize {
        if let Err(e) = read_play_item(reader, index, playlist) {
            // items are chained by their own length; a broken one ends the list
            playlist.anomalies.push(format!("play item {}: {}", index, e));
            break;
        }
    }
    Ok(())
}

fn read_play_item(reader: &mut Reader<'_>, index: usize, playlist: &mut Playlist) -> Result<()> {
    let item_start = reader.position()?;
    let item_length = reader.read_u16()? as u64;
    let item_end = item_start + 2 + item_length;
    if item_end > reader.len() {
        return Err(ScanError::UnexpectedEndOfData);
    }

    let clip_id = reader.read_ascii(5)?;
    let _codec_id = reader.read_ascii(4)?;
    reader.skip(1)?;
    let flags = reader.read_u8()?;
    let multi_angle = (flags >> 4) & 0x01 == 1;
    let connection_condition = flags & 0x0F;
    reader.skip(1)?;
    let time_in = reader.read_u32()? as f64 / TICKS_PER_SECOND;
    let time_out = reader.read_u32()? as f64 / TICKS_PER_SECOND;
    reader.skip(12)?;

    let length = (time_out - time_in).max(0.0);
    let relative_time_in = playlist.total_length;
    let main = StreamClip {
        clip_name: clip_file_name(&clip_id),
        index,
        angle_index: 0,
        connection_condition,
        time_in,
        time_out,
        relative_time_in,
        relative_time_out: relative_time_in + length,
        length,
        ..Default::default()
    };
    playlist.total_length += length;

    let mut angles = Vec::new();
    if multi_angle {
        let angle_count = reader.read_u8()?;
        reader.skip(1)?;
        for angle in 1..angle_count as u32 {
            let angle_clip = reader.read_ascii(5)?;
            reader.skip(4)?;
            reader.skip(1)?;
            angles.push(StreamClip {
                clip_name: clip_file_name(&angle_clip),
                angle_index: angle,
                ..main.clone()
            });
        }
        playlist.angle_count = playlist.angle_count.max(angle_count.saturating_sub(1) as u32);
    }

    playlist.stream_clips.push(main);
    playlist.stream_clips.extend(angles);

    read_stream_table(reader, item_end, playlist)?;
    reader.seek_to(item_end)
}

/// STN table: which PIDs this playlist enables.
fn read_stream_table(reader: &mut Reader<'_>, item_end: u64, playlist: &mut Playlist) -> Result<()> {
    let _length = reader.read_u16()?;
    reader.skip(2)?;
    let video = reader.read_u8()?;
    let audio = reader.read_u8()?;
    let pg = reader.read_u8()?;
    let ig = reader.read_u8()?;
    let secondary_audio = reader.read_u8()?;
    let secondary_video = reader.read_u8()?;
    let _pip_pg = reader.read_u8()?;
    reader.skip(5)?;

    for _ in 0..(video as u32 + audio as u32 + pg as u32 + ig as u32) {
        read_stream_entry(reader, item_end, playlist)?;
    }
    for _ in 0..secondary_audio {
        read_stream_entry(reader, item_end, playlist)?;
        reader.skip(2)?;
    }
    for _ in 0..secondary_video {
        read_stream_entry(reader, item_end, playlist)?;
        reader.skip(6)?;
    }
    Ok(())
}

fn read_stream_entry(reader: &mut Reader<'_>, item_end: u64, playlist: &mut Playlist) -> Result<()> {
    let entry_start = reader.position()?;
    let entry_length = reader.read_u8()? as u64;
    let entry_type = reader.read_u8()?;
    let pid = match entry_type {
        1 => reader.read_u16()?,
        2 | 4 => {
            reader.skip(2)?;
            reader.read_u16()?
        }
        3 => {
            reader.skip(1)?;
            reader.read_u16()?
        }
        other => {
            playlist.anomalies.push(format!("stream entry type {}", other));
            0
        }
    };
    reader.seek_to(entry_start + entry_length + 1)?;

    let coding_length = reader.read_u8()? as usize;
    if coding_length == 0 || reader.position()? + coding_length as u64 > item_end {
        return Err(ScanError::UnexpectedEndOfData);
    }
    let coding = reader.read_bytes(coding_length)?;

    if (1..=4).contains(&entry_type) && !playlist.streams.contains_key(&pid) {
        playlist.stream_order.push(pid);
        playlist.streams.insert(pid, stream_from_coding_info(pid, &coding));
    }
    Ok(())
}

fn read_marks(reader: &mut Reader<'_>, start: u64, playlist: &mut Playlist) -> Result<()> {
    reader.seek_to(start + 4)?;
    let count = reader.read_u16()?;
    let items: Vec<StreamClip> = playlist.main_clips().cloned().collect();

    for _ in 0..count {
        let entry = reader.position()?;
        reader.skip(1)?;
        let mark_type = reader.read_u8()? as u32;
        let item_ref = reader.read_u16()? as usize;
        let time = reader.read_u32()? as f64 / TICKS_PER_SECOND;
        reader.seek_to(entry + 14)?;

        if mark_type != CHAPTER_MARK_ENTRY {
            continue;
        }
        let Some(item) = items.get(item_ref) else {
            playlist.anomalies.push(format!("mark references play item {}", item_ref));
            continue;
        };
        let relative = time - item.time_in + item.relative_time_in;
        if playlist.total_length - relative > 1.0 {
            playlist.chapters.push(relative);
        }
    }
    Ok(())
}

fn count_loops(playlist: &mut Playlist) {
    let mut seen: HashMap<(String, u64, u64), u32> = HashMap::new();
    for clip in playlist.main_clips() {
        let key = (
            clip.clip_name.clone(),
            (clip.time_in * TICKS_PER_SECOND).round() as u64,
            (clip.time_out * TICKS_PER_SECOND).round() as u64,
        );
        *seen.entry(key).or_default() += 1;
    }
    playlist.loop_repeats = seen.values().map(|n| n - 1).max().unwrap_or(0);
}

fn clip_file_name(clip_id: &str) -> String {
    format!("{}.M2TS", clip_id.to_ascii_uppercase())
}
