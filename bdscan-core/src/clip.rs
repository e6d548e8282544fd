//! A clip: one container file, its optional interleaved companion, and the
//! single set of streams every playlist referencing it reads from.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::clip_info::ClipInfo;
use crate::settings::Settings;
use crate::stream::Stream;
use crate::timeline::{Bucket, Timeline};
use crate::vfs::FileRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ClipStatus {
    #[default]
    NotScanned,
    Scanned,
    /// Scan ended with an error; statistics are partial.
    Failed,
}

/// Accounting gathered while scanning, keyed by 45 kHz PTS tick.
#[derive(Debug, Clone, Default)]
pub struct ClipTimelines {
    /// Payload bytes per PID.
    pub streams: BTreeMap<u16, Timeline>,
    /// Every packet of the file, whatever its PID.
    pub packets: Timeline,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Clip {
    /// Container file name, e.g. `00001.M2TS`.
    pub name: String,
    #[serde(skip)]
    pub file: Option<FileRef>,
    #[serde(skip)]
    pub interleaved: Option<FileRef>,
    /// Clip-info file this clip was described by.
    pub clip_info: Option<String>,
    pub streams: BTreeMap<u16, Stream>,
    pub stream_order: Vec<u16>,
    /// Seconds, clip time of the first presentation unit.
    pub presentation_start: Option<f64>,
    /// Seconds.
    pub length: f64,
    pub file_size: u64,
    pub interleaved_file_size: u64,
    pub packet_count: u64,
    /// 90 kHz.
    pub first_pts: Option<u64>,
    pub last_pts: Option<u64>,
    pub status: ClipStatus,
    #[serde(skip)]
    pub timelines: ClipTimelines,
}

impl Clip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attach_info(&mut self, info: ClipInfo) {
        self.clip_info = Some(info.name);
        self.streams = info.streams;
        self.stream_order = info.stream_order;
        self.presentation_start = info.presentation_start;
        self.length = info.duration.unwrap_or(0.0);
    }

    pub fn attach_file(&mut self, file: FileRef) {
        self.file_size = file.len();
        self.file = Some(file);
    }

    pub fn attach_interleaved(&mut self, file: FileRef) {
        self.interleaved_file_size = file.len();
        self.interleaved = Some(file);
    }

    /// Described by clip-info and backed by a container file.
    pub fn is_valid(&self) -> bool {
        self.clip_info.is_some() && self.file.is_some()
    }

    pub fn is_scanned(&self) -> bool {
        self.status != ClipStatus::NotScanned
    }

    /// The file a scan reads: the interleaved companion when enabled and
    /// present, the base container otherwise.
    pub fn scan_source(&self, settings: &Settings) -> Option<&FileRef> {
        match (&self.interleaved, settings.enable_ssif) {
            (Some(ssif), true) => Some(ssif),
            _ => self.file.as_ref(),
        }
    }

    pub fn scan_size(&self, settings: &Settings) -> u64 {
        self.scan_source(settings).map_or(0, |f| f.len())
    }

    /// Forget everything a previous scan accumulated.
    pub fn clear_statistics(&mut self) {
        for stream in self.streams.values_mut() {
            stream.clear_statistics();
        }
        self.timelines = ClipTimelines::default();
        self.packet_count = 0;
        self.first_pts = None;
        self.last_pts = None;
        self.status = ClipStatus::NotScanned;
    }

    /// Payload bytes and packets of `pid` inside `[time_in, time_out)`.
    pub fn stream_window(&self, pid: u16, time_in: f64, time_out: f64) -> Bucket {
        self.timelines
            .streams
            .get(&pid)
            .map_or_else(Bucket::default, |t| t.range(time_in, time_out))
    }

    /// Every packet of the file inside `[time_in, time_out)`.
    pub fn packet_window(&self, time_in: f64, time_out: f64) -> Bucket {
        self.timelines.packets.range(time_in, time_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;
    use crate::timeline::TICKS_PER_SECOND;
    use crate::vfs::MemoryFile;
    use std::sync::Arc;

    #[test]
    fn interleaved_companion_wins_when_enabled() {
        let mut clip = Clip::new("00001.M2TS");
        clip.attach_file(Arc::new(MemoryFile::new("00001.M2TS", vec![0u8; 10])));
        clip.attach_interleaved(Arc::new(MemoryFile::new("00001.SSIF", vec![0u8; 25])));

        let settings = Settings::default();
        assert_eq!(clip.scan_size(&settings), 25);
        let plain = Settings {
            enable_ssif: false,
            ..Settings::default()
        };
        assert_eq!(clip.scan_size(&plain), 10);
        assert_eq!((clip.file_size, clip.interleaved_file_size), (10, 25));
    }

    #[test]
    fn clearing_resets_scan_state() {
        let mut clip = Clip::new("00002.M2TS");
        let mut stream = Stream::new(0x1100, StreamType::Ac3);
        stream.payload_bytes = 500;
        clip.streams.insert(0x1100, stream);
        clip.timelines.packets.add(3 * TICKS_PER_SECOND, 192, 1);
        clip.timelines.streams.entry(0x1100).or_default().add(3 * TICKS_PER_SECOND, 500, 1);
        clip.packet_count = 1;
        clip.status = ClipStatus::Scanned;

        assert_eq!(clip.stream_window(0x1100, 3.0, 4.0).bytes, 500);
        clip.clear_statistics();
        assert_eq!(clip.streams[&0x1100].payload_bytes, 0);
        assert_eq!(clip.packet_window(0.0, 10.0), Bucket::default());
        assert!(!clip.is_scanned());
    }
}
