// STREAM FILE SCAN - one container file through the demuxer into its clip
//
// The scanner is the PacketSink that turns demuxed packets into clip
// statistics: per-PID payload counters, timelines keyed by PTS tick and
// whatever the codec analyzers learn from reassembled PES units.
//
// Timelines use each PID's own last PTS as its clock, so every packet is
// stamped with the PES it belongs to. Packets seen before a PID's first PTS
// are held and credited to that first tick.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::clip::{Clip, ClipStatus};
use crate::codec::CodecAnalyzer;
use crate::error::{Result, ScanError};
use crate::settings::Settings;
use crate::stream::{Stream, StreamDetails, StreamType};
use crate::timeline::{tick_of_pts, tick_of_seconds, Bucket};
use crate::ts_demux::{DemuxStats, PacketInfo, PacketSink, PesUnit, PmtEntry, TsDemuxer, M2TS_PACKET_SIZE};

const PTS_PER_SECOND: u64 = 90_000;

// ============================================================================
// Clip Scanner
// ============================================================================

pub struct ClipScanner<'a, P>
where
    P: FnMut(u64) -> bool,
{
    clip: &'a mut Clip,
    extended: bool,
    analyzers: BTreeMap<u16, CodecAnalyzer>,
    /// Current 45 kHz tick per PID.
    clocks: BTreeMap<u16, u64>,
    /// Payload seen on a PID before its first PTS.
    held: BTreeMap<u16, Bucket>,
    /// Latest tick on any PID.
    clock: Option<u64>,
    held_packets: u64,
    poll: P,
}

impl<'a, P> ClipScanner<'a, P>
where
    P: FnMut(u64) -> bool,
{
    /// `poll` receives the byte offset reached and returns `false` to stop.
    pub fn new(clip: &'a mut Clip, extended: bool, poll: P) -> Self {
        Self {
            clip,
            extended,
            analyzers: BTreeMap::new(),
            clocks: BTreeMap::new(),
            held: BTreeMap::new(),
            clock: None,
            held_packets: 0,
            poll,
        }
    }

    /// Settle held counters and derive clip-wide rates.
    pub fn finish(self, status: ClipStatus) {
        let clip = self.clip;
        let fallback = self
            .clock
            .or_else(|| clip.presentation_start.map(tick_of_seconds))
            .unwrap_or(0);

        for (pid, held) in self.held {
            clip.timelines
                .streams
                .entry(pid)
                .or_default()
                .add(fallback, held.bytes, held.packets);
        }
        if self.held_packets > 0 {
            clip.timelines.packets.add(
                fallback,
                self.held_packets * M2TS_PACKET_SIZE as u64,
                self.held_packets,
            );
        }

        if clip.length <= 0.0 {
            if let (Some(first), Some(last)) = (clip.first_pts, clip.last_pts) {
                clip.length = (last - first) as f64 / PTS_PER_SECOND as f64;
            }
        }
        let length = clip.length;
        for (pid, stream) in clip.streams.iter_mut() {
            if length > 0.0 {
                stream.bit_rate = (stream.payload_bytes as f64 * 8.0 / length).round() as u64;
                stream.active_bit_rate = stream.bit_rate;
            }
            if !self.extended {
                continue;
            }
            if let (StreamDetails::Video(video), Some(timeline)) =
                (&mut stream.details, clip.timelines.streams.get(pid))
            {
                video.peak_bit_rates = timeline.peaks();
            }
        }
        clip.status = status;
    }
}

impl<P> PacketSink for ClipScanner<'_, P>
where
    P: FnMut(u64) -> bool,
{
    fn packet(&mut self, packet: &PacketInfo) {
        let clip = &mut *self.clip;
        let pid = packet.pid;
        clip.packet_count += 1;

        if let Some(pts) = packet.pts {
            let tick = tick_of_pts(pts);
            clip.first_pts = Some(clip.first_pts.map_or(pts, |first| first.min(pts)));
            clip.last_pts = Some(clip.last_pts.map_or(pts, |last| last.max(pts)));
            self.clocks.insert(pid, tick);
            if let Some(held) = self.held.remove(&pid) {
                clip.timelines
                    .streams
                    .entry(pid)
                    .or_default()
                    .add(tick, held.bytes, held.packets);
            }
            if self.clock.is_none() && self.held_packets > 0 {
                clip.timelines.packets.add(
                    tick,
                    self.held_packets * M2TS_PACKET_SIZE as u64,
                    self.held_packets,
                );
                self.held_packets = 0;
            }
            self.clock = Some(tick);
        }

        match self.clock {
            Some(tick) => clip.timelines.packets.add(tick, M2TS_PACKET_SIZE as u64, 1),
            None => self.held_packets += 1,
        }

        let Some(stream) = clip.streams.get_mut(&pid) else {
            return;
        };
        if let Some(pts) = packet.pts {
            stream.first_pts = Some(stream.first_pts.map_or(pts, |first| first.min(pts)));
            stream.last_pts = Some(stream.last_pts.map_or(pts, |last| last.max(pts)));
        }
        let bytes = packet.payload_len as u64;
        stream.packet_count += 1;
        stream.payload_bytes += bytes;
        match self.clocks.get(&pid) {
            Some(&tick) => clip.timelines.streams.entry(pid).or_default().add(tick, bytes, 1),
            None => {
                let held = self.held.entry(pid).or_default();
                held.bytes += bytes;
                held.packets += 1;
            }
        }
    }

    fn pes(&mut self, unit: PesUnit) {
        let Some(stream) = self.clip.streams.get_mut(&unit.pid) else {
            return;
        };
        self.analyzers
            .entry(unit.pid)
            .or_insert_with(|| CodecAnalyzer::for_stream_type(stream.stream_type))
            .analyze(&unit.data, stream, self.extended);
    }

    fn program(&mut self, entries: &[PmtEntry]) {
        for entry in entries {
            if self.clip.streams.contains_key(&entry.pid) {
                continue;
            }
            let stream_type = StreamType::from_code(entry.stream_type);
            if matches!(stream_type, StreamType::Unknown(_)) {
                continue;
            }
            debug!(
                "{}: PID 0x{:04X} ({}) only announced by the PMT",
                self.clip.name,
                entry.pid,
                stream_type.codec_name()
            );
            let mut stream = Stream::new(entry.pid, stream_type);
            stream.language = entry.language.clone();
            self.clip.stream_order.push(entry.pid);
            self.clip.streams.insert(entry.pid, stream);
        }
    }

    fn wants_pes(&self, pid: u16) -> bool {
        self.clip
            .streams
            .get(&pid)
            .is_some_and(|s| CodecAnalyzer::inspects(s.stream_type))
    }

    fn poll(&mut self, position: u64) -> bool {
        (self.poll)(position)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Scan the clip's container file (or its interleaved companion).
///
/// A corrupt file leaves partial statistics behind and the clip marked
/// failed. A stop requested through `poll` returns [`ScanError::ScanAborted`]
/// with the clip half-filled; the caller is expected to clear it.
pub fn scan_clip<P>(clip: &mut Clip, settings: &Settings, poll: P) -> Result<DemuxStats>
where
    P: FnMut(u64) -> bool,
{
    let Some(file) = clip.scan_source(settings).cloned() else {
        return Err(ScanError::corrupt(&clip.name, "no container file"));
    };
    let name = file.name();
    info!("Scanning {} ({} bytes)", name, file.len());

    let reader = file.open_read()?;
    let mut scanner = ClipScanner::new(clip, settings.extended_stream_diagnostics, poll);
    let outcome = TsDemuxer::new(reader, name.as_str(), settings.max_resync_failures).run(&mut scanner);

    match outcome {
        Ok(stats) if stats.stopped => {
            info!("{}: stopped at offset {}", name, stats.bytes_read);
            Err(ScanError::ScanAborted)
        }
        Ok(stats) => {
            scanner.finish(ClipStatus::Scanned);
            debug!(
                "{}: {} packets, {} corrupt, {} resyncs",
                name, stats.packets, stats.corrupt_packets, stats.resyncs
            );
            Ok(stats)
        }
        Err(e) => {
            warn!("{}: {}", name, e);
            scanner.finish(ClipStatus::Failed);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FrameKind;
    use crate::test_support::{ac3_frame, avc_access_unit, pgs_display_set, TsBuilder};
    use crate::vfs::MemoryFile;
    use std::sync::Arc;

    fn clip_with(bytes: Vec<u8>, streams: &[(u16, StreamType)]) -> Clip {
        let mut clip = Clip::new("00001.M2TS");
        for &(pid, stream_type) in streams {
            clip.streams.insert(pid, Stream::new(pid, stream_type));
            clip.stream_order.push(pid);
        }
        clip.length = 3.0;
        clip.attach_file(Arc::new(MemoryFile::new("00001.M2TS", bytes)));
        clip
    }

    #[test]
    fn counts_payload_per_second() {
        let mut builder = TsBuilder::new().pat_pmt(&[(0x1100, 0x81)]);
        for i in 0..6u64 {
            // two frames per second, starting at 10 s
            builder = builder.pes(0x1100, 0xBD, Some(900_000 + i * 45_000), &ac3_frame(0, 0x24, 7, true, 27));
        }
        let mut clip = clip_with(builder.build(), &[(0x1100, StreamType::Ac3)]);

        let stats = scan_clip(&mut clip, &Settings::default(), |_| true).expect("scan");
        assert_eq!(clip.status, ClipStatus::Scanned);
        assert_eq!(clip.packet_count, stats.packets);
        assert_eq!(clip.first_pts, Some(900_000));
        assert_eq!(clip.streams[&0x1100].first_pts, Some(900_000));
        assert_eq!(clip.streams[&0x1100].last_pts, Some(900_000 + 5 * 45_000));

        let stream = &clip.streams[&0x1100];
        assert_eq!(stream.packet_count, 6);
        assert!(stream.is_initialized);
        assert_eq!(stream.audio().unwrap().channels, 5);
        assert_eq!(stream.bit_rate, (stream.payload_bytes as f64 * 8.0 / 3.0).round() as u64);

        assert_eq!(clip.stream_window(0x1100, 10.0, 11.0).packets, 2);
        assert_eq!(clip.stream_window(0x1100, 10.0, 13.0).bytes, stream.payload_bytes);
        // PAT and PMT precede the first PTS and land on its tick
        assert_eq!(clip.packet_window(10.0, 13.0).packets, clip.packet_count);
    }

    #[test]
    fn pmt_only_streams_are_added() {
        let bytes = TsBuilder::new()
            .pat_pmt(&[(0x1011, 0x1B), (0x1200, 0x90)])
            .pes(0x1011, 0xE0, Some(90_000), &avc_access_unit(true, 7, 300))
            .pes(0x1200, 0xBD, Some(90_000), &pgs_display_set(1920, 1080, 1, false, 1))
            .build();
        let mut clip = clip_with(bytes, &[(0x1011, StreamType::AvcVideo)]);
        scan_clip(&mut clip, &Settings::default(), |_| true).expect("scan");

        assert_eq!(clip.stream_order, vec![0x1011, 0x1200]);
        let video = clip.streams[&0x1011].video().unwrap();
        assert_eq!(video.height, 1080);
        assert_eq!(video.frame_types[&FrameKind::I].count, 1);
        assert!(video.peak_bit_rates.one_second > 0);
        assert_eq!(clip.streams[&0x1200].graphics().unwrap().captions, 1);
    }

    #[test]
    fn stop_request_aborts() {
        let mut builder = TsBuilder::new();
        for i in 0..20u64 {
            builder = builder.pes(0x1100, 0xBD, Some(i * 3000), &[0xAA; 100]);
        }
        let mut clip = clip_with(builder.build(), &[(0x1100, StreamType::Ac3)]);
        let err = scan_clip(&mut clip, &Settings::default(), |offset| offset < 2000).unwrap_err();
        assert!(err.is_abort());
        assert!(clip.packet_count < 20);
        assert_eq!(clip.status, ClipStatus::NotScanned);
    }

    #[test]
    fn corrupt_file_keeps_partial_statistics() {
        let mut bytes = TsBuilder::new()
            .pes(0x1100, 0xBD, Some(0), &[0xAA; 100])
            .build();
        bytes.extend(std::iter::repeat(0u8).take(M2TS_PACKET_SIZE * 80));
        let mut clip = clip_with(bytes, &[(0x1100, StreamType::Ac3)]);
        let err = scan_clip(&mut clip, &Settings::default(), |_| true).unwrap_err();
        assert!(matches!(err, ScanError::StreamFileCorrupt { .. }));
        assert_eq!(clip.status, ClipStatus::Failed);
        assert_eq!(clip.streams[&0x1100].packet_count, 1);
    }
}
