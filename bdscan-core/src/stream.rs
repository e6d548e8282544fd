//! Elementary stream model.
//!
//! A [`Stream`] is either owned by a clip (and mutated while that clip's
//! container file is scanned) or sits in a playlist as a merge over the clip
//! streams sharing its PID.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Coding Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamType {
    Mpeg1Video,
    Mpeg2Video,
    AvcVideo,
    MvcVideo,
    HevcVideo,
    Vc1Video,
    Mpeg1Audio,
    Mpeg2Audio,
    Lpcm,
    Ac3,
    Dts,
    TrueHd,
    Ac3Plus,
    DtsHd,
    DtsHdMaster,
    Ac3PlusSecondary,
    DtsHdSecondary,
    PresentationGraphics,
    InteractiveGraphics,
    TextSubtitle,
    Unknown(u8),
}

impl StreamType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => StreamType::Mpeg1Video,
            0x02 => StreamType::Mpeg2Video,
            0x1B => StreamType::AvcVideo,
            0x20 => StreamType::MvcVideo,
            0x24 => StreamType::HevcVideo,
            0xEA => StreamType::Vc1Video,
            0x03 => StreamType::Mpeg1Audio,
            0x04 => StreamType::Mpeg2Audio,
            0x80 => StreamType::Lpcm,
            0x81 => StreamType::Ac3,
            0x82 => StreamType::Dts,
            0x83 => StreamType::TrueHd,
            0x84 => StreamType::Ac3Plus,
            0x85 => StreamType::DtsHd,
            0x86 => StreamType::DtsHdMaster,
            0xA1 => StreamType::Ac3PlusSecondary,
            0xA2 => StreamType::DtsHdSecondary,
            0x90 => StreamType::PresentationGraphics,
            0x91 => StreamType::InteractiveGraphics,
            0x92 => StreamType::TextSubtitle,
            other => StreamType::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StreamType::Mpeg1Video => 0x01,
            StreamType::Mpeg2Video => 0x02,
            StreamType::AvcVideo => 0x1B,
            StreamType::MvcVideo => 0x20,
            StreamType::HevcVideo => 0x24,
            StreamType::Vc1Video => 0xEA,
            StreamType::Mpeg1Audio => 0x03,
            StreamType::Mpeg2Audio => 0x04,
            StreamType::Lpcm => 0x80,
            StreamType::Ac3 => 0x81,
            StreamType::Dts => 0x82,
            StreamType::TrueHd => 0x83,
            StreamType::Ac3Plus => 0x84,
            StreamType::DtsHd => 0x85,
            StreamType::DtsHdMaster => 0x86,
            StreamType::Ac3PlusSecondary => 0xA1,
            StreamType::DtsHdSecondary => 0xA2,
            StreamType::PresentationGraphics => 0x90,
            StreamType::InteractiveGraphics => 0x91,
            StreamType::TextSubtitle => 0x92,
            StreamType::Unknown(code) => code,
        }
    }

    pub fn kind(self) -> CodecKind {
        match self {
            StreamType::Mpeg1Video
            | StreamType::Mpeg2Video
            | StreamType::AvcVideo
            | StreamType::MvcVideo
            | StreamType::HevcVideo
            | StreamType::Vc1Video => CodecKind::Video,
            StreamType::Mpeg1Audio
            | StreamType::Mpeg2Audio
            | StreamType::Lpcm
            | StreamType::Ac3
            | StreamType::Dts
            | StreamType::TrueHd
            | StreamType::Ac3Plus
            | StreamType::DtsHd
            | StreamType::DtsHdMaster
            | StreamType::Ac3PlusSecondary
            | StreamType::DtsHdSecondary => CodecKind::Audio,
            StreamType::PresentationGraphics | StreamType::InteractiveGraphics => {
                CodecKind::Graphics
            }
            StreamType::TextSubtitle => CodecKind::TextSubtitle,
            StreamType::Unknown(_) => CodecKind::Unknown,
        }
    }

    pub fn codec_name(self) -> &'static str {
        match self {
            StreamType::Mpeg1Video => "MPEG-1 Video",
            StreamType::Mpeg2Video => "MPEG-2 Video",
            StreamType::AvcVideo => "MPEG-4 AVC Video",
            StreamType::MvcVideo => "MPEG-4 MVC Video",
            StreamType::HevcVideo => "MPEG-H HEVC Video",
            StreamType::Vc1Video => "VC-1 Video",
            StreamType::Mpeg1Audio => "MP1/MP2 Audio",
            StreamType::Mpeg2Audio => "MPEG-2 Audio",
            StreamType::Lpcm => "LPCM Audio",
            StreamType::Ac3 => "Dolby Digital Audio",
            StreamType::Dts => "DTS Audio",
            StreamType::TrueHd => "Dolby TrueHD Audio",
            StreamType::Ac3Plus | StreamType::Ac3PlusSecondary => "Dolby Digital Plus Audio",
            StreamType::DtsHd | StreamType::DtsHdSecondary => "DTS-HD High-Res Audio",
            StreamType::DtsHdMaster => "DTS-HD Master Audio",
            StreamType::PresentationGraphics => "Presentation Graphics",
            StreamType::InteractiveGraphics => "Interactive Graphics",
            StreamType::TextSubtitle => "Subtitle",
            StreamType::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CodecKind {
    Video,
    Audio,
    Graphics,
    TextSubtitle,
    Unknown,
}

// ============================================================================
// Clip-Info Attribute Codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoFormat {
    #[default]
    Unknown,
    F480i,
    F576i,
    F480p,
    F1080i,
    F720p,
    F1080p,
    F576p,
    F2160p,
}

impl VideoFormat {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => VideoFormat::F480i,
            2 => VideoFormat::F576i,
            3 => VideoFormat::F480p,
            4 => VideoFormat::F1080i,
            5 => VideoFormat::F720p,
            6 => VideoFormat::F1080p,
            7 => VideoFormat::F576p,
            8 => VideoFormat::F2160p,
            _ => VideoFormat::Unknown,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            VideoFormat::F480i | VideoFormat::F480p => 480,
            VideoFormat::F576i | VideoFormat::F576p => 576,
            VideoFormat::F720p => 720,
            VideoFormat::F1080i | VideoFormat::F1080p => 1080,
            VideoFormat::F2160p => 2160,
            VideoFormat::Unknown => 0,
        }
    }

    pub fn is_interlaced(self) -> bool {
        matches!(
            self,
            VideoFormat::F480i | VideoFormat::F576i | VideoFormat::F1080i
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameRate {
    #[default]
    Unknown,
    Fps23_976,
    Fps24,
    Fps25,
    Fps29_97,
    Fps50,
    Fps59_94,
}

impl FrameRate {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => FrameRate::Fps23_976,
            2 => FrameRate::Fps24,
            3 => FrameRate::Fps25,
            4 => FrameRate::Fps29_97,
            6 => FrameRate::Fps50,
            7 => FrameRate::Fps59_94,
            _ => FrameRate::Unknown,
        }
    }

    /// (numerator, denominator)
    pub fn ratio(self) -> Option<(u32, u32)> {
        match self {
            FrameRate::Fps23_976 => Some((24000, 1001)),
            FrameRate::Fps24 => Some((24, 1)),
            FrameRate::Fps25 => Some((25, 1)),
            FrameRate::Fps29_97 => Some((30000, 1001)),
            FrameRate::Fps50 => Some((50, 1)),
            FrameRate::Fps59_94 => Some((60000, 1001)),
            FrameRate::Unknown => None,
        }
    }

    pub fn is_50hz(self) -> bool {
        matches!(self, FrameRate::Fps25 | FrameRate::Fps50)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FrameRate::Fps23_976 => "23.976 fps",
            FrameRate::Fps24 => "24 fps",
            FrameRate::Fps25 => "25 fps",
            FrameRate::Fps29_97 => "29.97 fps",
            FrameRate::Fps50 => "50 fps",
            FrameRate::Fps59_94 => "59.94 fps",
            FrameRate::Unknown => "? fps",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    Unknown,
    Aspect4x3,
    Aspect16x9,
    Aspect2_21,
}

impl AspectRatio {
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => AspectRatio::Aspect4x3,
            3 => AspectRatio::Aspect16x9,
            4 => AspectRatio::Aspect2_21,
            _ => AspectRatio::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    #[default]
    Unknown,
    Mono,
    Stereo,
    Multi,
    Combo,
}

impl ChannelLayout {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ChannelLayout::Mono,
            3 => ChannelLayout::Stereo,
            6 => ChannelLayout::Multi,
            12 => ChannelLayout::Combo,
            _ => ChannelLayout::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleRate {
    #[default]
    Unknown,
    Hz48000,
    Hz96000,
    Hz192000,
    Hz48000And192000,
    Hz48000And96000,
}

impl SampleRate {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => SampleRate::Hz48000,
            4 => SampleRate::Hz96000,
            5 => SampleRate::Hz192000,
            12 => SampleRate::Hz48000And192000,
            14 => SampleRate::Hz48000And96000,
            _ => SampleRate::Unknown,
        }
    }

    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz48000 => 48_000,
            SampleRate::Hz96000 | SampleRate::Hz48000And96000 => 96_000,
            SampleRate::Hz192000 | SampleRate::Hz48000And192000 => 192_000,
            SampleRate::Unknown => 0,
        }
    }
}

// ============================================================================
// Codec Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrameKind {
    I,
    P,
    B,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTypeStats {
    pub count: u64,
    pub bytes: u64,
}

/// Highest average bitrate over sliding windows, in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakBitRates {
    pub one_second: u64,
    pub five_seconds: u64,
    pub ten_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub format: VideoFormat,
    pub frame_rate: FrameRate,
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub profile: Option<String>,
    pub bit_depth: Option<u8>,
    pub frame_types: BTreeMap<FrameKind, FrameTypeStats>,
    pub peak_bit_rates: PeakBitRates,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioDetails {
    pub channel_layout: ChannelLayout,
    pub sample_rate: SampleRate,
    /// Full-bandwidth channels from the bitstream.
    pub channels: u8,
    pub lfe: u8,
    pub sample_rate_hz: u32,
    pub bit_depth: Option<u8>,
    /// Nominal rate declared by the frame header (bits per second).
    pub header_bit_rate: u64,
    /// DTS-HD / TrueHD extension present on top of the core.
    pub has_extension: bool,
    pub dial_norm: Option<i8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsDetails {
    pub width: u32,
    pub height: u32,
    pub captions: u64,
    pub forced_captions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StreamDetails {
    Video(VideoDetails),
    Audio(AudioDetails),
    Graphics(GraphicsDetails),
    Text,
    Unknown,
}

impl StreamDetails {
    pub fn for_kind(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Video => StreamDetails::Video(VideoDetails::default()),
            CodecKind::Audio => StreamDetails::Audio(AudioDetails::default()),
            CodecKind::Graphics => StreamDetails::Graphics(GraphicsDetails::default()),
            CodecKind::TextSubtitle => StreamDetails::Text,
            CodecKind::Unknown => StreamDetails::Unknown,
        }
    }
}

// ============================================================================
// Stream
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub pid: u16,
    pub stream_type: StreamType,
    pub language: Option<String>,
    /// Bits per second over the owning clip or playlist.
    pub bit_rate: u64,
    /// Bits per second over the time the stream is actually playing (angles).
    pub active_bit_rate: u64,
    pub angle_index: u32,
    /// Present in a clip but not enabled by the playlist.
    pub is_hidden: bool,
    pub is_vbr: bool,
    /// Codec header seen at least once.
    pub is_initialized: bool,
    pub payload_bytes: u64,
    pub packet_count: u64,
    /// First and last PES timestamp on this PID, 90 kHz. Clip streams only.
    pub first_pts: Option<u64>,
    pub last_pts: Option<u64>,
    pub details: StreamDetails,
}

impl Stream {
    pub fn new(pid: u16, stream_type: StreamType) -> Self {
        Self {
            pid,
            stream_type,
            language: None,
            bit_rate: 0,
            active_bit_rate: 0,
            angle_index: 0,
            is_hidden: false,
            is_vbr: false,
            is_initialized: false,
            payload_bytes: 0,
            packet_count: 0,
            first_pts: None,
            last_pts: None,
            details: StreamDetails::for_kind(stream_type.kind()),
        }
    }

    pub fn kind(&self) -> CodecKind {
        self.stream_type.kind()
    }

    pub fn video(&self) -> Option<&VideoDetails> {
        match &self.details {
            StreamDetails::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioDetails> {
        match &self.details {
            StreamDetails::Audio(a) => Some(a),
            _ => None,
        }
    }

    pub fn graphics(&self) -> Option<&GraphicsDetails> {
        match &self.details {
            StreamDetails::Graphics(g) => Some(g),
            _ => None,
        }
    }

    pub fn graphics_mut(&mut self) -> Option<&mut GraphicsDetails> {
        match &mut self.details {
            StreamDetails::Graphics(g) => Some(g),
            _ => None,
        }
    }

    /// Rate worth showing: angle streams only play part of the time.
    pub fn reported_bit_rate(&self) -> u64 {
        if self.angle_index > 0 {
            self.active_bit_rate
        } else {
            self.bit_rate
        }
    }

    /// Drop everything a scan accumulates, keep what clip-info declared.
    pub fn clear_statistics(&mut self) {
        self.bit_rate = 0;
        self.active_bit_rate = 0;
        self.payload_bytes = 0;
        self.packet_count = 0;
        self.first_pts = None;
        self.last_pts = None;
        self.is_vbr = false;
        match &mut self.details {
            StreamDetails::Video(v) => {
                v.frame_types.clear();
                v.peak_bit_rates = PeakBitRates::default();
            }
            StreamDetails::Graphics(g) => {
                g.captions = 0;
                g.forced_captions = 0;
            }
            _ => {}
        }
    }

    /// Pull header-derived diagnostics from a scanned clip stream.
    ///
    /// First non-zero geometry wins; counters are left to the caller.
    pub fn absorb_diagnostics(&mut self, scanned: &Stream) {
        self.is_vbr |= scanned.is_vbr;
        if !scanned.is_initialized {
            return;
        }
        match (&mut self.details, &scanned.details) {
            (StreamDetails::Video(mine), StreamDetails::Video(theirs)) => {
                if mine.width == 0 && theirs.width > 0 {
                    mine.width = theirs.width;
                    mine.height = theirs.height;
                    mine.interlaced = theirs.interlaced;
                }
                if mine.profile.is_none() {
                    mine.profile = theirs.profile.clone();
                }
                if mine.bit_depth.is_none() {
                    mine.bit_depth = theirs.bit_depth;
                }
                if mine.frame_rate == FrameRate::Unknown {
                    mine.frame_rate = theirs.frame_rate;
                }
                for (kind, stats) in &theirs.frame_types {
                    let entry = mine.frame_types.entry(*kind).or_default();
                    entry.count += stats.count;
                    entry.bytes += stats.bytes;
                }
                mine.peak_bit_rates.one_second =
                    mine.peak_bit_rates.one_second.max(theirs.peak_bit_rates.one_second);
                mine.peak_bit_rates.five_seconds =
                    mine.peak_bit_rates.five_seconds.max(theirs.peak_bit_rates.five_seconds);
                mine.peak_bit_rates.ten_seconds =
                    mine.peak_bit_rates.ten_seconds.max(theirs.peak_bit_rates.ten_seconds);
            }
            (StreamDetails::Audio(mine), StreamDetails::Audio(theirs)) => {
                if mine.channels == 0 && theirs.channels > 0 {
                    mine.channels = theirs.channels;
                    mine.lfe = theirs.lfe;
                }
                if mine.sample_rate_hz == 0 {
                    mine.sample_rate_hz = theirs.sample_rate_hz;
                }
                if mine.bit_depth.is_none() {
                    mine.bit_depth = theirs.bit_depth;
                }
                if mine.header_bit_rate == 0 {
                    mine.header_bit_rate = theirs.header_bit_rate;
                }
                if mine.dial_norm.is_none() {
                    mine.dial_norm = theirs.dial_norm;
                }
                mine.has_extension |= theirs.has_extension;
            }
            (StreamDetails::Graphics(mine), StreamDetails::Graphics(theirs)) => {
                if mine.width == 0 && theirs.width > 0 {
                    mine.width = theirs.width;
                }
                if mine.height == 0 && theirs.height > 0 {
                    mine.height = theirs.height;
                }
            }
            _ => {}
        }
        self.is_initialized = true;
    }

    /// One-line diagnostic summary.
    pub fn description(&self) -> String {
        match &self.details {
            StreamDetails::Video(v) => {
                let mut parts = Vec::new();
                if v.height > 0 {
                    parts.push(format!("{}x{}{}", v.width, v.height, if v.interlaced { "i" } else { "p" }));
                } else if v.format != VideoFormat::Unknown {
                    parts.push(format!(
                        "{}{}",
                        v.format.height(),
                        if v.format.is_interlaced() { "i" } else { "p" }
                    ));
                }
                if v.frame_rate != FrameRate::Unknown {
                    parts.push(v.frame_rate.to_string());
                }
                match v.aspect_ratio {
                    AspectRatio::Aspect4x3 => parts.push("4:3".to_string()),
                    AspectRatio::Aspect16x9 => parts.push("16:9".to_string()),
                    AspectRatio::Aspect2_21 => parts.push("2.21:1".to_string()),
                    AspectRatio::Unknown => {}
                }
                if let Some(profile) = &v.profile {
                    parts.push(profile.clone());
                }
                if let Some(depth) = v.bit_depth {
                    parts.push(format!("{} bits", depth));
                }
                parts.join(" / ")
            }
            StreamDetails::Audio(a) => {
                let mut parts = Vec::new();
                if a.channels > 0 {
                    parts.push(format!("{}.{}", a.channels, a.lfe));
                } else {
                    match a.channel_layout {
                        ChannelLayout::Mono => parts.push("1.0".to_string()),
                        ChannelLayout::Stereo => parts.push("2.0".to_string()),
                        ChannelLayout::Multi => parts.push("Multi".to_string()),
                        ChannelLayout::Combo => parts.push("Combo".to_string()),
                        ChannelLayout::Unknown => {}
                    }
                }
                let hz = if a.sample_rate_hz > 0 { a.sample_rate_hz } else { a.sample_rate.hz() };
                if hz > 0 {
                    parts.push(format!("{} kHz", hz / 1000));
                }
                if a.header_bit_rate > 0 {
                    parts.push(format!("{} kbps", a.header_bit_rate / 1000));
                }
                if let Some(depth) = a.bit_depth {
                    parts.push(format!("{}-bit", depth));
                }
                if let Some(dn) = a.dial_norm {
                    parts.push(format!("DN {}dB", dn));
                }
                parts.join(" / ")
            }
            StreamDetails::Graphics(g) => {
                let mut text = String::new();
                if g.width > 0 {
                    text.push_str(&format!("{}x{} / ", g.width, g.height));
                }
                text.push_str(&format!("{} captions", g.captions));
                if g.forced_captions > 0 {
                    text.push_str(&format!(" / {} forced captions", g.forced_captions));
                }
                text
            }
            StreamDetails::Text | StreamDetails::Unknown => String::new(),
        }
    }
}

/// Canonical presentation order: video, audio, graphics, text, then PID.
pub fn canonical_order(a: &Stream, b: &Stream) -> std::cmp::Ordering {
    a.kind().cmp(&b.kind()).then(a.pid.cmp(&b.pid))
}
