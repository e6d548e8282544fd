//! Per-stream codec analyzers.
//!
//! One analyzer per PID, picked by coding type when the clip's scan starts.
//! Analyzers only read headers: enough for geometry, channel layout, frame
//! types and caption counts. Nothing is decoded.

mod ac3;
mod avc;
mod dts;
mod hevc;
mod lpcm;
mod mpeg2;
mod pgs;
mod truehd;
mod vc1;

pub use ac3::Ac3Audio;
pub use avc::AvcVideo;
pub use dts::DtsAudio;
pub use hevc::HevcVideo;
pub use lpcm::LpcmAudio;
pub use mpeg2::Mpeg2Video;
pub use pgs::{PgsCaptions, PgsState};
pub use truehd::TrueHdAudio;
pub use vc1::Vc1Video;

use crate::error::{Result, ScanError};
use crate::stream::{FrameKind, Stream, StreamDetails, StreamType};

pub enum CodecAnalyzer {
    Mpeg2(Mpeg2Video),
    Avc(AvcVideo),
    Hevc(HevcVideo),
    Vc1(Vc1Video),
    Ac3(Ac3Audio),
    Dts(DtsAudio),
    TrueHd(TrueHdAudio),
    Lpcm(LpcmAudio),
    Pgs(PgsCaptions),
    Passthrough,
}

impl CodecAnalyzer {
    pub fn for_stream_type(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Mpeg1Video | StreamType::Mpeg2Video => {
                CodecAnalyzer::Mpeg2(Mpeg2Video::default())
            }
            StreamType::AvcVideo => CodecAnalyzer::Avc(AvcVideo::default()),
            StreamType::HevcVideo => CodecAnalyzer::Hevc(HevcVideo::default()),
            StreamType::Vc1Video => CodecAnalyzer::Vc1(Vc1Video::default()),
            StreamType::Ac3
            | StreamType::Ac3Plus
            | StreamType::Ac3PlusSecondary => CodecAnalyzer::Ac3(Ac3Audio::default()),
            StreamType::Dts
            | StreamType::DtsHd
            | StreamType::DtsHdMaster
            | StreamType::DtsHdSecondary => CodecAnalyzer::Dts(DtsAudio::default()),
            StreamType::TrueHd => CodecAnalyzer::TrueHd(TrueHdAudio::default()),
            StreamType::Lpcm => CodecAnalyzer::Lpcm(LpcmAudio::default()),
            StreamType::PresentationGraphics => CodecAnalyzer::Pgs(PgsCaptions::default()),
            _ => CodecAnalyzer::Passthrough,
        }
    }

    /// Whether payloads of this coding type are worth reassembling.
    pub fn inspects(stream_type: StreamType) -> bool {
        !matches!(Self::for_stream_type(stream_type), CodecAnalyzer::Passthrough)
    }

    /// Feed one PES payload. `extended` enables frame-type accounting.
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream, extended: bool) {
        match self {
            CodecAnalyzer::Mpeg2(a) => a.analyze(data, stream, extended),
            CodecAnalyzer::Avc(a) => a.analyze(data, stream, extended),
            CodecAnalyzer::Hevc(a) => a.analyze(data, stream, extended),
            CodecAnalyzer::Vc1(a) => a.analyze(data, stream, extended),
            CodecAnalyzer::Ac3(a) => a.analyze(data, stream),
            CodecAnalyzer::Dts(a) => a.analyze(data, stream),
            CodecAnalyzer::TrueHd(a) => a.analyze(data, stream),
            CodecAnalyzer::Lpcm(a) => a.analyze(data, stream),
            CodecAnalyzer::Pgs(a) => a.analyze(data, stream),
            CodecAnalyzer::Passthrough => {}
        }
    }
}

/// Count one access unit of `bytes` under `kind`.
fn record_frame(stream: &mut Stream, kind: FrameKind, bytes: usize, extended: bool) {
    if !extended {
        return;
    }
    if let StreamDetails::Video(video) = &mut stream.details {
        let entry = video.frame_types.entry(kind).or_default();
        entry.count += 1;
        entry.bytes += bytes as u64;
    }
}

/// Offsets just past each `00 00 01` start code.
fn start_codes(data: &[u8]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            out.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }
    out
}

/// NAL unit bodies between start codes (trailing zero bytes trimmed).
fn nal_units(data: &[u8]) -> Vec<&[u8]> {
    let starts = start_codes(data);
    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |next| next - 3);
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }
    units
}

// ============================================================================
// Parameter Set Arithmetic
// ============================================================================

// Exp-Golomb fields of a damaged parameter set can hold any 32-bit value.

/// `8 + minus8`, limited to the 16 bits any profile allows.
fn bit_depth(minus8: u32) -> Result<u8> {
    u8::try_from(minus8)
        .ok()
        .and_then(|d| d.checked_add(8))
        .filter(|d| *d <= 16)
        .ok_or(ScanError::InvalidField("bit_depth"))
}

fn scaled(units: u32, scale: u32, field: &'static str) -> Result<u32> {
    units.checked_mul(scale).ok_or(ScanError::InvalidField(field))
}

/// `size` less a conformance crop of `(start + end) * unit` samples.
fn cropped(size: u32, start: u32, end: u32, unit: u32, field: &'static str) -> Result<u32> {
    start
        .checked_add(end)
        .and_then(|c| c.checked_mul(unit))
        .and_then(|c| size.checked_sub(c))
        .ok_or(ScanError::InvalidField(field))
}
