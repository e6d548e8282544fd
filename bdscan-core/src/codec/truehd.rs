//! Dolby TrueHD (MLP) major sync headers.
//!
//! BD TrueHD streams interleave an AC-3 core; those frames are skipped here
//! and only mark the stream as carrying both.

use crate::stream::{Stream, StreamDetails};

const MAJOR_SYNC: [u8; 4] = [0xF8, 0x72, 0x6F, 0xBA];
const AC3_SYNC: [u8; 2] = [0x0B, 0x77];

/// Channels per bit of the 8-channel presentation assignment.
const CHANNEL_BITS: [(u8, bool); 13] = [
    (2, false), // L, R
    (1, false), // C
    (1, true),  // LFE
    (2, false), // Ls, Rs
    (2, false), // Tfl, Tfr
    (2, false), // Lsc, Rsc
    (2, false), // Lb, Rb
    (1, false), // Cs
    (1, false), // Ts
    (2, false), // Lsd, Rsd
    (2, false), // Lw, Rw
    (1, false), // Tfc
    (1, true),  // LFE2
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MajorSync {
    pub sample_rate: u32,
    pub channels: u8,
    pub lfe: u8,
    /// Peak data rate, bits per second.
    pub peak_bit_rate: u64,
}

#[derive(Debug, Default)]
pub struct TrueHdAudio {
    sync_seen: bool,
}

impl TrueHdAudio {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream) {
        if self.sync_seen || data.starts_with(&AC3_SYNC) {
            return;
        }
        let Some(at) = data.windows(4).position(|w| w == MAJOR_SYNC) else {
            return;
        };
        let Some(sync) = parse_major_sync(&data[at + 4..]) else {
            return;
        };
        if let StreamDetails::Audio(a) = &mut stream.details {
            a.channels = sync.channels;
            a.lfe = sync.lfe;
            a.sample_rate_hz = sync.sample_rate;
            a.header_bit_rate = sync.peak_bit_rate;
            a.has_extension = true;
        }
        self.sync_seen = true;
        stream.is_initialized = true;
    }
}

/// Parse the bytes following the major sync word.
pub fn parse_major_sync(data: &[u8]) -> Option<MajorSync> {
    if data.len() < 12 {
        return None;
    }
    let format = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let sample_rate = match format >> 28 {
        0 => 48_000,
        1 => 96_000,
        2 => 192_000,
        8 => 44_100,
        9 => 88_200,
        10 => 176_400,
        _ => return None,
    };
    let assignment = format & 0x1FFF;

    let mut channels = 0u8;
    let mut lfe = 0u8;
    for (bit, (count, is_lfe)) in CHANNEL_BITS.iter().enumerate() {
        if assignment & (1 << bit) != 0 {
            if *is_lfe {
                lfe += count;
            } else {
                channels += count;
            }
        }
    }

    // signature (2), flags (2), reserved (2), then variable rate bit + peak data rate
    let peak = (((data[10] & 0x7F) as u64) << 8) | data[11] as u64;
    let peak_bit_rate = peak * sample_rate as u64 / 16;

    Some(MajorSync {
        sample_rate,
        channels,
        lfe,
        peak_bit_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;

    fn access_unit(rate_code: u32, assignment: u32) -> Vec<u8> {
        let mut unit = vec![0x10, 0x40, 0x00, 0x00];
        unit.extend_from_slice(&MAJOR_SYNC);
        unit.extend_from_slice(&((rate_code << 28) | assignment).to_be_bytes());
        unit.extend_from_slice(&[0xB7, 0x52, 0x00, 0x00, 0x00, 0x00, 0x80, 0x20]);
        unit.extend_from_slice(&[0; 16]);
        unit
    }

    #[test]
    fn reads_channels_from_assignment() {
        // L/R, C, LFE, Ls/Rs, Lb/Rb
        let mut analyzer = TrueHdAudio::default();
        let mut stream = Stream::new(0x1100, StreamType::TrueHd);
        analyzer.analyze(&access_unit(0, 0b100_1111), &mut stream);
        let a = stream.audio().unwrap();
        assert_eq!((a.channels, a.lfe), (7, 1));
        assert_eq!(a.sample_rate_hz, 48_000);
        assert!(a.has_extension);
        assert_eq!(a.header_bit_rate, 0x20 * 48_000 / 16);
    }

    #[test]
    fn ignores_ac3_core_frames() {
        let mut analyzer = TrueHdAudio::default();
        let mut stream = Stream::new(0x1100, StreamType::TrueHd);
        let mut core = vec![0x0B, 0x77];
        core.extend(access_unit(0, 0b1111));
        analyzer.analyze(&core, &mut stream);
        assert!(!stream.is_initialized);
    }
}
