//! Blu-ray LPCM: a 4-byte header in front of every PES payload.

use crate::stream::{Stream, StreamDetails};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpcmHeader {
    pub channels: u8,
    pub lfe: u8,
    pub sample_rate: u32,
    pub bit_depth: u8,
}

impl LpcmHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let (channels, lfe) = match data[2] >> 4 {
            1 => (1, 0),
            3 => (2, 0),
            4 | 5 => (3, 0),
            6 | 7 => (4, 0),
            8 => (5, 0),
            9 => (5, 1),
            10 => (7, 0),
            11 => (7, 1),
            _ => return None,
        };
        let sample_rate = match data[2] & 0x0F {
            1 => 48_000,
            4 => 96_000,
            5 => 192_000,
            _ => return None,
        };
        let bit_depth = match data[3] >> 6 {
            1 => 16,
            2 => 20,
            3 => 24,
            _ => return None,
        };
        Some(Self {
            channels,
            lfe,
            sample_rate,
            bit_depth,
        })
    }

    pub fn bit_rate(&self) -> u64 {
        (self.channels + self.lfe) as u64 * self.sample_rate as u64 * self.bit_depth as u64
    }
}

#[derive(Debug, Default)]
pub struct LpcmAudio {
    header_seen: bool,
}

impl LpcmAudio {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream) {
        if self.header_seen {
            return;
        }
        let Some(header) = LpcmHeader::parse(data) else {
            return;
        };
        if let StreamDetails::Audio(a) = &mut stream.details {
            a.channels = header.channels;
            a.lfe = header.lfe;
            a.sample_rate_hz = header.sample_rate;
            a.bit_depth = Some(header.bit_depth);
            a.header_bit_rate = header.bit_rate();
        }
        self.header_seen = true;
        stream.is_initialized = true;
    }
}
