//! Dolby Digital (AC-3) and Dolby Digital Plus (E-AC-3) frame headers.
//!
//! A BD "AC-3 Plus" stream carries an AC-3 core followed by dependent E-AC-3
//! frames; the dependent frames only flag the extension.

use crate::error::Result;
use crate::reader::BitReader;
use crate::stream::{Stream, StreamDetails, StreamType};

const SYNC_WORD: [u8; 2] = [0x0B, 0x77];

const AC3_BITRATES_KBPS: [u64; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];
const ACMOD_CHANNELS: [u8; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ac3Header {
    pub sample_rate: u32,
    pub bit_rate: u64,
    pub channels: u8,
    pub lfe: u8,
    pub dial_norm: i8,
    pub dependent: bool,
}

#[derive(Debug, Default)]
pub struct Ac3Audio {
    core_seen: bool,
    extension_seen: bool,
}

impl Ac3Audio {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream) {
        let wants_extension = matches!(
            stream.stream_type,
            StreamType::Ac3Plus | StreamType::Ac3PlusSecondary
        );
        let mut pos = 0;
        while !self.done(wants_extension) && pos + 8 <= data.len() {
            if data[pos..pos + 2] != SYNC_WORD {
                pos += 1;
                continue;
            }
            if let Ok(header) = parse_header(&data[pos + 2..]) {
                self.apply(&header, stream);
            }
            pos += 2;
        }
    }

    fn done(&self, wants_extension: bool) -> bool {
        self.core_seen && (self.extension_seen || !wants_extension)
    }

    fn apply(&mut self, header: &Ac3Header, stream: &mut Stream) {
        let StreamDetails::Audio(a) = &mut stream.details else {
            return;
        };
        if header.dependent {
            a.has_extension = true;
            self.extension_seen = true;
        } else if !self.core_seen {
            a.channels = header.channels;
            a.lfe = header.lfe;
            a.sample_rate_hz = header.sample_rate;
            a.header_bit_rate = header.bit_rate;
            a.dial_norm = Some(header.dial_norm);
            self.core_seen = true;
        }
        stream.is_initialized = true;
    }
}

/// Parse the bytes following the sync word.
pub fn parse_header(data: &[u8]) -> Result<Ac3Header> {
    let mut bits = BitReader::new(data);
    let bsid = {
        let mut peek = BitReader::new(data);
        peek.skip_bits(24)?;
        peek.read_bits(5)?
    };
    if bsid <= 10 {
        bits.skip_bits(16)?; // crc1
        let fscod = bits.read_bits(2)?;
        let frmsizecod = bits.read_bits(6)? as usize;
        bits.skip_bits(5 + 3)?; // bsid, bsmod
        let acmod = bits.read_bits(3)?;
        if (acmod & 0x01) != 0 && acmod != 1 {
            bits.skip_bits(2)?;
        }
        if (acmod & 0x04) != 0 {
            bits.skip_bits(2)?;
        }
        if acmod == 2 {
            bits.skip_bits(2)?;
        }
        let lfe = bits.read_bits(1)? as u8;
        let dialnorm = bits.read_bits(5)?;
        Ok(Ac3Header {
            sample_rate: sample_rate(fscod, 0),
            bit_rate: AC3_BITRATES_KBPS.get(frmsizecod >> 1).copied().unwrap_or(0) * 1000,
            channels: ACMOD_CHANNELS[acmod as usize],
            lfe,
            dial_norm: dial_norm(dialnorm),
            dependent: false,
        })
    } else {
        let strmtyp = bits.read_bits(2)?;
        bits.skip_bits(3)?; // substreamid
        let frmsiz = bits.read_bits(11)? as u64;
        let fscod = bits.read_bits(2)?;
        let (fscod2, blocks) = if fscod == 3 {
            (bits.read_bits(2)?, 6)
        } else {
            (0, [1u64, 2, 3, 6][bits.read_bits(2)? as usize])
        };
        let acmod = bits.read_bits(3)?;
        let lfe = bits.read_bits(1)? as u8;
        bits.skip_bits(5)?; // bsid
        let dialnorm = bits.read_bits(5)?;
        let rate = sample_rate(fscod, fscod2);
        let frame_bytes = (frmsiz + 1) * 2;
        let bit_rate = if rate > 0 {
            frame_bytes * 8 * rate as u64 / (blocks * 256)
        } else {
            0
        };
        Ok(Ac3Header {
            sample_rate: rate,
            bit_rate,
            channels: ACMOD_CHANNELS[acmod as usize],
            lfe,
            dial_norm: dial_norm(dialnorm),
            dependent: strmtyp == 1,
        })
    }
}

fn sample_rate(fscod: u32, fscod2: u32) -> u32 {
    match (fscod, fscod2) {
        (0, _) => 48_000,
        (1, _) => 44_100,
        (2, _) => 32_000,
        (3, 0) => 24_000,
        (3, 1) => 22_050,
        (3, 2) => 16_000,
        _ => 0,
    }
}

fn dial_norm(code: u32) -> i8 {
    if code == 0 {
        -31
    } else {
        -(code as i8)
    }
}
