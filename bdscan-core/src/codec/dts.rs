//! DTS core frame header plus DTS-HD extension substream detection.

use crate::error::Result;
use crate::reader::BitReader;
use crate::stream::{Stream, StreamDetails};

const CORE_SYNC: [u8; 4] = [0x7F, 0xFE, 0x80, 0x01];
const HD_SYNC: [u8; 4] = [0x64, 0x58, 0x20, 0x25];

const AMODE_CHANNELS: [u8; 16] = [1, 2, 2, 2, 2, 3, 3, 4, 4, 5, 6, 6, 6, 7, 8, 8];
const BIT_RATES: [u64; 25] = [
    32_000, 56_000, 64_000, 96_000, 112_000, 128_000, 192_000, 224_000, 256_000, 320_000,
    384_000, 448_000, 512_000, 576_000, 640_000, 768_000, 960_000, 1_024_000, 1_152_000,
    1_280_000, 1_344_000, 1_408_000, 1_411_200, 1_472_000, 1_536_000,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtsHeader {
    pub sample_rate: u32,
    pub bit_rate: u64,
    pub channels: u8,
    pub lfe: u8,
    pub bit_depth: u8,
    pub extended_channels: bool,
}

#[derive(Debug, Default)]
pub struct DtsAudio {
    core_seen: bool,
    hd_seen: bool,
}

impl DtsAudio {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream) {
        if self.core_seen && self.hd_seen {
            return;
        }
        let core = (!self.core_seen)
            .then(|| find(data, &CORE_SYNC))
            .flatten()
            .and_then(|at| parse_core(&data[at + 4..]).ok());
        let hd = !self.hd_seen && find(data, &HD_SYNC).is_some();

        let StreamDetails::Audio(a) = &mut stream.details else {
            return;
        };
        if let Some(header) = core {
            a.channels = header.channels;
            a.lfe = header.lfe;
            a.sample_rate_hz = header.sample_rate;
            a.header_bit_rate = header.bit_rate;
            a.bit_depth = Some(header.bit_depth);
            self.core_seen = true;
            stream.is_initialized = true;
        }
        if hd {
            a.has_extension = true;
            self.hd_seen = true;
            stream.is_initialized = true;
        }
    }
}

fn find(data: &[u8], sync: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == sync)
}

/// Parse the bytes following the core sync word.
pub fn parse_core(data: &[u8]) -> Result<DtsHeader> {
    let mut bits = BitReader::new(data);
    bits.skip_bits(1 + 5 + 1 + 7 + 14)?; // ftype, short, cpf, nblks, fsize
    let amode = bits.read_bits(6)? as usize;
    let sfreq = bits.read_bits(4)?;
    let rate = bits.read_bits(5)? as usize;
    bits.skip_bits(1 + 1 + 1 + 1 + 1)?; // mix, dynf, timef, auxf, hdcd
    let ext_audio_id = bits.read_bits(3)?;
    let ext_audio = bits.read_bit()?;
    bits.skip_bits(1)?; // aspf
    let lff = bits.read_bits(2)?;
    bits.skip_bits(1 + 1 + 4 + 2)?; // hflag, filts, vernum, chist
    let pcmr = bits.read_bits(3)?;

    let sample_rate = match sfreq {
        1 => 8_000,
        2 => 16_000,
        3 => 32_000,
        6 => 11_025,
        7 => 22_050,
        8 => 44_100,
        11 => 12_000,
        12 => 24_000,
        13 => 48_000,
        _ => 0,
    };
    let bit_depth = match pcmr {
        0 | 1 => 16,
        2 | 3 => 20,
        _ => 24,
    };
    let mut channels = AMODE_CHANNELS.get(amode).copied().unwrap_or(0);
    // XCh and XXCh carry extra surround channels
    let extended_channels = ext_audio && matches!(ext_audio_id, 0 | 6);
    if extended_channels {
        channels += 1;
    }

    Ok(DtsHeader {
        sample_rate,
        bit_rate: BIT_RATES.get(rate).copied().unwrap_or(0),
        channels,
        lfe: u8::from(lff == 1 || lff == 2),
        bit_depth,
        extended_channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;
    use crate::test_support::dts_core_frame;

    #[test]
    fn parses_core_header() {
        let frame = dts_core_frame(9, 13, 15, true);
        let header = parse_core(&frame[4..]).expect("core");
        assert_eq!(header.channels, 5);
        assert_eq!(header.lfe, 1);
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.bit_rate, 768_000);
        assert_eq!(header.bit_depth, 24);
    }

    #[test]
    fn hd_substream_sets_extension() {
        let mut unit = dts_core_frame(9, 13, 24, true);
        unit.extend_from_slice(&HD_SYNC);
        unit.extend_from_slice(&[0; 32]);
        let mut analyzer = DtsAudio::default();
        let mut stream = Stream::new(0x1100, StreamType::DtsHdMaster);
        analyzer.analyze(&unit, &mut stream);
        let a = stream.audio().unwrap();
        assert!(a.has_extension);
        assert_eq!(a.header_bit_rate, 1_536_000);
        assert_eq!((a.channels, a.lfe), (5, 1));
    }
}
