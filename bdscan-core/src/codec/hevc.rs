//! H.265 / HEVC video headers.
//!
//! The SPS gives geometry, bit depth and profile. Frame type comes from the
//! access unit delimiter; IRAP pictures always count as I.

use crate::error::Result;
use crate::reader::{unescape_rbsp, BitReader};
use crate::stream::{FrameKind, Stream, StreamDetails};

use super::{bit_depth, cropped, nal_units, record_frame};

const NAL_SPS: u8 = 33;
const NAL_AUD: u8 = 35;
const IRAP: std::ops::RangeInclusive<u8> = 16..=23;
const VCL: std::ops::RangeInclusive<u8> = 0..=31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcSps {
    pub profile_idc: u8,
    pub tier: bool,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub chroma_format_idc: u32,
}

#[derive(Debug, Default)]
pub struct HevcVideo {
    sps: Option<HevcSps>,
}

impl HevcVideo {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream, extended: bool) {
        let mut frame = None;
        let mut has_vcl = false;
        for nal in nal_units(data) {
            if nal.len() < 2 {
                continue;
            }
            let nal_type = (nal[0] >> 1) & 0x3F;
            match nal_type {
                NAL_SPS if self.sps.is_none() => {
                    if let Ok(sps) = parse_sps(&unescape_rbsp(&nal[2..])) {
                        apply_sps(&sps, stream);
                        self.sps = Some(sps);
                    }
                }
                NAL_AUD if frame.is_none() => {
                    frame = nal.get(2).map(|b| match b >> 5 {
                        0 => FrameKind::I,
                        1 => FrameKind::P,
                        _ => FrameKind::B,
                    });
                }
                t if IRAP.contains(&t) => {
                    has_vcl = true;
                    frame = Some(FrameKind::I);
                }
                t if VCL.contains(&t) => has_vcl = true,
                _ => {}
            }
        }
        if has_vcl {
            record_frame(stream, frame.unwrap_or(FrameKind::P), data.len(), extended);
        }
    }
}

fn apply_sps(sps: &HevcSps, stream: &mut Stream) {
    if let StreamDetails::Video(v) = &mut stream.details {
        v.width = sps.width;
        v.height = sps.height;
        v.interlaced = false;
        v.bit_depth = Some(sps.bit_depth);
        let profile = match sps.profile_idc {
            1 => "Main",
            2 => "Main 10",
            3 => "Main Still",
            4 => "Range Extensions",
            _ => "Unknown",
        };
        let chroma = match sps.chroma_format_idc {
            0 => "4:0:0",
            2 => "4:2:2",
            3 => "4:4:4",
            _ => "4:2:0",
        };
        v.profile = Some(format!(
            "{} @ Level {}.{} @ {} / {}",
            profile,
            sps.level_idc / 30,
            (sps.level_idc % 30) / 3,
            if sps.tier { "High" } else { "Main" },
            chroma
        ));
    }
    stream.is_initialized = true;
}

pub fn parse_sps(rbsp: &[u8]) -> Result<HevcSps> {
    let mut bits = BitReader::new(rbsp);
    bits.skip_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = bits.read_bits(3)? as usize;
    bits.skip_bits(1)?; // temporal_id_nesting

    // profile_tier_level
    bits.skip_bits(2)?; // general_profile_space
    let tier = bits.read_bit()?;
    let profile_idc = bits.read_bits(5)? as u8;
    bits.skip_bits(32)?; // compatibility flags
    bits.skip_bits(48)?; // source flags + reserved
    let level_idc = bits.read_bits(8)? as u8;

    let mut sub_profile = [false; 8];
    let mut sub_level = [false; 8];
    for i in 0..max_sub_layers_minus1 {
        sub_profile[i] = bits.read_bit()?;
        sub_level[i] = bits.read_bit()?;
    }
    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            bits.skip_bits(2)?;
        }
    }
    for i in 0..max_sub_layers_minus1 {
        if sub_profile[i] {
            bits.skip_bits(88)?;
        }
        if sub_level[i] {
            bits.skip_bits(8)?;
        }
    }

    bits.read_ue()?; // sps_seq_parameter_set_id
    let chroma_format_idc = bits.read_ue()?;
    if chroma_format_idc == 3 {
        bits.skip_bits(1)?;
    }
    let mut width = bits.read_ue()?;
    let mut height = bits.read_ue()?;
    if bits.read_bit()? {
        let (sub_w, sub_h) = match chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let left = bits.read_ue()?;
        let right = bits.read_ue()?;
        let top = bits.read_ue()?;
        let bottom = bits.read_ue()?;
        width = cropped(width, left, right, sub_w, "conf_win_width")?;
        height = cropped(height, top, bottom, sub_h, "conf_win_height")?;
    }
    let depth = bit_depth(bits.read_ue()?)?;

    Ok(HevcSps {
        profile_idc,
        tier,
        level_idc,
        width,
        height,
        bit_depth: depth,
        chroma_format_idc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;
    use crate::error::ScanError;
    use crate::test_support::{hevc_access_unit, hevc_sps, hevc_sps_2160p};

    #[test]
    fn parses_uhd_main10_sps() {
        let sps = parse_sps(&unescape_rbsp(&hevc_sps_2160p()[2..])).expect("sps");
        assert_eq!(sps.profile_idc, 2);
        assert_eq!(sps.level_idc, 153);
        assert_eq!((sps.width, sps.height), (3840, 2160));
        assert_eq!(sps.bit_depth, 10);
    }

    #[test]
    fn classifies_access_units() {
        let mut analyzer = HevcVideo::default();
        let mut stream = Stream::new(0x1011, StreamType::HevcVideo);
        analyzer.analyze(&hevc_access_unit(true, 0, 19, 300), &mut stream, true);
        analyzer.analyze(&hevc_access_unit(false, 1, 1, 100), &mut stream, true);
        analyzer.analyze(&hevc_access_unit(false, 2, 0, 50), &mut stream, true);

        let v = stream.video().unwrap();
        assert_eq!((v.width, v.height), (3840, 2160));
        assert_eq!(v.bit_depth, Some(10));
        assert_eq!(v.profile.as_deref(), Some("Main 10 @ Level 5.1 @ High / 4:2:0"));
        assert_eq!(v.frame_types[&FrameKind::I].count, 1);
        assert_eq!(v.frame_types[&FrameKind::P].count, 1);
        assert_eq!(v.frame_types[&FrameKind::B].count, 1);
    }

    #[test]
    fn out_of_range_sps_fields_are_rejected() {
        let parse = |nal: Vec<u8>| parse_sps(&unescape_rbsp(&nal[2..]));
        assert!(matches!(
            parse(hevc_sps(3840, 2160, 0, 300)),
            Err(ScanError::InvalidField("bit_depth"))
        ));
        // crop of 2^31 chroma samples overflows, 2^31 - 1 exceeds the width
        assert!(parse(hevc_sps(3840, 2160, 0x8000_0000, 2)).is_err());
        assert!(parse(hevc_sps(3840, 2160, 0x7FFF_FFFF, 2)).is_err());
        let cropped = parse(hevc_sps(3840, 2176, 4, 2)).expect("sps");
        assert_eq!(cropped.width, 3832);
    }

    #[test]
    fn damaged_sps_is_skipped_until_a_good_one() {
        let mut analyzer = HevcVideo::default();
        let mut stream = Stream::new(0x1011, StreamType::HevcVideo);

        let mut damaged = vec![0, 0, 0, 1];
        damaged.extend(hevc_sps(3840, 2160, 0, 300));
        analyzer.analyze(&damaged, &mut stream, true);
        assert!(!stream.is_initialized);
        assert_eq!(stream.video().unwrap().width, 0);

        analyzer.analyze(&hevc_access_unit(true, 0, 19, 300), &mut stream, true);
        assert!(stream.is_initialized);
        assert_eq!(stream.video().unwrap().width, 3840);
    }
}
