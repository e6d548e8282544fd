//! H.264 / AVC video headers.
//!
//! Geometry and profile come from the first SPS; every access unit is
//! classified by the slice type of its first slice.

use crate::error::{Result, ScanError};
use crate::reader::{unescape_rbsp, BitReader};
use crate::stream::{FrameKind, Stream, StreamDetails};

use super::{bit_depth, cropped, nal_units, record_frame, scaled};

const NAL_SLICE: u8 = 1;
const NAL_IDR_SLICE: u8 = 5;
const NAL_SPS: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcSps {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub bit_depth: u8,
}

#[derive(Debug, Default)]
pub struct AvcVideo {
    sps: Option<AvcSps>,
}

impl AvcVideo {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream, extended: bool) {
        let mut frame = None;
        for nal in nal_units(data) {
            let nal_type = nal[0] & 0x1F;
            match nal_type {
                NAL_SPS if self.sps.is_none() => {
                    if let Ok(sps) = parse_sps(&unescape_rbsp(&nal[1..])) {
                        apply_sps(&sps, stream);
                        self.sps = Some(sps);
                    }
                }
                NAL_SLICE | NAL_IDR_SLICE if frame.is_none() => {
                    frame = slice_kind(&nal[1..]);
                }
                _ => {}
            }
        }
        if let Some(kind) = frame {
            record_frame(stream, kind, data.len(), extended);
        }
    }
}

fn apply_sps(sps: &AvcSps, stream: &mut Stream) {
    if let StreamDetails::Video(v) = &mut stream.details {
        v.width = sps.width;
        v.height = sps.height;
        v.interlaced = sps.interlaced;
        v.bit_depth = Some(sps.bit_depth);
        v.profile = Some(format!(
            "{} Profile {}.{}",
            profile_name(sps.profile_idc),
            sps.level_idc / 10,
            sps.level_idc % 10
        ));
    }
    stream.is_initialized = true;
}

fn profile_name(profile_idc: u8) -> &'static str {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High 10",
        122 => "High 4:2:2",
        244 => "High 4:4:4",
        118 | 128 => "Stereo High",
        _ => "Unknown",
    }
}

fn slice_kind(rbsp: &[u8]) -> Option<FrameKind> {
    // the first two fields sit well before any emulation prevention
    let mut bits = BitReader::new(rbsp);
    let _first_mb = bits.read_ue().ok()?;
    let slice_type = bits.read_ue().ok()? % 5;
    Some(match slice_type {
        0 | 3 => FrameKind::P,
        1 => FrameKind::B,
        _ => FrameKind::I,
    })
}

pub fn parse_sps(rbsp: &[u8]) -> Result<AvcSps> {
    let mut bits = BitReader::new(rbsp);
    let profile_idc = bits.read_bits(8)? as u8;
    bits.skip_bits(8)?; // constraint flags
    let level_idc = bits.read_bits(8)? as u8;
    bits.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    let mut depth = 8;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = bits.read_ue()?;
        if chroma_format_idc == 3 {
            bits.skip_bits(1)?;
        }
        depth = bit_depth(bits.read_ue()?)?;
        bits.read_ue()?; // bit_depth_chroma_minus8
        bits.skip_bits(1)?; // qpprime_y_zero_transform_bypass
        if bits.read_bit()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if bits.read_bit()? {
                    skip_scaling_list(&mut bits, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    bits.read_ue()?; // log2_max_frame_num_minus4
    match bits.read_ue()? {
        0 => {
            bits.read_ue()?;
        }
        1 => {
            bits.skip_bits(1)?;
            bits.read_se()?;
            bits.read_se()?;
            let cycle = bits.read_ue()?;
            for _ in 0..cycle {
                bits.read_se()?;
            }
        }
        _ => {}
    }
    bits.read_ue()?; // max_num_ref_frames
    bits.skip_bits(1)?; // gaps_in_frame_num_allowed

    let width_mbs = bits.read_ue()?.saturating_add(1);
    let height_map_units = bits.read_ue()?.saturating_add(1);
    let frame_mbs_only = bits.read_bit()?;
    if !frame_mbs_only {
        bits.skip_bits(1)?; // mb_adaptive_frame_field
    }
    bits.skip_bits(1)?; // direct_8x8_inference

    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let mut width = scaled(width_mbs, 16, "pic_width_in_mbs")?;
    let mut height = scaled(height_map_units, 16 * field_factor, "pic_height_in_map_units")?;
    if bits.read_bit()? {
        let (crop_x, crop_y) = match chroma_format_idc {
            0 => (1, field_factor),
            1 => (2, 2 * field_factor),
            2 => (2, field_factor),
            _ => (1, field_factor),
        };
        let left = bits.read_ue()?;
        let right = bits.read_ue()?;
        let top = bits.read_ue()?;
        let bottom = bits.read_ue()?;
        width = cropped(width, left, right, crop_x, "frame_crop_width")?;
        height = cropped(height, top, bottom, crop_y, "frame_crop_height")?;
    }

    Ok(AvcSps {
        profile_idc,
        level_idc,
        width,
        height,
        interlaced: !frame_mbs_only,
        bit_depth: depth,
    })
}

fn skip_scaling_list(bits: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = bits.read_se()?;
            if !(-128..=127).contains(&delta) {
                return Err(ScanError::InvalidField("delta_scale"));
            }
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamType;
    use crate::test_support::{avc_access_unit, avc_sps, avc_sps_1080p};

    #[test]
    fn parses_1080p_high_profile_sps() {
        let sps = parse_sps(&unescape_rbsp(&avc_sps_1080p()[1..])).expect("sps");
        assert_eq!(sps.profile_idc, 100);
        assert_eq!(sps.level_idc, 41);
        assert_eq!((sps.width, sps.height), (1920, 1080));
        assert!(!sps.interlaced);
        assert_eq!(sps.bit_depth, 8);
    }

    #[test]
    fn classifies_access_units() {
        let mut analyzer = AvcVideo::default();
        let mut stream = Stream::new(0x1011, StreamType::AvcVideo);

        analyzer.analyze(&avc_access_unit(true, 7, 400), &mut stream, true);
        analyzer.analyze(&avc_access_unit(false, 5, 200), &mut stream, true);
        analyzer.analyze(&avc_access_unit(false, 6, 100), &mut stream, true);
        analyzer.analyze(&avc_access_unit(false, 6, 100), &mut stream, true);

        let v = stream.video().unwrap();
        assert!(stream.is_initialized);
        assert_eq!((v.width, v.height), (1920, 1080));
        assert_eq!(v.profile.as_deref(), Some("High Profile 4.1"));
        assert_eq!(v.frame_types[&FrameKind::I].count, 1);
        assert_eq!(v.frame_types[&FrameKind::P].count, 1);
        assert_eq!(v.frame_types[&FrameKind::B].count, 2);
    }

    #[test]
    fn frame_types_need_extended_diagnostics() {
        let mut analyzer = AvcVideo::default();
        let mut stream = Stream::new(0x1011, StreamType::AvcVideo);
        analyzer.analyze(&avc_access_unit(true, 7, 400), &mut stream, false);
        let v = stream.video().unwrap();
        assert!(v.frame_types.is_empty());
        assert_eq!(v.width, 1920);
    }

    #[test]
    fn out_of_range_sps_fields_are_rejected() {
        let parse = |nal: Vec<u8>| parse_sps(&unescape_rbsp(&nal[1..]));
        assert!(matches!(
            parse(avc_sps(255, 119, 67, 4)),
            Err(ScanError::InvalidField("bit_depth"))
        ));
        assert!(matches!(
            parse(avc_sps(0, 0x1000_0000, 67, 4)),
            Err(ScanError::InvalidField("pic_width_in_mbs"))
        ));
        assert!(matches!(
            parse(avc_sps(0, 119, 67, 0x7FFF_FFFF)),
            Err(ScanError::InvalidField("frame_crop_height"))
        ));
        assert_eq!(parse(avc_sps(2, 119, 67, 4)).expect("sps").bit_depth, 10);
    }

    #[test]
    fn damaged_sps_leaves_the_stream_untouched() {
        let mut analyzer = AvcVideo::default();
        let mut stream = Stream::new(0x1011, StreamType::AvcVideo);
        // High profile with bit_depth_luma_minus8 of 255
        analyzer.analyze(&[0, 0, 1, 0x67, 0x64, 0x00, 0x29, 0xA0, 0x08, 0x07], &mut stream, true);
        assert!(!stream.is_initialized);
        assert_eq!(stream.video().unwrap().width, 0);

        analyzer.analyze(&avc_access_unit(true, 7, 400), &mut stream, true);
        assert_eq!(stream.video().unwrap().width, 1920);
    }
}
