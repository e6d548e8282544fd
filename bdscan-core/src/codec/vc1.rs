//! VC-1 advanced profile: sequence header geometry and picture types.

use crate::reader::BitReader;
use crate::stream::{FrameKind, Stream, StreamDetails};

use super::{record_frame, start_codes};

const FRAME_START: u8 = 0x0D;
const SEQUENCE_HEADER: u8 = 0x0F;

#[derive(Debug, Default)]
pub struct Vc1Video {
    interlace: bool,
    have_sequence: bool,
}

impl Vc1Video {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream, extended: bool) {
        let mut frame = None;
        for start in start_codes(data) {
            let Some(&code) = data.get(start) else {
                continue;
            };
            let body = &data[start + 1..];
            match code {
                SEQUENCE_HEADER if !self.have_sequence => self.sequence_header(body, stream),
                FRAME_START if frame.is_none() => frame = self.picture_type(body),
                _ => {}
            }
        }
        if let Some(kind) = frame {
            record_frame(stream, kind, data.len(), extended);
        }
    }

    fn sequence_header(&mut self, body: &[u8], stream: &mut Stream) {
        let mut bits = BitReader::new(body);
        let parsed = (|| {
            let profile = bits.read_bits(2)?;
            let level = bits.read_bits(3)?;
            bits.skip_bits(2 + 3 + 5 + 1)?;
            let width = (bits.read_bits(12)? + 1) * 2;
            let height = (bits.read_bits(12)? + 1) * 2;
            bits.skip_bits(1)?; // pulldown
            let interlace = bits.read_bit()?;
            Ok::<_, crate::error::ScanError>((profile, level, width, height, interlace))
        })();
        let Ok((profile, level, width, height, interlace)) = parsed else {
            return;
        };
        if profile != 3 {
            return;
        }
        self.interlace = interlace;
        if let StreamDetails::Video(v) = &mut stream.details {
            v.width = width;
            v.height = height;
            v.interlaced = interlace;
            v.profile = Some(format!("Advanced Profile {}", level));
        }
        self.have_sequence = true;
        stream.is_initialized = true;
    }

    fn picture_type(&self, body: &[u8]) -> Option<FrameKind> {
        let mut bits = BitReader::new(body);
        if self.interlace && bits.read_bit().ok()? && bits.read_bit().ok()? {
            // field interlace: type of the first field
            return Some(match bits.read_bits(3).ok()? {
                0 | 1 => FrameKind::I,
                2 | 3 => FrameKind::P,
                6 | 7 => FrameKind::I,
                _ => FrameKind::B,
            });
        }
        let kind = if !bits.read_bit().ok()? {
            FrameKind::P
        } else if !bits.read_bit().ok()? {
            FrameKind::B
        } else if !bits.read_bit().ok()? {
            FrameKind::I
        } else if !bits.read_bit().ok()? {
            // BI
            FrameKind::I
        } else {
            // skipped
            FrameKind::P
        };
        Some(kind)
    }
}
