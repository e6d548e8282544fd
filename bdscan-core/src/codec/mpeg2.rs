//! MPEG-1/2 video headers: sequence header, sequence extension, picture type.

use crate::stream::{AspectRatio, FrameKind, FrameRate, Stream, StreamDetails};

use super::{record_frame, start_codes};

const PICTURE_START: u8 = 0x00;
const SEQUENCE_HEADER: u8 = 0xB3;
const EXTENSION_START: u8 = 0xB5;

#[derive(Debug, Default)]
pub struct Mpeg2Video {
    have_sequence: bool,
}

impl Mpeg2Video {
    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream, extended: bool) {
        let mut frame = None;
        for start in start_codes(data) {
            let Some(&code) = data.get(start) else {
                continue;
            };
            let body = &data[start + 1..];
            match code {
                SEQUENCE_HEADER if !self.have_sequence && body.len() >= 4 => {
                    self.sequence_header(body, stream);
                }
                EXTENSION_START if body.len() >= 2 && body[0] >> 4 == 1 => {
                    self.sequence_extension(body, stream);
                }
                PICTURE_START if frame.is_none() && body.len() >= 2 => {
                    frame = match (body[1] >> 3) & 0x07 {
                        1 => Some(FrameKind::I),
                        2 => Some(FrameKind::P),
                        3 => Some(FrameKind::B),
                        _ => None,
                    };
                }
                _ => {}
            }
        }
        if let Some(kind) = frame {
            record_frame(stream, kind, data.len(), extended);
        }
    }

    fn sequence_header(&mut self, body: &[u8], stream: &mut Stream) {
        let width = ((body[0] as u32) << 4) | (body[1] as u32 >> 4);
        let height = (((body[1] & 0x0F) as u32) << 8) | body[2] as u32;
        let aspect = body[3] >> 4;
        let rate = body[3] & 0x0F;
        if let StreamDetails::Video(v) = &mut stream.details {
            v.width = width;
            v.height = height;
            if v.aspect_ratio == AspectRatio::Unknown {
                v.aspect_ratio = match aspect {
                    2 => AspectRatio::Aspect4x3,
                    3 => AspectRatio::Aspect16x9,
                    4 => AspectRatio::Aspect2_21,
                    _ => AspectRatio::Unknown,
                };
            }
            if v.frame_rate == FrameRate::Unknown {
                v.frame_rate = match rate {
                    1 => FrameRate::Fps23_976,
                    2 => FrameRate::Fps24,
                    3 => FrameRate::Fps25,
                    4 => FrameRate::Fps29_97,
                    6 => FrameRate::Fps50,
                    7 => FrameRate::Fps59_94,
                    _ => FrameRate::Unknown,
                };
            }
        }
        self.have_sequence = true;
        stream.is_initialized = true;
    }

    fn sequence_extension(&mut self, body: &[u8], stream: &mut Stream) {
        let profile_level = ((body[0] & 0x0F) << 4) | (body[1] >> 4);
        let progressive = body[1] & 0x08 != 0;
        if let StreamDetails::Video(v) = &mut stream.details {
            if v.profile.is_none() {
                let profile = match (profile_level >> 4) & 0x07 {
                    1 => "High",
                    2 => "Spatially Scalable",
                    3 => "SNR Scalable",
                    4 => "Main",
                    5 => "Simple",
                    _ => "Unknown",
                };
                let level = match profile_level & 0x0F {
                    4 => "High",
                    6 => "High 1440",
                    8 => "Main",
                    10 => "Low",
                    _ => "Unknown",
                };
                v.profile = Some(format!("{} Profile {} Level", profile, level));
            }
            v.interlaced = !progressive;
        }
    }
}
