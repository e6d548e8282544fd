//! Presentation graphics (PGS) caption counting.
//!
//! A display set is PCS, optional WDS/PDS, one or more ODS, then END. Each
//! display set carrying an object counts as one caption, forced or normal
//! according to the PCS object flags.

use std::collections::BTreeSet;

use crate::stream::Stream;

const SEGMENT_ODS: u8 = 0x15;
const SEGMENT_PCS: u8 = 0x16;
const SEGMENT_END: u8 = 0x80;

const OBJECT_CROPPED: u8 = 0x80;
const OBJECT_FORCED: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PgsState {
    /// No display set open.
    #[default]
    Idle,
    /// PCS seen, caption not counted yet.
    Composing { composition: u16, forced: bool },
    /// Caption counted for this display set.
    Captioned { composition: u16 },
}

#[derive(Debug, Default)]
pub struct PgsCaptions {
    state: PgsState,
    /// Composition numbers already counted.
    counted: BTreeSet<u16>,
}

impl PgsCaptions {
    pub fn state(&self) -> PgsState {
        self.state
    }

    pub fn analyze(&mut self, data: &[u8], stream: &mut Stream) {
        stream.is_vbr = true;
        let mut pos = 0;
        while pos + 3 <= data.len() {
            let segment_type = data[pos];
            let size = ((data[pos + 1] as usize) << 8) | data[pos + 2] as usize;
            let body = &data[pos + 3..(pos + 3 + size).min(data.len())];
            match segment_type {
                SEGMENT_PCS => self.composition(body, stream),
                SEGMENT_ODS => self.object(stream),
                SEGMENT_END => self.state = PgsState::Idle,
                _ => {}
            }
            pos += 3 + size;
        }
    }

    fn composition(&mut self, body: &[u8], stream: &mut Stream) {
        if body.len() < 11 {
            return;
        }
        let width = ((body[0] as u32) << 8) | body[1] as u32;
        let height = ((body[2] as u32) << 8) | body[3] as u32;
        let composition = ((body[5] as u16) << 8) | body[6] as u16;
        let object_count = body[10] as usize;

        if !stream.is_initialized {
            if let Some(g) = stream.graphics_mut() {
                g.width = width;
                g.height = height;
            }
            stream.is_initialized = true;
        }

        if object_count == 0 {
            // clears the screen; nothing to count
            self.state = PgsState::Idle;
            return;
        }

        let mut forced = false;
        let mut pos = 11;
        for _ in 0..object_count {
            let Some(&flags) = body.get(pos + 3) else {
                break;
            };
            forced |= flags & OBJECT_FORCED != 0;
            pos += 8;
            if flags & OBJECT_CROPPED != 0 {
                pos += 8;
            }
        }

        self.state = if self.counted.contains(&composition) {
            PgsState::Captioned { composition }
        } else {
            PgsState::Composing {
                composition,
                forced,
            }
        };
    }

    fn object(&mut self, stream: &mut Stream) {
        let PgsState::Composing {
            composition,
            forced,
        } = self.state
        else {
            return;
        };
        if let Some(g) = stream.graphics_mut() {
            if forced {
                g.forced_captions += 1;
            } else {
                g.captions += 1;
            }
        }
        self.counted.insert(composition);
        self.state = PgsState::Captioned { composition };
    }
}
