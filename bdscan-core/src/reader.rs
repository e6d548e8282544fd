//! Byte and bit readers used by every binary parser in the crate.
//!
//! All multi-byte values on a Blu-ray disc are big-endian.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Result, ScanError};

// ============================================================================
// Byte Reader
// ============================================================================

/// Sequential / random-access big-endian reader over any seekable source.
pub struct ByteReader<R: Read + Seek> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn remaining(&mut self) -> Result<u64> {
        Ok(self.len.saturating_sub(self.position()?))
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(ScanError::UnexpectedEndOfData);
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, count: u64) -> Result<()> {
        let pos = self.position()?;
        self.seek_to(pos + count)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ScanError::UnexpectedEndOfData,
            _ => ScanError::Io(e),
        })
    }

    fn read_array<const N: usize>(&mut self, advance: bool) -> Result<[u8; N]> {
        let start = self.position()?;
        let mut buf = [0u8; N];
        let res = self.fill(&mut buf);
        if !advance || res.is_err() {
            self.inner.seek(SeekFrom::Start(start))?;
        }
        res.map(|_| buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>(true)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array(true)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array(true)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array(true)?))
    }

    pub fn peek_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>(false)?[0])
    }

    pub fn peek_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array(false)?))
    }

    pub fn peek_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array(false)?))
    }

    pub fn peek_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array(false)?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        if (count as u64) > self.remaining()? {
            return Err(ScanError::UnexpectedEndOfData);
        }
        let mut buf = vec![0u8; count];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Fixed-width ASCII field (names, language codes, type indicators).
    pub fn read_ascii(&mut self, count: usize) -> Result<String> {
        let bytes = self.read_bytes(count)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

// ============================================================================
// Bit Reader
// ============================================================================

/// MSB-first bit cursor over a byte-aligned buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Start over on a new buffer.
    pub fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
        self.bit_pos = 0;
    }

    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    pub fn byte_position(&self) -> usize {
        self.bit_pos / 8
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        if count == 0 || count > 32 {
            return Err(ScanError::UnexpectedEndOfData);
        }
        if self.bits_remaining() < count as usize {
            return Err(ScanError::UnexpectedEndOfData);
        }
        let mut value: u32 = 0;
        for _ in 0..count {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Ok(value)
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<()> {
        if self.bits_remaining() < count {
            return Err(ScanError::UnexpectedEndOfData);
        }
        self.bit_pos += count;
        Ok(())
    }

    pub fn byte_align(&mut self) {
        self.bit_pos = (self.bit_pos + 7) / 8 * 8;
    }

    /// Unsigned Exp-Golomb code.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(ScanError::UnexpectedEndOfData);
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)? as u64;
        Ok(((1u64 << leading_zeros) - 1 + suffix) as u32)
    }

    /// Signed Exp-Golomb code.
    pub fn read_se(&mut self) -> Result<i32> {
        let k = self.read_ue()? as i64;
        let value = if k % 2 == 1 { (k + 1) / 2 } else { -(k / 2) };
        Ok(value as i32)
    }
}

/// Strip H.264/HEVC emulation-prevention bytes (`00 00 03` → `00 00`).
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}
