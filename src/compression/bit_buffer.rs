//! Bounds-checked bit-level reads and writes over byte buffers
//!
//! Bits are laid out LSB first: bit `i` of the stream lives in byte
//! `i / 8` at position `i % 8`. Values wider than the remaining bits of a
//! byte continue in the next byte.

use crate::{KnnError, Result};

/// Number of significant bits across all values (0 for an all-zero slice).
#[inline]
pub fn bits_needed(values: &[u64]) -> u32 {
    let bits = values.iter().fold(0u64, |acc, &v| acc | v);
    64 - bits.leading_zeros()
}

/// Bytes needed to hold `len` values of `bits` bits each.
#[inline]
pub fn bytes_needed(bits: u32, len: usize) -> usize {
    (len * bits as usize).div_ceil(8)
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sequential bit writer into a zero-initialised byte slice.
pub struct BitWriter<'a> {
    out: &'a mut [u8],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: &'a mut [u8]) -> Self {
        Self { out, bit_pos: 0 }
    }

    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Write the low `bits` bits of `value`.
    pub fn write(&mut self, value: u64, bits: u32) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        if bits > 64 {
            return Err(KnnError::InvalidArgument(format!("bit width {} > 64", bits)));
        }

        let end = self.bit_pos + bits as usize;
        if end.div_ceil(8) > self.out.len() {
            return Err(KnnError::InvalidArgument(format!(
                "bit write of {} bits at {} overflows {} byte buffer",
                bits,
                self.bit_pos,
                self.out.len()
            )));
        }

        let mut v = value & low_mask(bits);
        let mut remaining = bits;
        while remaining > 0 {
            let byte_idx = self.bit_pos / 8;
            let bit_off = (self.bit_pos % 8) as u32;
            let take = (8 - bit_off).min(remaining);

            let chunk = (v & low_mask(take)) as u8;
            self.out[byte_idx] |= chunk << bit_off;

            v >>= take;
            remaining -= take;
            self.bit_pos += take as usize;
        }

        Ok(())
    }

    /// Bytes touched so far.
    pub fn bytes_written(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }
}

/// Sequential bit reader, the mirror of [`BitWriter`].
pub struct BitReader<'a> {
    input: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, bit_pos: 0 }
    }

    pub fn read(&mut self, bits: u32) -> Result<u64> {
        if bits == 0 {
            return Ok(0);
        }
        if bits > 64 {
            return Err(KnnError::CorruptEncoding(format!("bit width {} > 64", bits)));
        }

        let end = self.bit_pos + bits as usize;
        if end.div_ceil(8) > self.input.len() {
            return Err(KnnError::CorruptEncoding(format!(
                "bit read of {} bits at {} past end of {} byte block",
                bits,
                self.bit_pos,
                self.input.len()
            )));
        }

        let mut value = 0u64;
        let mut filled = 0u32;
        while filled < bits {
            let byte_idx = self.bit_pos / 8;
            let bit_off = (self.bit_pos % 8) as u32;
            let take = (8 - bit_off).min(bits - filled);

            let chunk = ((self.input[byte_idx] >> bit_off) as u64) & low_mask(take);
            value |= chunk << filled;

            filled += take;
            self.bit_pos += take as usize;
        }

        Ok(value)
    }
}

/// Pack `values` at `bits` bits each into `out`, which must be zeroed and
/// at least `bytes_needed(bits, values.len())` long.
pub fn pack(values: &[u64], bits: u32, out: &mut [u8]) -> Result<usize> {
    let mut writer = BitWriter::new(out);
    for &value in values {
        writer.write(value, bits)?;
    }
    Ok(writer.bytes_written())
}

/// Unpack `out.len()` values of `bits` bits each from `input`.
pub fn unpack(input: &[u8], bits: u32, out: &mut [u64]) -> Result<()> {
    let mut reader = BitReader::new(input);
    for slot in out.iter_mut() {
        *slot = reader.read(bits)?;
    }
    Ok(())
}
