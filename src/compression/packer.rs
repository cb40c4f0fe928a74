//! Bit-packed adjacency blocks
//!
//! Layout of one packed adjacency list of `degree` targets:
//!
//! ```text
//! [header: one bit-width byte per packed block]
//! [block 0: ceil(64 * bits_0 / 8) bytes] [properties 0: 64 x f64 LE]?
//! [block 1 ...]
//! [tail]                                  [tail properties]?
//! ```
//!
//! Targets are sorted, aggregated and delta encoded over the whole list
//! before being cut into blocks of [`BLOCK_SIZE`]. The tail (the last
//! `degree % 64` deltas) is written according to the [`TailStrategy`]:
//! - `BlockAligned`: padded to a full block at its own bit width
//! - `PackedTail`: exactly `ceil(len * bits / 8)` bytes
//! - `VarLongTail`: var-long bytes, no header entry

use super::aggregation::{aggregate_targets, aggregate_with_properties, Aggregation};
use super::bit_buffer::{bits_needed, bytes_needed, pack, unpack};
use super::varint::{decode_var_long, encode_var_longs};
use super::{read_f64_le, TailStrategy, BLOCK_SIZE};
use crate::{KnnError, Result};

/// Number of header bytes for a list of `degree` targets.
#[inline]
pub fn header_len(degree: usize, tail: TailStrategy) -> usize {
    let full_blocks = degree / BLOCK_SIZE;
    let has_packed_tail = degree % BLOCK_SIZE > 0 && tail != TailStrategy::VarLongTail;
    full_blocks + has_packed_tail as usize
}

/// Round `length` up to a multiple of the block size.
#[inline]
pub fn align(length: usize) -> usize {
    length.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Turn an ascending sequence into gaps (first value relative to 0).
fn delta_encode(values: &mut [u64]) {
    for i in (1..values.len()).rev() {
        values[i] -= values[i - 1];
    }
}

fn write_packed(chunk: &[u64], bits: u32, slots: usize, out: &mut Vec<u8>) -> Result<()> {
    let start = out.len();
    out.resize(start + bytes_needed(bits, slots), 0);
    pack(chunk, bits, &mut out[start..])?;
    Ok(())
}

fn write_properties(properties: &[f64], out: &mut Vec<u8>) {
    for p in properties {
        out.extend_from_slice(&p.to_le_bytes());
    }
}

pub struct AdjacencyPacker;

impl AdjacencyPacker {
    /// Sort, aggregate and pack `values` into `out`. Returns the degree.
    pub fn compress(
        values: &mut Vec<u64>,
        aggregation: Aggregation,
        tail: TailStrategy,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        let degree = aggregate_targets(values, aggregation);
        Self::encode_sorted(values, None, tail, out)?;
        Ok(degree)
    }

    /// Same as [`compress`](Self::compress) with one property per target,
    /// co-encoded after each block.
    pub fn compress_with_properties(
        values: &mut Vec<u64>,
        properties: &mut Vec<f64>,
        aggregation: Aggregation,
        tail: TailStrategy,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        if values.len() != properties.len() {
            return Err(KnnError::InvalidArgument(format!(
                "{} targets but {} properties",
                values.len(),
                properties.len()
            )));
        }
        let degree = aggregate_with_properties(values, properties, aggregation);
        Self::encode_sorted(values, Some(properties), tail, out)?;
        Ok(degree)
    }

    fn encode_sorted(
        values: &[u64],
        properties: Option<&[f64]>,
        tail: TailStrategy,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let degree = values.len();
        let mut deltas = values.to_vec();
        delta_encode(&mut deltas);

        let full_blocks = degree / BLOCK_SIZE;
        let tail_len = degree % BLOCK_SIZE;

        let header_start = out.len();
        out.resize(header_start + header_len(degree, tail), 0);

        for block in 0..full_blocks {
            let range = block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE;
            let chunk = &deltas[range.clone()];
            let bits = bits_needed(chunk);
            out[header_start + block] = bits as u8;
            write_packed(chunk, bits, BLOCK_SIZE, out)?;

            if let Some(props) = properties {
                write_properties(&props[range], out);
            }
        }

        if tail_len > 0 {
            let range = full_blocks * BLOCK_SIZE..degree;
            let chunk = &deltas[range.clone()];

            match tail {
                TailStrategy::BlockAligned => {
                    let bits = bits_needed(chunk);
                    out[header_start + full_blocks] = bits as u8;
                    write_packed(chunk, bits, BLOCK_SIZE, out)?;
                }
                TailStrategy::PackedTail => {
                    let bits = bits_needed(chunk);
                    out[header_start + full_blocks] = bits as u8;
                    write_packed(chunk, bits, tail_len, out)?;
                }
                TailStrategy::VarLongTail => {
                    encode_var_longs(chunk, out);
                }
            }

            if let Some(props) = properties {
                write_properties(&props[range], out);
            }
        }

        Ok(())
    }
}

/// Block-at-a-time decoder for one packed adjacency list.
///
/// Owns no bytes; the caller hands in the list's byte slice on every call
/// so that cursors can keep the buffer behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PackedBlockDecoder {
    degree: usize,
    tail: TailStrategy,
    with_properties: bool,
    block_index: usize,
    offset: usize,
    running: u64,
    decoded: usize,
}

impl PackedBlockDecoder {
    pub fn new(degree: usize, tail: TailStrategy, with_properties: bool) -> Self {
        Self {
            degree,
            tail,
            with_properties,
            block_index: 0,
            offset: header_len(degree, tail),
            running: 0,
            decoded: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.degree - self.decoded
    }

    /// Decode the next block into `targets` (and `properties` when given).
    /// Returns the number of values produced, 0 once exhausted.
    pub fn next_block(
        &mut self,
        bytes: &[u8],
        targets: &mut [u64; BLOCK_SIZE],
        properties: Option<&mut [f64; BLOCK_SIZE]>,
    ) -> Result<usize> {
        let len = self.remaining().min(BLOCK_SIZE);
        if len == 0 {
            return Ok(0);
        }
        let is_tail = len < BLOCK_SIZE;

        if is_tail && self.tail == TailStrategy::VarLongTail {
            for slot in targets[..len].iter_mut() {
                let (value, consumed) = decode_var_long(bytes, self.offset)?;
                self.offset += consumed;
                *slot = value;
            }
        } else {
            let bits = *bytes.get(self.block_index).ok_or_else(|| {
                KnnError::CorruptEncoding(format!("missing header byte {}", self.block_index))
            })? as u32;
            if bits > 64 {
                return Err(KnnError::CorruptEncoding(format!(
                    "block {} declares {} bits",
                    self.block_index, bits
                )));
            }

            let slots = if is_tail && self.tail == TailStrategy::PackedTail {
                len
            } else {
                BLOCK_SIZE
            };
            let size = bytes_needed(bits, slots);
            let block = bytes.get(self.offset..self.offset + size).ok_or_else(|| {
                KnnError::CorruptEncoding(format!(
                    "block {} ({} bytes at {}) exceeds list of {} bytes",
                    self.block_index,
                    size,
                    self.offset,
                    bytes.len()
                ))
            })?;
            unpack(block, bits, &mut targets[..len])?;

            self.offset += size;
            self.block_index += 1;
        }

        for slot in targets[..len].iter_mut() {
            self.running = self.running.wrapping_add(*slot);
            *slot = self.running;
        }

        if self.with_properties {
            if let Some(props) = properties {
                for (i, slot) in props[..len].iter_mut().enumerate() {
                    *slot = read_f64_le(bytes, self.offset + i * 8)?;
                }
            }
            self.offset += len * 8;
        }

        self.decoded += len;
        Ok(len)
    }
}

pub struct AdjacencyUnpacker;

impl AdjacencyUnpacker {
    pub fn decompress(bytes: &[u8], degree: usize, tail: TailStrategy) -> Result<Vec<u64>> {
        let mut decoder = PackedBlockDecoder::new(degree, tail, false);
        let mut block = [0u64; BLOCK_SIZE];
        let mut out = Vec::with_capacity(degree);

        loop {
            let n = decoder.next_block(bytes, &mut block, None)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&block[..n]);
        }

        Ok(out)
    }

    pub fn decompress_with_properties(
        bytes: &[u8],
        degree: usize,
        tail: TailStrategy,
    ) -> Result<(Vec<u64>, Vec<f64>)> {
        let mut decoder = PackedBlockDecoder::new(degree, tail, true);
        let mut block = [0u64; BLOCK_SIZE];
        let mut props = [0f64; BLOCK_SIZE];
        let mut targets = Vec::with_capacity(degree);
        let mut properties = Vec::with_capacity(degree);

        loop {
            let n = decoder.next_block(bytes, &mut block, Some(&mut props))?;
            if n == 0 {
                break;
            }
            targets.extend_from_slice(&block[..n]);
            properties.extend_from_slice(&props[..n]);
        }

        Ok((targets, properties))
    }
}
