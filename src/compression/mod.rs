//! Adjacency compression codecs
//!
//! Three encodings for a node's relationship targets (plus optional
//! per-relationship `f64` properties):
//! - `Uncompressed`: raw little-endian u64 words
//! - `VarLong`: delta + zig-zag + var-long stream
//! - `Packed`: 64-value bit-packed blocks with a configurable tail
//!
//! All decoders are bounded by the byte length of the list they read and
//! report malformed input as [`KnnError::CorruptEncoding`].

pub mod aggregation;
pub mod bit_buffer;
pub mod packer;
pub mod varint;

pub use aggregation::Aggregation;
pub use packer::{AdjacencyPacker, AdjacencyUnpacker, PackedBlockDecoder};
pub use varint::{zigzag_delta_compress, zigzag_uncompress, ZigZagState};

use crate::{KnnError, Result};
use serde::{Deserialize, Serialize};

/// Number of values per bit-packed block.
pub const BLOCK_SIZE: usize = 64;

/// Translates decoded ids, e.g. original ids to internal ids.
pub trait ValueMapper {
    fn map(&self, value: u64) -> u64;
}

/// Leaves decoded values untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ValueMapper for Identity {
    #[inline]
    fn map(&self, value: u64) -> u64 {
        value
    }
}

impl<F> ValueMapper for F
where
    F: Fn(u64) -> u64,
{
    #[inline]
    fn map(&self, value: u64) -> u64 {
        self(value)
    }
}

/// How the final partial block of a packed list is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailStrategy {
    BlockAligned,
    PackedTail,
    VarLongTail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Compression {
    Uncompressed,
    #[default]
    VarLong,
    Packed(TailStrategy),
}

impl Compression {
    /// Stable one-byte tag used by the on-disk header.
    pub fn tag(&self) -> u8 {
        match self {
            Compression::Uncompressed => 0,
            Compression::VarLong => 1,
            Compression::Packed(TailStrategy::BlockAligned) => 2,
            Compression::Packed(TailStrategy::PackedTail) => 3,
            Compression::Packed(TailStrategy::VarLongTail) => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Compression::Uncompressed),
            1 => Ok(Compression::VarLong),
            2 => Ok(Compression::Packed(TailStrategy::BlockAligned)),
            3 => Ok(Compression::Packed(TailStrategy::PackedTail)),
            4 => Ok(Compression::Packed(TailStrategy::VarLongTail)),
            other => Err(KnnError::Corruption(format!("unknown compression tag {}", other))),
        }
    }
}

#[inline]
pub(crate) fn read_u64_le(bytes: &[u8], offset: usize) -> Result<u64> {
    let word = bytes.get(offset..offset + 8).ok_or_else(|| {
        KnnError::CorruptEncoding(format!(
            "8-byte read at {} past end of {} bytes",
            offset,
            bytes.len()
        ))
    })?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(word);
    Ok(u64::from_le_bytes(buf))
}

#[inline]
pub(crate) fn read_f64_le(bytes: &[u8], offset: usize) -> Result<f64> {
    read_u64_le(bytes, offset).map(f64::from_bits)
}

/// Encode one adjacency list. `targets` (and `properties`) are sorted and
/// aggregated in place; the returned degree is their final length.
pub fn compress(
    compression: Compression,
    targets: &mut Vec<u64>,
    mut properties: Option<&mut Vec<f64>>,
    aggregation: Aggregation,
    out: &mut Vec<u8>,
) -> Result<usize> {
    match compression {
        Compression::Packed(tail) => match properties {
            Some(props) => {
                AdjacencyPacker::compress_with_properties(targets, props, aggregation, tail, out)
            }
            None => AdjacencyPacker::compress(targets, aggregation, tail, out),
        },
        Compression::Uncompressed | Compression::VarLong => {
            let degree = match &mut properties {
                Some(props) => aggregation::aggregate_with_properties(targets, props, aggregation),
                None => aggregation::aggregate_targets(targets, aggregation),
            };

            if compression == Compression::VarLong {
                zigzag_delta_compress(targets, out);
            } else {
                for t in targets.iter() {
                    out.extend_from_slice(&t.to_le_bytes());
                }
            }

            if let Some(props) = properties {
                for p in props.iter() {
                    out.extend_from_slice(&p.to_le_bytes());
                }
            }
            Ok(degree)
        }
    }
}

/// Resumable chunked decoder over one encoded adjacency list.
#[derive(Debug, Clone)]
pub enum AdjacencyDecoder {
    Uncompressed {
        degree: usize,
        decoded: usize,
        with_properties: bool,
    },
    VarLong {
        degree: usize,
        decoded: usize,
        stream_len: usize,
        state: ZigZagState,
        with_properties: bool,
    },
    Packed(PackedBlockDecoder),
}

impl AdjacencyDecoder {
    /// `byte_len` is the length of the list's byte slice, properties
    /// included.
    pub fn new(
        compression: Compression,
        degree: usize,
        byte_len: usize,
        with_properties: bool,
    ) -> Self {
        match compression {
            Compression::Uncompressed => AdjacencyDecoder::Uncompressed {
                degree,
                decoded: 0,
                with_properties,
            },
            Compression::VarLong => AdjacencyDecoder::VarLong {
                degree,
                decoded: 0,
                stream_len: if with_properties {
                    byte_len.saturating_sub(degree * 8)
                } else {
                    byte_len
                },
                state: ZigZagState::default(),
                with_properties,
            },
            Compression::Packed(tail) => {
                AdjacencyDecoder::Packed(PackedBlockDecoder::new(degree, tail, with_properties))
            }
        }
    }

    pub fn remaining(&self) -> usize {
        match self {
            AdjacencyDecoder::Uncompressed { degree, decoded, .. }
            | AdjacencyDecoder::VarLong { degree, decoded, .. } => degree - decoded,
            AdjacencyDecoder::Packed(decoder) => decoder.remaining(),
        }
    }

    /// Decode up to [`BLOCK_SIZE`] values. Returns 0 once exhausted.
    pub fn next_chunk(
        &mut self,
        bytes: &[u8],
        targets: &mut [u64; BLOCK_SIZE],
        properties: Option<&mut [f64; BLOCK_SIZE]>,
    ) -> Result<usize> {
        match self {
            AdjacencyDecoder::Packed(decoder) => decoder.next_block(bytes, targets, properties),
            AdjacencyDecoder::Uncompressed {
                degree,
                decoded,
                with_properties,
            } => {
                let len = (*degree - *decoded).min(BLOCK_SIZE);
                for (i, slot) in targets[..len].iter_mut().enumerate() {
                    *slot = read_u64_le(bytes, (*decoded + i) * 8)?;
                }
                if *with_properties {
                    if let Some(props) = properties {
                        let base = *degree * 8;
                        for (i, slot) in props[..len].iter_mut().enumerate() {
                            *slot = read_f64_le(bytes, base + (*decoded + i) * 8)?;
                        }
                    }
                }
                *decoded += len;
                Ok(len)
            }
            AdjacencyDecoder::VarLong {
                degree,
                decoded,
                stream_len,
                state,
                with_properties,
            } => {
                let len = (*degree - *decoded).min(BLOCK_SIZE);
                if len == 0 {
                    return Ok(0);
                }
                let n = varint::zigzag_uncompress_partial(
                    bytes,
                    *stream_len,
                    state,
                    &mut targets[..len],
                    &Identity,
                )?;
                if n != len {
                    return Err(KnnError::CorruptEncoding(format!(
                        "expected {} values, stream ended after {}",
                        len, n
                    )));
                }
                if *with_properties {
                    if let Some(props) = properties {
                        let base = *stream_len;
                        for (i, slot) in props[..len].iter_mut().enumerate() {
                            *slot = read_f64_le(bytes, base + (*decoded + i) * 8)?;
                        }
                    }
                }
                *decoded += len;
                Ok(len)
            }
        }
    }
}

/// Decode a whole list into a vector of targets.
pub fn decompress(
    compression: Compression,
    bytes: &[u8],
    degree: usize,
    with_properties: bool,
) -> Result<Vec<u64>> {
    let mut decoder = AdjacencyDecoder::new(compression, degree, bytes.len(), with_properties);
    let mut chunk = [0u64; BLOCK_SIZE];
    let mut out = Vec::with_capacity(degree);
    loop {
        let n = decoder.next_chunk(bytes, &mut chunk, None)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}
