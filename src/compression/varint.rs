//! Zig-zag / var-long encoding for adjacency lists
//!
//! - Var-long: 7 data bits per byte, little-endian groups
//! - The **last** byte of a value carries the high bit (0x80); all
//!   preceding bytes have it cleared
//! - Zig-zag maps signed deltas onto unsigned integers so small negative
//!   deltas stay short
//!
//! Streams produced here are the on-disk shape of `Compression::VarLong`
//! adjacency lists and of the var-long tail of packed lists.

use super::ValueMapper;
use crate::{KnnError, Result};

/// Maximum encoded size of a single u64 (ceil(64 / 7)).
pub const MAX_VAR_LONG_BYTES: usize = 10;

#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bytes `encode_var_long` writes for `value`.
#[inline]
pub fn var_long_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Append a var-long to `out`, returning the number of bytes written.
///
/// Format:
/// - Each byte: [terminator_bit:1][data:7]
/// - terminator_bit=1 marks the final byte of the value
pub fn encode_var_long(mut value: u64, out: &mut Vec<u8>) -> usize {
    let start = out.len();

    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;

        if value == 0 {
            out.push(byte | 0x80);
            break;
        }

        out.push(byte);
    }

    out.len() - start
}

/// Decode one var-long starting at `pos`.
///
/// Returns: (decoded_value, bytes_consumed)
pub fn decode_var_long(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut cursor = pos;

    loop {
        let byte = match bytes.get(cursor) {
            Some(&b) => b,
            None => {
                return Err(KnnError::CorruptEncoding(format!(
                    "truncated var-long starting at offset {}",
                    pos
                )))
            }
        };
        cursor += 1;

        check_shift(shift, byte, pos)?;
        value |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 != 0 {
            return Ok((value, cursor - pos));
        }

        shift += 7;
    }
}

#[inline]
fn check_shift(shift: u32, byte: u8, pos: usize) -> Result<()> {
    // 第10个字节只允许携带最高的1个bit
    if shift > 63 || (shift == 63 && (byte & 0x7E) != 0) {
        return Err(KnnError::CorruptEncoding(format!(
            "var-long overflow at offset {}",
            pos
        )));
    }
    Ok(())
}

/// Delta + zig-zag + var-long encode `values` into `out`.
///
/// The input does not have to be sorted; deltas are computed with wrapping
/// arithmetic and zig-zag mapped, so every `u64` sequence round-trips.
pub fn zigzag_delta_compress(values: &[u64], out: &mut Vec<u8>) -> usize {
    let start = out.len();
    let mut previous = 0u64;

    for &value in values {
        let delta = value.wrapping_sub(previous) as i64;
        encode_var_long(zigzag_encode(delta), out);
        previous = value;
    }

    out.len() - start
}

/// Resumable position inside a zig-zag delta stream.
///
/// Carries the byte offset and the running total so that a cursor can
/// decode a long list chunk by chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZigZagState {
    pub offset: usize,
    pub running: u64,
}

/// Decode up to `out.len()` values from `bytes[state.offset..limit]`.
///
/// Stops when `out` is full or the limit is reached. A value whose
/// terminating byte does not appear before `limit` is a corrupt stream.
pub fn zigzag_uncompress_partial<M: ValueMapper + ?Sized>(
    bytes: &[u8],
    limit: usize,
    state: &mut ZigZagState,
    out: &mut [u64],
    mapper: &M,
) -> Result<usize> {
    if limit > bytes.len() {
        return Err(KnnError::CorruptEncoding(format!(
            "limit {} exceeds buffer of {} bytes",
            limit,
            bytes.len()
        )));
    }

    let mut into = 0;
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut offset = state.offset;
    let mut value_start = offset;

    while offset < limit && into < out.len() {
        let byte = bytes[offset];
        offset += 1;

        check_shift(shift, byte, value_start)?;
        value |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 != 0 {
            state.running = state.running.wrapping_add(zigzag_decode(value) as u64);
            out[into] = mapper.map(state.running);
            into += 1;
            value = 0;
            shift = 0;
            value_start = offset;
        } else {
            shift += 7;
        }
    }

    if shift != 0 {
        return Err(KnnError::CorruptEncoding(format!(
            "unterminated var-long at offset {}",
            value_start
        )));
    }

    state.offset = offset;
    Ok(into)
}

/// Decode an entire zig-zag stream of `limit` bytes into `out`.
///
/// Returns the number of decoded values. Fails if the stream holds more
/// values than `out` can take.
pub fn zigzag_uncompress<M: ValueMapper + ?Sized>(
    bytes: &[u8],
    limit: usize,
    out: &mut [u64],
    mapper: &M,
) -> Result<usize> {
    let mut state = ZigZagState::default();
    let count = zigzag_uncompress_partial(bytes, limit, &mut state, out, mapper)?;

    if state.offset < limit {
        return Err(KnnError::CorruptEncoding(format!(
            "output of {} values exhausted with {} bytes left",
            out.len(),
            limit - state.offset
        )));
    }

    Ok(count)
}

/// Plain var-long encode every value (no deltas, no zig-zag).
pub fn encode_var_longs(values: &[u64], out: &mut Vec<u8>) -> usize {
    values.iter().map(|&v| encode_var_long(v, out)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Identity;

    #[test]
    fn test_zigzag_mapping() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);

        for v in [0i64, 1, -1, 63, -64, 1 << 40, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn test_var_long_encoding() {
        let test_cases = vec![0u64, 127, 128, 16383, 16384, u64::MAX];

        for value in test_cases {
            let mut encoded = Vec::new();
            let written = encode_var_long(value, &mut encoded);
            assert_eq!(written, var_long_size(value));

            let (decoded, consumed) = decode_var_long(&encoded, 0).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_terminator_bit_on_last_byte() {
        let mut encoded = Vec::new();
        encode_var_long(300, &mut encoded);
        // 300 = 0b10_0101100 -> [0x2C, 0x02 | 0x80]
        assert_eq!(encoded, vec![0x2C, 0x82]);
    }

    #[test]
    fn test_truncated_var_long_is_corrupt() {
        let mut encoded = Vec::new();
        encode_var_long(1 << 30, &mut encoded);
        encoded.pop();

        let err = decode_var_long(&encoded, 0).unwrap_err();
        assert!(matches!(err, KnnError::CorruptEncoding(_)));
    }

    #[test]
    fn test_overlong_var_long_is_corrupt() {
        // 11 bytes without terminator followed by one with it
        let mut bytes = vec![0x7F; 10];
        bytes.push(0x81);
        assert!(decode_var_long(&bytes, 0).is_err());
    }

    #[test]
    fn test_zigzag_stream_sorted() {
        let values = vec![3u64, 7, 7, 100, 1_000_000, 1_000_001];
        let mut bytes = Vec::new();
        let len = zigzag_delta_compress(&values, &mut bytes);

        let mut out = vec![0u64; values.len()];
        let n = zigzag_uncompress(&bytes, len, &mut out, &Identity).unwrap();
        assert_eq!(n, values.len());
        assert_eq!(out, values);
    }

    #[test]
    fn test_zigzag_stream_unsorted() {
        let values = vec![100u64, 3, u64::MAX, 0, 42];
        let mut bytes = Vec::new();
        let len = zigzag_delta_compress(&values, &mut bytes);

        let mut out = vec![0u64; values.len()];
        zigzag_uncompress(&bytes, len, &mut out, &Identity).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_zigzag_with_mapper() {
        let values = vec![1u64, 2, 5];
        let mut bytes = Vec::new();
        let len = zigzag_delta_compress(&values, &mut bytes);

        let mut out = vec![0u64; 3];
        zigzag_uncompress(&bytes, len, &mut out, &|v: u64| v * 10).unwrap();
        assert_eq!(out, vec![10, 20, 50]);
    }

    #[test]
    fn test_unterminated_stream_is_corrupt() {
        let bytes = vec![0x81, 0x05, 0x05];
        let mut out = vec![0u64; 4];
        let err = zigzag_uncompress(&bytes, bytes.len(), &mut out, &Identity).unwrap_err();
        assert!(matches!(err, KnnError::CorruptEncoding(_)));
    }

    #[test]
    fn test_limit_beyond_buffer_is_corrupt() {
        let bytes = vec![0x81];
        let mut out = vec![0u64; 4];
        assert!(zigzag_uncompress(&bytes, 8, &mut out, &Identity).is_err());
    }

    #[test]
    fn test_partial_decode_resumes() {
        let values: Vec<u64> = (0..10).map(|i| i * 1000).collect();
        let mut bytes = Vec::new();
        let len = zigzag_delta_compress(&values, &mut bytes);

        let mut state = ZigZagState::default();
        let mut chunk = [0u64; 4];
        let mut decoded = Vec::new();
        loop {
            let n = zigzag_uncompress_partial(&bytes, len, &mut state, &mut chunk, &Identity)
                .unwrap();
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(decoded, values);
    }
}
