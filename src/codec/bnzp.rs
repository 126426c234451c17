// SPDX-License-Identifier: MPL-2.0

//! BNZP16 lossless row codec
//!
//! Compresses a row of 16-bit samples into a self-delimiting byte stream
//! (given the sample count) and inverts it exactly. Samples are
//! delta-coded against their left neighbor, zigzag mapped so small
//! movements in either direction stay small, then bit-packed in fixed-width
//! blocks. Rows that do not pack well fall back to a verbatim mode, so the
//! output never exceeds [`max_encoded_len`].

use crate::constants::BNZP_BLOCK_LEN;
use crate::errors::TransformError;

/// Verbatim little-endian samples follow the mode byte
const MODE_VERBATIM: u8 = 0;
/// Bit-packed delta blocks follow the mode byte
const MODE_PACKED: u8 = 1;

/// Upper bound on the encoded size of an `n`-sample row
pub const fn max_encoded_len(n: usize) -> usize {
    2 * n + 1
}

#[inline]
fn zigzag(delta: i16) -> u16 {
    ((delta << 1) ^ (delta >> 15)) as u16
}

#[inline]
fn unzigzag(v: u16) -> i16 {
    ((v >> 1) as i16) ^ -((v & 1) as i16)
}

#[inline]
fn bit_width(v: u16) -> u32 {
    16 - v.leading_zeros()
}

fn delta_transform(row: &[u16]) -> Vec<u16> {
    let mut prev = 0u16;
    row.iter()
        .map(|&v| {
            let d = zigzag(v.wrapping_sub(prev) as i16);
            prev = v;
            d
        })
        .collect()
}

/// Encode `row` into `out`, returning the bytes written.
///
/// `out` must hold at least [`max_encoded_len`]`(row.len())` bytes.
pub fn encode(row: &[u16], out: &mut [u8]) -> usize {
    let n = row.len();
    let verbatim_len = 1 + 2 * n;
    debug_assert!(out.len() >= verbatim_len);

    let deltas = delta_transform(row);

    let mut packed_len = 1usize;
    for block in deltas.chunks(BNZP_BLOCK_LEN) {
        let width = block.iter().map(|&v| bit_width(v)).max().unwrap_or(0);
        packed_len += 1 + (block.len() * width as usize + 7) / 8;
    }

    if packed_len >= verbatim_len {
        out[0] = MODE_VERBATIM;
        for (i, &v) in row.iter().enumerate() {
            out[1 + 2 * i..3 + 2 * i].copy_from_slice(&v.to_le_bytes());
        }
        return verbatim_len;
    }

    out[0] = MODE_PACKED;
    let mut offset = 1;
    for block in deltas.chunks(BNZP_BLOCK_LEN) {
        let width = block.iter().map(|&v| bit_width(v)).max().unwrap_or(0);
        out[offset] = width as u8;
        offset += 1;

        let mut acc: u64 = 0;
        let mut nbits: u32 = 0;
        for &v in block {
            acc |= (v as u64) << nbits;
            nbits += width;
            while nbits >= 8 {
                out[offset] = acc as u8;
                acc >>= 8;
                nbits -= 8;
                offset += 1;
            }
        }
        if nbits > 0 {
            out[offset] = acc as u8;
            offset += 1;
        }
    }
    debug_assert_eq!(offset, packed_len);
    offset
}

/// Decode `n` samples from `input` into `out`, returning the bytes
/// consumed.
///
/// Streams recovered from a crashed recording can arrive truncated or
/// bit-flipped, so every malformed input surfaces as
/// [`TransformError::CorruptStream`] rather than aborting the caller.
pub fn decode(input: &[u8], n: usize, out: &mut [u16]) -> Result<usize, TransformError> {
    debug_assert!(out.len() >= n);
    let mode = *input
        .first()
        .ok_or_else(|| TransformError::CorruptStream("empty stream".into()))?;
    match mode {
        MODE_VERBATIM => {
            let needed = 1 + 2 * n;
            if input.len() < needed {
                return Err(TransformError::CorruptStream(format!(
                    "verbatim stream holds {} of {} bytes",
                    input.len(),
                    needed
                )));
            }
            for i in 0..n {
                out[i] = u16::from_le_bytes([input[1 + 2 * i], input[2 + 2 * i]]);
            }
            Ok(needed)
        }
        MODE_PACKED => {
            let mut offset = 1;
            let mut produced = 0;
            let mut prev = 0u16;
            while produced < n {
                let block_len = BNZP_BLOCK_LEN.min(n - produced);
                let width = *input.get(offset).ok_or_else(|| {
                    TransformError::CorruptStream("stream ends inside a block header".into())
                })? as u32;
                if width > 16 {
                    return Err(TransformError::CorruptStream(format!(
                        "block bit width {} out of range",
                        width
                    )));
                }
                offset += 1;

                let mut acc: u64 = 0;
                let mut nbits: u32 = 0;
                let mask = if width == 0 { 0 } else { (1u64 << width) - 1 };
                for _ in 0..block_len {
                    while nbits < width {
                        let byte = *input.get(offset).ok_or_else(|| {
                            TransformError::CorruptStream("stream ends inside a block".into())
                        })?;
                        acc |= (byte as u64) << nbits;
                        nbits += 8;
                        offset += 1;
                    }
                    let zz = (acc & mask) as u16;
                    acc >>= width;
                    nbits -= width;
                    prev = prev.wrapping_add(unzigzag(zz) as u16);
                    out[produced] = prev;
                    produced += 1;
                }
                // Padding bits of a partially filled final byte die with
                // the block-local accumulator
            }
            Ok(offset)
        }
        mode => Err(TransformError::CorruptStream(format!(
            "invalid mode byte {}",
            mode
        ))),
    }
}
