//! Sample packing for PNG scanlines.
//!
//! Depths below 8 pack several samples per byte, most significant bits
//! first. At 8 and 16 bits the unpacked and packed layouts coincide.

use crate::color::BitDepth;
use crate::error::{Error, Result};

/// Smallest bit depth whose index range covers a palette of `len` entries.
pub fn palette_bit_depth(len: usize) -> BitDepth {
    if len <= 2 {
        BitDepth::One
    } else if len <= 4 {
        BitDepth::Two
    } else if len <= 16 {
        BitDepth::Four
    } else {
        BitDepth::Eight
    }
}

/// Pack unpacked `samples` into a scanline.
///
/// `out` must hold exactly the packed length; trailing bits of the last
/// byte are zeroed. Samples that do not fit in `bit_depth` are rejected.
pub fn pack_row(samples: &[u8], bit_depth: BitDepth, out: &mut [u8]) -> Result<()> {
    let bits = bit_depth.bits();
    if bits >= 8 {
        out.copy_from_slice(samples);
        return Ok(());
    }

    let max = bit_depth.max_value() as u8;
    let per_byte = (8 / bits) as usize;
    for (byte, group) in out.iter_mut().zip(samples.chunks(per_byte)) {
        let mut acc = 0u8;
        for (i, &v) in group.iter().enumerate() {
            if v > max {
                return Err(Error::SampleOutOfRange {
                    value: v,
                    bit_depth: bits,
                });
            }
            acc |= v << (8 - bits as usize * (i + 1));
        }
        *byte = acc;
    }
    Ok(())
}

/// Expand a packed scanline into one byte per sample.
///
/// The number of samples produced is `samples.len()`; padding bits in the
/// last packed byte are ignored.
pub fn unpack_row(packed: &[u8], bit_depth: BitDepth, samples: &mut [u8]) {
    let bits = bit_depth.bits();
    if bits >= 8 {
        samples.copy_from_slice(&packed[..samples.len()]);
        return;
    }

    let mask = bit_depth.max_value() as u8;
    let per_byte = (8 / bits) as usize;
    for (group, &byte) in samples.chunks_mut(per_byte).zip(packed) {
        for (i, sample) in group.iter_mut().enumerate() {
            *sample = (byte >> (8 - bits as usize * (i + 1))) & mask;
        }
    }
}

/// Rescale a sample to the 0-255 range.
#[inline]
pub fn scale_to_8bit(value: u16, bit_depth: BitDepth) -> u8 {
    match bit_depth {
        BitDepth::One => (value as u8 & 1) * 0xFF,
        BitDepth::Two => (value as u8 & 3) * 0x55,
        BitDepth::Four => (value as u8 & 0xF) * 0x11,
        BitDepth::Eight => value as u8,
        BitDepth::Sixteen => (value >> 8) as u8,
    }
}
