//! IHDR parsing and serialisation.

use crate::color::{filter_bpp, scanline_bytes, BitDepth, ColorType};
use crate::error::{Error, Result};

/// Scanline interlacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterlaceMethod {
    /// Rows in order.
    #[default]
    None,
    /// Seven-pass Adam7.
    Adam7,
}

/// Contents of the IHDR chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngHeader {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per sample (per index for palette images).
    pub bit_depth: BitDepth,
    /// Color type.
    pub color_type: ColorType,
    /// Interlace method.
    pub interlace: InterlaceMethod,
}

impl PngHeader {
    /// Length of the IHDR payload.
    pub const LEN: usize = 13;

    /// Parse and validate an IHDR payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(Error::InvalidHeader(format!(
                "IHDR length {} (expected 13)",
                data.len()
            )));
        }

        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(Error::InvalidDimensions { width, height });
        }

        let color_type = ColorType::try_from(data[9])
            .map_err(|v| Error::InvalidHeader(format!("unknown color type {v}")))?;
        let bit_depth = BitDepth::try_from(data[8]).map_err(|v| Error::InvalidBitDepth {
            bit_depth: v,
            color_type: data[9],
        })?;
        if !color_type.supports_bit_depth(bit_depth) {
            return Err(Error::InvalidBitDepth {
                bit_depth: data[8],
                color_type: data[9],
            });
        }

        if data[10] != 0 {
            return Err(Error::InvalidHeader(format!(
                "unknown compression method {}",
                data[10]
            )));
        }
        if data[11] != 0 {
            return Err(Error::InvalidHeader(format!(
                "unknown filter method {}",
                data[11]
            )));
        }
        let interlace = match data[12] {
            0 => InterlaceMethod::None,
            1 => InterlaceMethod::Adam7,
            other => {
                return Err(Error::InvalidHeader(format!(
                    "unknown interlace method {other}"
                )))
            }
        };

        Ok(Self {
            width,
            height,
            bit_depth,
            color_type,
            interlace,
        })
    }

    /// Serialise to the 13-byte IHDR payload.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..4].copy_from_slice(&self.width.to_be_bytes());
        out[4..8].copy_from_slice(&self.height.to_be_bytes());
        out[8] = self.bit_depth.bits();
        out[9] = self.color_type.png_color_type();
        // Compression and filter method are always 0.
        out[12] = match self.interlace {
            InterlaceMethod::None => 0,
            InterlaceMethod::Adam7 => 1,
        };
        out
    }

    /// Filter lookback distance in bytes.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        filter_bpp(self.color_type, self.bit_depth)
    }

    /// Packed bytes in a scanline of `width` pixels, excluding the filter byte.
    #[inline]
    pub fn scanline_bytes(&self, width: u32) -> usize {
        scanline_bytes(width, self.color_type, self.bit_depth)
    }

    /// Bytes per pixel once samples are unpacked.
    #[inline]
    pub fn unpacked_pixel_bytes(&self) -> usize {
        self.color_type.channels() * self.bit_depth.sample_bytes()
    }
}
