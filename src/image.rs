//! In-memory pixel storage.
//!
//! Samples are stored unpacked: one byte per sample for bit depths up to 8
//! (values are not rescaled, so a 2-bit gray image holds 0..=3) and two
//! big-endian bytes per sample at 16 bits. Indexed images hold palette
//! indices.

use crate::color::{BitDepth, ColorType};
use crate::error::{Error, Result};

/// Row-addressable pixel destination written by the decoder.
pub trait PixelSink {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Mutable unpacked samples of row `y`.
    fn row_mut(&mut self, y: u32) -> &mut [u8];
}

impl<S: PixelSink + ?Sized> PixelSink for &mut S {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        (**self).row_mut(y)
    }
}

/// An owned image with a fixed color type and bit depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    color_type: ColorType,
    bit_depth: BitDepth,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Allocate a zeroed image.
    ///
    /// Fails with [`Error::ImageAllocation`] when the buffer size overflows
    /// or the allocation is refused.
    pub fn new(width: u32, height: u32, color_type: ColorType, bit_depth: BitDepth) -> Result<Self> {
        validate(width, height, color_type, bit_depth)?;
        let len = buffer_len(width, height, color_type, bit_depth)
            .ok_or(Error::ImageAllocation { width, height })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Error::ImageAllocation { width, height })?;
        data.resize(len, 0);

        Ok(Self {
            width,
            height,
            color_type,
            bit_depth,
            data,
        })
    }

    /// Wrap existing unpacked samples.
    pub fn from_raw(
        width: u32,
        height: u32,
        color_type: ColorType,
        bit_depth: BitDepth,
        data: Vec<u8>,
    ) -> Result<Self> {
        validate(width, height, color_type, bit_depth)?;
        let expected = buffer_len(width, height, color_type, bit_depth)
            .ok_or(Error::ImageAllocation { width, height })?;
        if data.len() != expected {
            return Err(Error::InvalidDataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            color_type,
            bit_depth,
            data,
        })
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color type.
    #[inline]
    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    /// Bit depth.
    #[inline]
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Bytes per unpacked pixel.
    #[inline]
    pub fn pixel_bytes(&self) -> usize {
        self.color_type.channels() * self.bit_depth.sample_bytes()
    }

    /// Bytes per unpacked row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_bytes()
    }

    /// Samples of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_bytes();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Samples of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let size = self.pixel_bytes();
        let start = x as usize * size;
        &self.row(y)[start..start + size]
    }

    /// All samples, row-major.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the image and return its samples.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

impl PixelSink for ImageBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.row_bytes();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }
}

fn validate(width: u32, height: u32, color_type: ColorType, bit_depth: BitDepth) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if !color_type.supports_bit_depth(bit_depth) {
        return Err(Error::InvalidBitDepth {
            bit_depth: bit_depth.bits(),
            color_type: color_type.png_color_type(),
        });
    }
    Ok(())
}

fn buffer_len(width: u32, height: u32, color_type: ColorType, bit_depth: BitDepth) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(color_type.channels() * bit_depth.sample_bytes())
        .filter(|&len| len <= isize::MAX as usize)
}
