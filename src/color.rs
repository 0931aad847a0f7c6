//! Color type and bit depth definitions.

/// PNG color types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorType {
    /// Grayscale, one sample per pixel.
    Gray = 0,
    /// RGB, three samples per pixel.
    Rgb = 2,
    /// Palette indices, one sample per pixel.
    Indexed = 3,
    /// Grayscale with alpha, two samples per pixel.
    GrayAlpha = 4,
    /// RGBA, four samples per pixel.
    Rgba = 6,
}

impl ColorType {
    /// Number of samples per pixel.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            ColorType::Gray | ColorType::Indexed => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    /// Returns the number of bytes per pixel at 8 bits per sample.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.channels()
    }

    /// Returns the PNG color type value.
    #[inline]
    pub const fn png_color_type(self) -> u8 {
        self as u8
    }

    /// Whether the color type carries an alpha channel.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, ColorType::GrayAlpha | ColorType::Rgba)
    }

    /// Whether `depth` is a legal bit depth for this color type.
    pub const fn supports_bit_depth(self, depth: BitDepth) -> bool {
        match self {
            ColorType::Gray => true,
            ColorType::Indexed => !matches!(depth, BitDepth::Sixteen),
            ColorType::Rgb | ColorType::GrayAlpha | ColorType::Rgba => {
                matches!(depth, BitDepth::Eight | BitDepth::Sixteen)
            }
        }
    }
}

impl TryFrom<u8> for ColorType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ColorType::Gray),
            2 => Ok(ColorType::Rgb),
            3 => Ok(ColorType::Indexed),
            4 => Ok(ColorType::GrayAlpha),
            6 => Ok(ColorType::Rgba),
            other => Err(other),
        }
    }
}

impl From<ColorType> for u8 {
    fn from(color: ColorType) -> Self {
        color as u8
    }
}

/// Bits per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BitDepth {
    /// 1 bit per sample.
    One = 1,
    /// 2 bits per sample.
    Two = 2,
    /// 4 bits per sample.
    Four = 4,
    /// 8 bits per sample.
    Eight = 8,
    /// 16 bits per sample, stored big-endian.
    Sixteen = 16,
}

impl BitDepth {
    /// Number of bits per sample.
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Bytes one sample occupies once unpacked (1 or 2).
    #[inline]
    pub const fn sample_bytes(self) -> usize {
        match self {
            BitDepth::Sixteen => 2,
            _ => 1,
        }
    }

    /// Largest sample value representable at this depth.
    #[inline]
    pub const fn max_value(self) -> u16 {
        ((1u32 << self.bits()) - 1) as u16
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BitDepth::One),
            2 => Ok(BitDepth::Two),
            4 => Ok(BitDepth::Four),
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(other),
        }
    }
}

/// Bytes in one packed scanline of `width` pixels, excluding the filter byte.
#[inline]
pub fn scanline_bytes(width: u32, color_type: ColorType, bit_depth: BitDepth) -> usize {
    let bits = width as usize * color_type.channels() * bit_depth.bits() as usize;
    bits.div_ceil(8)
}

/// Filter lookback distance: bytes per complete pixel, at least one.
#[inline]
pub fn filter_bpp(color_type: ColorType, bit_depth: BitDepth) -> usize {
    (color_type.channels() * bit_depth.bits() as usize / 8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        assert_eq!(ColorType::Gray.channels(), 1);
        assert_eq!(ColorType::Indexed.channels(), 1);
        assert_eq!(ColorType::GrayAlpha.channels(), 2);
        assert_eq!(ColorType::Rgb.channels(), 3);
        assert_eq!(ColorType::Rgba.channels(), 4);
    }

    #[test]
    fn test_color_type_try_from() {
        assert!(matches!(ColorType::try_from(0), Ok(ColorType::Gray)));
        assert!(matches!(ColorType::try_from(3), Ok(ColorType::Indexed)));
        assert!(matches!(ColorType::try_from(6), Ok(ColorType::Rgba)));
        assert!(ColorType::try_from(1).is_err());
        assert!(ColorType::try_from(5).is_err());
        assert!(ColorType::try_from(99).is_err());
    }

    #[test]
    fn test_color_type_roundtrip_u8() {
        for ct in [
            ColorType::Gray,
            ColorType::Rgb,
            ColorType::Indexed,
            ColorType::GrayAlpha,
            ColorType::Rgba,
        ] {
            assert_eq!(ColorType::try_from(u8::from(ct)).unwrap(), ct);
        }
    }

    #[test]
    fn test_allowed_depths() {
        assert!(ColorType::Gray.supports_bit_depth(BitDepth::One));
        assert!(ColorType::Gray.supports_bit_depth(BitDepth::Sixteen));
        assert!(ColorType::Indexed.supports_bit_depth(BitDepth::Four));
        assert!(!ColorType::Indexed.supports_bit_depth(BitDepth::Sixteen));
        assert!(!ColorType::Rgb.supports_bit_depth(BitDepth::Four));
        assert!(ColorType::Rgba.supports_bit_depth(BitDepth::Sixteen));
    }

    #[test]
    fn test_scanline_bytes() {
        assert_eq!(scanline_bytes(10, ColorType::Rgb, BitDepth::Eight), 30);
        assert_eq!(scanline_bytes(10, ColorType::Rgba, BitDepth::Sixteen), 80);
        assert_eq!(scanline_bytes(3, ColorType::Gray, BitDepth::One), 1);
        assert_eq!(scanline_bytes(9, ColorType::Gray, BitDepth::One), 2);
        assert_eq!(scanline_bytes(3, ColorType::Indexed, BitDepth::Four), 2);
    }

    #[test]
    fn test_filter_bpp() {
        assert_eq!(filter_bpp(ColorType::Gray, BitDepth::One), 1);
        assert_eq!(filter_bpp(ColorType::Rgb, BitDepth::Eight), 3);
        assert_eq!(filter_bpp(ColorType::Rgba, BitDepth::Sixteen), 8);
        assert_eq!(filter_bpp(ColorType::GrayAlpha, BitDepth::Sixteen), 4);
    }

    #[test]
    fn test_max_value() {
        assert_eq!(BitDepth::One.max_value(), 1);
        assert_eq!(BitDepth::Four.max_value(), 15);
        assert_eq!(BitDepth::Sixteen.max_value(), 65535);
    }
}
