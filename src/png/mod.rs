//! PNG encoder implementation.
//!
//! Pixel rows are packed to the target bit depth, filtered, streamed through
//! a [`ZlibEncoder`] and split into IDAT chunks as they are produced; the
//! whole filtered image is never held in memory at once.

pub mod adam7;
pub mod bit_depth;
pub mod chunk;
pub mod filter;
pub mod header;
pub mod metadata;

use std::io::Write;

use log::debug;

use crate::color::{BitDepth, ColorType};
use crate::compress::{DeflateStrategy, ZlibEncoder};
use crate::error::{Error, Result};
use crate::image::ImageBuffer;
use crate::memory::{AllocationOptions, MemoryAllocator};

use adam7::{gather_row, ADAM7_PASSES};
use bit_depth::{pack_row, palette_bit_depth};
use chunk::{write_chunk, ChunkType, IdatWriter, PNG_SIGNATURE};
use filter::RowFilter;
pub use header::{InterlaceMethod, PngHeader};
pub use metadata::{PhysicalDimensions, PhysicalUnit, PngMetadata, TextEntry, Transparency};

/// Maximum supported image dimension.
const MAX_DIMENSION: u32 = 1 << 24; // 16 million pixels

/// Largest IDAT payload the encoder emits.
pub const MAX_IDAT_CHUNK_SIZE: usize = 65535;

/// PNG filter selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStrategy {
    /// Always use no filter (fastest encoding).
    None,
    /// Always use Sub filter.
    Sub,
    /// Always use Up filter.
    Up,
    /// Always use Average filter.
    Average,
    /// Always use Paeth filter.
    Paeth,
    /// Choose best filter per row (best compression, slower).
    #[default]
    Adaptive,
}

/// PNG encoding options.
#[derive(Debug, Clone)]
pub struct PngOptions {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Color type of the input samples.
    pub color_type: ColorType,
    /// Bit depth; `None` picks 8, or the smallest depth covering the
    /// palette for indexed images.
    pub bit_depth: Option<BitDepth>,
    /// Interlace method.
    pub interlace: InterlaceMethod,
    /// Compression level (0-9, default 6).
    pub compression_level: u8,
    /// Filter selection strategy.
    pub filter_strategy: FilterStrategy,
    /// Match selection strategy of the deflater.
    pub deflate_strategy: DeflateStrategy,
    /// Maximum IDAT payload size (1-65535).
    pub chunk_size: usize,
    /// Ancillary chunks to emit.
    pub metadata: PngMetadata,
}

impl PngOptions {
    /// Default options for a `width` x `height` RGBA image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color_type: ColorType::Rgba,
            bit_depth: None,
            interlace: InterlaceMethod::None,
            compression_level: 6,
            filter_strategy: FilterStrategy::Adaptive,
            deflate_strategy: DeflateStrategy::Default,
            chunk_size: MAX_IDAT_CHUNK_SIZE,
            metadata: PngMetadata::default(),
        }
    }

    /// Start building options for a `width` x `height` image.
    pub fn builder(width: u32, height: u32) -> PngOptionsBuilder {
        PngOptionsBuilder {
            options: Self::new(width, height),
        }
    }

    /// Speed-focused preset.
    pub fn fast(width: u32, height: u32) -> Self {
        Self::builder(width, height).fast().build()
    }

    /// Balanced preset (the default settings).
    pub fn balanced(width: u32, height: u32) -> Self {
        Self::new(width, height)
    }

    /// Highest compression preset; slowest.
    pub fn max_compression(width: u32, height: u32) -> Self {
        Self::builder(width, height).max_compression().build()
    }

    fn header(&self, palette_len: Option<usize>) -> Result<PngHeader> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(Error::ImageTooLarge {
                width: self.width,
                height: self.height,
                max: MAX_DIMENSION,
            });
        }
        if self.compression_level > 9 {
            return Err(Error::InvalidCompressionLevel(self.compression_level));
        }

        let bit_depth = match (self.bit_depth, palette_len) {
            (Some(depth), _) => depth,
            (None, Some(len)) => palette_bit_depth(len),
            (None, None) => BitDepth::Eight,
        };
        if !self.color_type.supports_bit_depth(bit_depth) {
            return Err(Error::InvalidBitDepth {
                bit_depth: bit_depth.bits(),
                color_type: self.color_type.png_color_type(),
            });
        }

        Ok(PngHeader {
            width: self.width,
            height: self.height,
            bit_depth,
            color_type: self.color_type,
            interlace: self.interlace,
        })
    }
}

/// Consuming builder for [`PngOptions`].
#[derive(Debug, Clone)]
pub struct PngOptionsBuilder {
    options: PngOptions,
}

impl PngOptionsBuilder {
    /// Color type of the input samples.
    pub fn color_type(mut self, color_type: ColorType) -> Self {
        self.options.color_type = color_type;
        self
    }

    /// Fix the bit depth.
    pub fn bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.options.bit_depth = Some(bit_depth);
        self
    }

    /// Interlace method.
    pub fn interlace(mut self, interlace: InterlaceMethod) -> Self {
        self.options.interlace = interlace;
        self
    }

    /// Compression level (0-9).
    pub fn compression_level(mut self, level: u8) -> Self {
        self.options.compression_level = level;
        self
    }

    /// Filter selection strategy.
    pub fn filter_strategy(mut self, strategy: FilterStrategy) -> Self {
        self.options.filter_strategy = strategy;
        self
    }

    /// Deflater match strategy.
    pub fn deflate_strategy(mut self, strategy: DeflateStrategy) -> Self {
        self.options.deflate_strategy = strategy;
        self
    }

    /// Maximum IDAT payload size, clamped to 1-65535.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.options.chunk_size = size.clamp(1, MAX_IDAT_CHUNK_SIZE);
        self
    }

    /// Ancillary chunks to emit.
    pub fn metadata(mut self, metadata: PngMetadata) -> Self {
        self.options.metadata = metadata;
        self
    }

    /// Add a text entry.
    pub fn text(mut self, entry: TextEntry) -> Self {
        self.options.metadata.text.push(entry);
        self
    }

    /// Level 1 with a fixed Sub filter.
    pub fn fast(mut self) -> Self {
        self.options.compression_level = 1;
        self.options.filter_strategy = FilterStrategy::Sub;
        self
    }

    /// Level 9 with adaptive filtering.
    pub fn max_compression(mut self) -> Self {
        self.options.compression_level = 9;
        self.options.filter_strategy = FilterStrategy::Adaptive;
        self
    }

    /// Finish building.
    pub fn build(self) -> PngOptions {
        self.options
    }
}

/// Encode unpacked samples as PNG.
///
/// `data` holds rows in order with one byte per sample for depths up to 8
/// (sub-byte samples unscaled) and two big-endian bytes per sample at 16
/// bits, the same layout as [`ImageBuffer`].
pub fn encode(data: &[u8], options: &PngOptions) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    encode_into(&mut output, data, options)?;
    Ok(output)
}

/// Encode into a caller-provided buffer.
///
/// The `output` buffer will be cleared before writing. This API allows callers
/// to reuse an allocation across multiple encodes.
pub fn encode_into(output: &mut Vec<u8>, data: &[u8], options: &PngOptions) -> Result<()> {
    if options.color_type == ColorType::Indexed {
        return Err(Error::UnsupportedColorType);
    }
    let header = options.header(None)?;
    encode_image_data(output, data, &header, None, None, options)
}

/// Encode palette indices as PNG.
///
/// The palette must contain between 1 and 256 entries and no more than the
/// bit depth can address. Optional `transparency` supplies per-entry alpha
/// values (tRNS); its length must not exceed the palette length.
pub fn encode_indexed(
    data: &[u8],
    palette: &[[u8; 3]],
    transparency: Option<&[u8]>,
    options: &PngOptions,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    encode_indexed_into(&mut output, data, palette, transparency, options)?;
    Ok(output)
}

/// Encode palette indices into a caller-provided buffer.
pub fn encode_indexed_into(
    output: &mut Vec<u8>,
    data: &[u8],
    palette: &[[u8; 3]],
    transparency: Option<&[u8]>,
    options: &PngOptions,
) -> Result<()> {
    let mut options = options.clone();
    options.color_type = ColorType::Indexed;
    let header = options.header(Some(palette.len()))?;

    let palette_len = palette.len();
    if palette_len == 0 || palette_len > 1usize << header.bit_depth.bits() {
        return Err(Error::InvalidPaletteLength { len: palette_len });
    }
    if let Some(alpha) = transparency {
        if alpha.len() > palette_len {
            return Err(Error::InvalidTransparencyLength {
                palette_len,
                alpha_len: alpha.len(),
            });
        }
    }

    encode_image_data(output, data, &header, Some(palette), transparency, &options)
}

/// Encode an [`ImageBuffer`], taking geometry, color type and bit depth from
/// the image and everything else from `options`.
pub fn encode_image(image: &ImageBuffer, options: &PngOptions) -> Result<Vec<u8>> {
    let mut options = options.clone();
    options.width = image.width();
    options.height = image.height();
    options.color_type = image.color_type();
    options.bit_depth = Some(image.bit_depth());
    encode(image.as_bytes(), &options)
}

fn encode_image_data(
    output: &mut Vec<u8>,
    data: &[u8],
    header: &PngHeader,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&[u8]>,
    options: &PngOptions,
) -> Result<()> {
    let row_bytes = header.width as usize * header.unpacked_pixel_bytes();
    let expected_len = row_bytes * header.height as usize;
    if data.len() != expected_len {
        return Err(Error::InvalidDataLength {
            expected: expected_len,
            actual: data.len(),
        });
    }

    debug!(
        "encoding {}x{} {:?} at {} bits, {:?}, level {}",
        header.width,
        header.height,
        header.color_type,
        header.bit_depth.bits(),
        header.interlace,
        options.compression_level
    );

    output.clear();
    output.reserve(expected_len / 2 + 1024);
    output.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(output, ChunkType::IHDR, &header.to_bytes())?;

    options.metadata.write_leading(output)?;
    if let Some(palette) = palette {
        let plte: Vec<u8> = palette.iter().flatten().copied().collect();
        write_chunk(output, ChunkType::PLTE, &plte)?;
    }
    let mut metadata = options.metadata.clone();
    if let Some(alpha) = transparency {
        metadata.transparency = Some(Transparency::Palette(alpha.to_vec()));
    }
    metadata.write_trailing(output, header.color_type, options.compression_level)?;

    // Palette indices and packed samples rarely benefit from prediction.
    let strategy = match options.filter_strategy {
        FilterStrategy::Adaptive
            if header.color_type == ColorType::Indexed || header.bit_depth.bits() < 8 =>
        {
            FilterStrategy::None
        }
        other => other,
    };

    let allocator = MemoryAllocator::new();
    let idat = IdatWriter::new(&mut *output, options.chunk_size);
    let mut zlib =
        ZlibEncoder::with_strategy(idat, options.compression_level, options.deflate_strategy)?;

    match header.interlace {
        InterlaceMethod::None => {
            write_pass(
                &mut zlib,
                &allocator,
                header,
                strategy,
                header.width,
                header.height,
                |y, samples| {
                    let start = y as usize * row_bytes;
                    samples.copy_from_slice(&data[start..start + row_bytes]);
                },
            )?;
        }
        InterlaceMethod::Adam7 => {
            let pixel_bytes = header.unpacked_pixel_bytes();
            for pass in ADAM7_PASSES
                .iter()
                .filter(|p| !p.is_empty(header.width, header.height))
            {
                write_pass(
                    &mut zlib,
                    &allocator,
                    header,
                    strategy,
                    pass.width(header.width),
                    pass.height(header.height),
                    |row, samples| {
                        let start = pass.image_y(row) as usize * row_bytes;
                        gather_row(pass, &data[start..start + row_bytes], samples, pixel_bytes);
                    },
                )?;
            }
        }
    }

    let idat = zlib.finish()?;
    idat.finish()?;
    write_chunk(output, ChunkType::IEND, &[])?;
    Ok(())
}

/// Filter and compress one (possibly reduced) image of `width` x `height`.
fn write_pass<W: Write>(
    zlib: &mut ZlibEncoder<W>,
    allocator: &MemoryAllocator,
    header: &PngHeader,
    strategy: FilterStrategy,
    width: u32,
    height: u32,
    mut fill_row: impl FnMut(u32, &mut [u8]),
) -> Result<()> {
    let line_len = header.scanline_bytes(width);
    let mut samples = allocator.allocate(
        width as usize * header.unpacked_pixel_bytes(),
        AllocationOptions::None,
    );
    let mut current = allocator.allocate(line_len, AllocationOptions::Clean);
    let mut previous = allocator.allocate(line_len, AllocationOptions::Clean);
    let mut filter = RowFilter::new(allocator, strategy, header.bytes_per_pixel(), line_len);

    for row in 0..height {
        fill_row(row, &mut samples[..]);
        pack_row(&samples, header.bit_depth, &mut current)?;
        let (filter_type, filtered) = filter.filter(&current, &previous);
        zlib.write_all(&[filter_type as u8])?;
        zlib.write_all(filtered)?;
        std::mem::swap(&mut current, &mut previous);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(width: u32, height: u32, color_type: ColorType) -> PngOptions {
        PngOptions::builder(width, height).color_type(color_type).build()
    }

    fn chunk_types(png: &[u8]) -> Vec<ChunkType> {
        let mut pos = 8;
        let mut types = Vec::new();
        while pos < png.len() {
            let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]);
            types.push(ChunkType([
                png[pos + 4],
                png[pos + 5],
                png[pos + 6],
                png[pos + 7],
            ]));
            pos += 12 + len as usize;
        }
        types
    }

    #[test]
    fn test_encode_1x1_rgb() {
        let png = encode(&[255, 0, 0], &options(1, 1, ColorType::Rgb)).unwrap();
        assert_eq!(&png[0..8], &PNG_SIGNATURE);
        assert_eq!(
            chunk_types(&png),
            vec![ChunkType::IHDR, ChunkType::IDAT, ChunkType::IEND]
        );
        // IHDR: bit depth 8, color type 2.
        assert_eq!(&png[24..26], &[8, 2]);
    }

    #[test]
    fn test_encode_invalid_dimensions() {
        let result = encode(&[255, 0, 0], &options(0, 1, ColorType::Rgb));
        assert!(matches!(result, Err(Error::InvalidDimensions { .. })));
    }

    #[test]
    fn test_encode_too_large() {
        let result = encode(&[], &options(MAX_DIMENSION + 1, 1, ColorType::Gray));
        assert!(matches!(result, Err(Error::ImageTooLarge { .. })));
    }

    #[test]
    fn test_encode_invalid_data_length() {
        let result = encode(&[255, 0], &options(1, 1, ColorType::Rgb));
        assert!(matches!(result, Err(Error::InvalidDataLength { .. })));
    }

    #[test]
    fn test_encode_invalid_level() {
        let opts = PngOptions::builder(1, 1)
            .color_type(ColorType::Gray)
            .compression_level(10)
            .build();
        assert!(matches!(
            encode(&[0], &opts),
            Err(Error::InvalidCompressionLevel(10))
        ));
    }

    #[test]
    fn test_encode_rejects_bad_depth() {
        let opts = PngOptions::builder(1, 1)
            .color_type(ColorType::Rgb)
            .bit_depth(BitDepth::Four)
            .build();
        assert!(matches!(
            encode(&[0, 0, 0], &opts),
            Err(Error::InvalidBitDepth { .. })
        ));
    }

    #[test]
    fn test_encode_sample_out_of_range() {
        let opts = PngOptions::builder(2, 1)
            .color_type(ColorType::Gray)
            .bit_depth(BitDepth::One)
            .build();
        assert!(matches!(
            encode(&[0, 2], &opts),
            Err(Error::SampleOutOfRange { value: 2, .. })
        ));
    }

    #[test]
    fn test_encode_into_reuses_buffer() {
        let mut output = Vec::with_capacity(64);
        let opts = options(1, 1, ColorType::Rgb);
        encode_into(&mut output, &[0, 0, 0], &opts).unwrap();
        let first = output.clone();
        encode_into(&mut output, &[255, 0, 0], &opts).unwrap();
        assert_ne!(first, output);
        assert_eq!(&output[0..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_encode_indexed_picks_depth() {
        let palette = [[255, 0, 0], [0, 255, 0], [0, 0, 255]];
        let png = encode_indexed(
            &[0, 1, 2, 0],
            &palette,
            Some(&[0, 128]),
            &PngOptions::new(2, 2),
        )
        .unwrap();
        assert_eq!(&png[24..26], &[2, 3]);
        assert_eq!(
            chunk_types(&png),
            vec![
                ChunkType::IHDR,
                ChunkType::PLTE,
                ChunkType::TRNS,
                ChunkType::IDAT,
                ChunkType::IEND
            ]
        );
    }

    #[test]
    fn test_encode_indexed_validation() {
        let opts = PngOptions::new(1, 1);
        assert!(matches!(
            encode_indexed(&[0], &[], None, &opts),
            Err(Error::InvalidPaletteLength { len: 0 })
        ));
        assert!(matches!(
            encode_indexed(&[0], &[[0, 0, 0]], Some(&[1, 2]), &opts),
            Err(Error::InvalidTransparencyLength { .. })
        ));
        let small = PngOptions::builder(1, 1).bit_depth(BitDepth::One).build();
        assert!(matches!(
            encode_indexed(&[0], &[[0, 0, 0]; 3], None, &small),
            Err(Error::InvalidPaletteLength { len: 3 })
        ));
        assert!(matches!(
            encode(&[0], &options(1, 1, ColorType::Indexed)),
            Err(Error::UnsupportedColorType)
        ));
    }

    #[test]
    fn test_metadata_chunk_order() {
        let opts = PngOptions::builder(1, 1)
            .color_type(ColorType::Gray)
            .metadata(PngMetadata {
                gamma: Some(0.5),
                physical: Some(PhysicalDimensions {
                    x: 1,
                    y: 1,
                    unit: PhysicalUnit::Unknown,
                }),
                transparency: Some(Transparency::Gray(0)),
                exif: Some(b"MM\0*".to_vec()),
                text: Vec::new(),
            })
            .text(TextEntry::new("Software", "pngine"))
            .build();
        let png = encode(&[7], &opts).unwrap();
        assert_eq!(
            chunk_types(&png),
            vec![
                ChunkType::IHDR,
                ChunkType::GAMA,
                ChunkType::PHYS,
                ChunkType::TRNS,
                ChunkType::EXIF,
                ChunkType::TEXT,
                ChunkType::IDAT,
                ChunkType::IEND
            ]
        );
    }

    #[test]
    fn test_idat_split() {
        let data: Vec<u8> = (0..64 * 64 * 3).map(|i| (i * 7919 % 251) as u8).collect();
        let opts = PngOptions::builder(64, 64)
            .color_type(ColorType::Rgb)
            .compression_level(0)
            .chunk_size(1000)
            .build();
        let png = encode(&data, &opts).unwrap();
        let idats = chunk_types(&png)
            .into_iter()
            .filter(|t| *t == ChunkType::IDAT)
            .count();
        assert!(idats > 12, "{idats}");
    }

    #[test]
    fn test_presets() {
        assert_eq!(PngOptions::fast(1, 1).compression_level, 1);
        assert_eq!(PngOptions::balanced(1, 1).compression_level, 6);
        let max = PngOptions::max_compression(1, 1);
        assert_eq!(max.compression_level, 9);
        assert_eq!(max.filter_strategy, FilterStrategy::Adaptive);
    }
}
