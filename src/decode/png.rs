//! PNG decoder implementation.
//!
//! [`PngDecoder`] drives a single dispatch loop over the chunk stream. The
//! image data is never gathered in memory: the IDAT run is read through an
//! [`IdatReader`](crate::png::chunk::IdatReader), inflated on the fly and
//! reconstructed one scanline at a time into a [`PixelSink`].

use std::io::{self, Read};

use log::{debug, trace, warn};

use super::inflate::ZlibDecoder;
use crate::color::ColorType;
use crate::error::{Error, Result};
use crate::image::{ImageBuffer, PixelSink};
use crate::memory::{AllocationOptions, MemoryAllocator};
use crate::png::adam7::{scatter_row, ADAM7_PASSES};
use crate::png::bit_depth::{scale_to_8bit, unpack_row};
use crate::png::chunk::{ChunkReader, ChunkType};
use crate::png::filter::{unfilter_row, FilterType};
use crate::png::{InterlaceMethod, PngHeader, PngMetadata, Transparency};

pub use crate::png::chunk::CrcHandling;

/// Default limit on either image dimension.
const MAX_DIMENSION: u32 = 1 << 24;

/// Decoder limits and behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Largest accepted width.
    pub max_width: u32,
    /// Largest accepted height.
    pub max_height: u32,
    /// Skip ancillary chunks instead of parsing them.
    pub ignore_metadata: bool,
    /// Which chunk CRCs are enforced.
    pub crc_handling: CrcHandling,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_width: MAX_DIMENSION,
            max_height: MAX_DIMENSION,
            ignore_metadata: false,
            crc_handling: CrcHandling::CriticalOnly,
        }
    }
}

/// Where the decoder is in the chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Signature and IHDR not read yet.
    AwaitHeader,
    /// Dispatching chunks.
    ReadingChunks,
    /// Inside the IDAT run.
    DecodingScanlines,
    /// IEND seen or stream exhausted.
    End,
}

/// A decoded image with its header and ancillary data.
#[derive(Debug, Clone)]
pub struct DecodedPng {
    /// The IHDR contents.
    pub header: PngHeader,
    /// PLTE entries, if present.
    pub palette: Option<Vec<[u8; 3]>>,
    /// Ancillary metadata.
    pub metadata: PngMetadata,
    /// Unpacked samples.
    pub image: ImageBuffer,
}

impl DecodedPng {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.header.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// Expand to 8-bit RGBA, applying the palette and tRNS.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let depth = self.header.bit_depth;
        let wide = depth.sample_bytes() == 2;
        let sample = |pixel: &[u8], i: usize| -> u16 {
            if wide {
                u16::from_be_bytes([pixel[2 * i], pixel[2 * i + 1]])
            } else {
                pixel[i] as u16
            }
        };
        let palette = self.palette.as_deref().unwrap_or(&[]);
        let trns = self.metadata.transparency.as_ref();

        let mut out = Vec::with_capacity(self.header.width as usize * self.header.height as usize * 4);
        for pixel in self.image.as_bytes().chunks_exact(self.image.pixel_bytes()) {
            let rgba = match self.header.color_type {
                ColorType::Gray => {
                    let v = sample(pixel, 0);
                    let g = scale_to_8bit(v, depth);
                    let a = if trns == Some(&Transparency::Gray(v)) { 0 } else { 255 };
                    [g, g, g, a]
                }
                ColorType::GrayAlpha => {
                    let g = scale_to_8bit(sample(pixel, 0), depth);
                    [g, g, g, scale_to_8bit(sample(pixel, 1), depth)]
                }
                ColorType::Rgb => {
                    let (r, g, b) = (sample(pixel, 0), sample(pixel, 1), sample(pixel, 2));
                    let a = if trns == Some(&Transparency::Rgb(r, g, b)) { 0 } else { 255 };
                    [
                        scale_to_8bit(r, depth),
                        scale_to_8bit(g, depth),
                        scale_to_8bit(b, depth),
                        a,
                    ]
                }
                ColorType::Rgba => [
                    scale_to_8bit(sample(pixel, 0), depth),
                    scale_to_8bit(sample(pixel, 1), depth),
                    scale_to_8bit(sample(pixel, 2), depth),
                    scale_to_8bit(sample(pixel, 3), depth),
                ],
                ColorType::Indexed => {
                    let index = pixel[0] as usize;
                    let [r, g, b] = palette.get(index).copied().unwrap_or([0, 0, 0]);
                    let a = match trns {
                        Some(Transparency::Palette(alpha)) => alpha.get(index).copied().unwrap_or(255),
                        _ => 255,
                    };
                    [r, g, b, a]
                }
            };
            out.extend_from_slice(&rgba);
        }
        out
    }
}

/// Streaming PNG decoder over any byte source.
pub struct PngDecoder<R: Read> {
    chunks: ChunkReader<R>,
    allocator: MemoryAllocator,
    options: DecoderOptions,
    state: DecodeState,
    header: Option<PngHeader>,
    palette: Option<Vec<[u8; 3]>>,
    metadata: PngMetadata,
}

impl<R: Read> PngDecoder<R> {
    /// Decode from `reader` with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecoderOptions::default())
    }

    /// Decode from `reader` with custom options.
    pub fn with_options(reader: R, options: DecoderOptions) -> Self {
        Self::with_allocator(reader, options, MemoryAllocator::new())
    }

    /// Decode from `reader`, renting scratch buffers from `allocator`.
    pub fn with_allocator(reader: R, options: DecoderOptions, allocator: MemoryAllocator) -> Self {
        let chunks = ChunkReader::new(reader, allocator.clone(), options.crc_handling);
        Self::from_chunks(chunks, options, allocator)
    }

    fn from_chunks(chunks: ChunkReader<R>, options: DecoderOptions, allocator: MemoryAllocator) -> Self {
        Self {
            chunks,
            allocator,
            options,
            state: DecodeState::AwaitHeader,
            header: None,
            palette: None,
            metadata: PngMetadata::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Ancillary metadata seen so far.
    pub fn metadata(&self) -> &PngMetadata {
        &self.metadata
    }

    /// Palette seen so far.
    pub fn palette(&self) -> Option<&[[u8; 3]]> {
        self.palette.as_deref()
    }

    /// Read the signature and IHDR if that has not happened yet.
    pub fn read_header(&mut self) -> Result<PngHeader> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        self.chunks.read_signature()?;
        let chunk = self.chunks.next_chunk()?.ok_or(Error::MissingHeader)?;
        if chunk.chunk_type != ChunkType::IHDR {
            return Err(Error::MissingHeader);
        }
        let header = PngHeader::parse(chunk.data())?;
        if header.width > self.options.max_width || header.height > self.options.max_height {
            return Err(Error::ImageTooLarge {
                width: header.width,
                height: header.height,
                max: self.options.max_width.max(self.options.max_height),
            });
        }

        debug!(
            "IHDR {}x{} {:?} {} bits, {:?}",
            header.width,
            header.height,
            header.color_type,
            header.bit_depth.bits(),
            header.interlace
        );
        self.header = Some(header);
        self.state = DecodeState::ReadingChunks;
        Ok(header)
    }

    /// Decode the whole image into a freshly allocated [`ImageBuffer`].
    pub fn decode(mut self) -> Result<DecodedPng> {
        let image = self.run(|header| {
            ImageBuffer::new(header.width, header.height, header.color_type, header.bit_depth).map_err(
                |_| Error::ImageAllocation {
                    width: header.width,
                    height: header.height,
                },
            )
        })?;
        let header = self.read_header()?;
        Ok(DecodedPng {
            header,
            palette: self.palette,
            metadata: self.metadata,
            image,
        })
    }

    /// Decode into a caller-provided sink whose dimensions match the header.
    ///
    /// Rows receive unpacked samples in the layout [`ImageBuffer`] uses.
    pub fn decode_into<S: PixelSink>(&mut self, sink: &mut S) -> Result<PngHeader> {
        self.run(|header| {
            if sink.width() != header.width || sink.height() != header.height {
                return Err(Error::InvalidDimensions {
                    width: sink.width(),
                    height: sink.height(),
                });
            }
            Ok(sink)
        })?;
        self.read_header()
    }

    /// The chunk dispatch loop. `provide` is called once, on the first
    /// IDAT, to obtain the sink the scanlines are written to.
    fn run<S: PixelSink>(&mut self, provide: impl FnOnce(&PngHeader) -> Result<S>) -> Result<S> {
        let header = self.read_header()?;
        let mut provide = Some(provide);
        let mut sink: Option<S> = None;

        loop {
            let Some(chunk) = self.chunks.next_chunk()? else {
                warn!("stream ended without IEND");
                break;
            };

            match chunk.chunk_type {
                ChunkType::IHDR => {
                    return Err(Error::InvalidDecode("multiple IHDR chunks".into()));
                }
                ChunkType::PLTE => {
                    if sink.is_some() {
                        return Err(Error::InvalidDecode("PLTE chunk after IDAT".into()));
                    }
                    self.read_palette(&header, chunk.data())?;
                }
                ChunkType::IDAT => {
                    let Some(provide) = provide.take() else {
                        warn!("ignoring non-contiguous IDAT chunk");
                        self.chunks.idat_reader(chunk.length).finish()?;
                        continue;
                    };
                    if header.color_type == ColorType::Indexed && self.palette.is_none() {
                        return Err(Error::InvalidDecode(
                            "missing PLTE chunk for indexed image".into(),
                        ));
                    }
                    let mut target = provide(&header)?;
                    self.state = DecodeState::DecodingScanlines;
                    self.read_image_data(&header, chunk.length, &mut target)?;
                    self.state = DecodeState::ReadingChunks;
                    sink = Some(target);
                }
                ChunkType::IEND => break,
                other => {
                    if self.options.ignore_metadata
                        || !self.metadata.read_chunk(other, chunk.data(), header.color_type)
                    {
                        trace!("skipping chunk {other}");
                    }
                }
            }
        }

        self.state = DecodeState::End;
        self.check_palette_transparency();
        sink.ok_or(Error::NoImageData)
    }

    fn read_palette(&mut self, header: &PngHeader, data: &[u8]) -> Result<()> {
        if self.palette.is_some() {
            return Err(Error::InvalidDecode("multiple PLTE chunks".into()));
        }
        if data.is_empty() || data.len() % 3 != 0 || data.len() > 256 * 3 {
            return Err(Error::InvalidDecode(format!(
                "invalid PLTE length {}",
                data.len()
            )));
        }
        match header.color_type {
            ColorType::Gray | ColorType::GrayAlpha => {
                warn!("ignoring PLTE in grayscale image");
            }
            _ => {
                let entries: Vec<[u8; 3]> = data
                    .chunks_exact(3)
                    .map(|rgb| [rgb[0], rgb[1], rgb[2]])
                    .collect();
                trace!("palette with {} entries", entries.len());
                self.palette = Some(entries);
            }
        }
        Ok(())
    }

    fn check_palette_transparency(&mut self) {
        let palette_len = self.palette.as_ref().map_or(0, Vec::len);
        if let Some(Transparency::Palette(alpha)) = &mut self.metadata.transparency {
            if alpha.len() > palette_len {
                warn!(
                    "tRNS has {} entries but palette has {palette_len}, truncating",
                    alpha.len()
                );
                alpha.truncate(palette_len);
            }
        }
    }

    fn read_image_data<S: PixelSink>(
        &mut self,
        header: &PngHeader,
        first_length: u32,
        sink: &mut S,
    ) -> Result<()> {
        let allocator = self.allocator.clone();
        let mut zlib = ZlibDecoder::new(self.chunks.idat_reader(first_length));

        match header.interlace {
            InterlaceMethod::None => {
                decode_pass(
                    &mut zlib,
                    &allocator,
                    header,
                    header.width,
                    header.height,
                    |y, samples| sink.row_mut(y).copy_from_slice(samples),
                )?;
            }
            InterlaceMethod::Adam7 => {
                let pixel_bytes = header.unpacked_pixel_bytes();
                for pass in ADAM7_PASSES
                    .iter()
                    .filter(|p| !p.is_empty(header.width, header.height))
                {
                    decode_pass(
                        &mut zlib,
                        &allocator,
                        header,
                        pass.width(header.width),
                        pass.height(header.height),
                        |row, samples| {
                            scatter_row(pass, samples, sink.row_mut(pass.image_y(row)), pixel_bytes)
                        },
                    )?;
                }
            }
        }

        // Drain to the end of the zlib stream so its checksum is verified.
        let mut scratch = [0u8; 256];
        let mut extra = 0usize;
        loop {
            let n = zlib.read(&mut scratch)?;
            if n == 0 {
                break;
            }
            extra += n;
        }
        if extra > 0 {
            warn!("{extra} bytes of image data after the last scanline");
        }
        zlib.into_inner().finish()
    }
}

/// Inflate, unfilter and unpack the scanlines of one (possibly reduced)
/// image, handing each row of samples to `emit`.
fn decode_pass<Z: Read>(
    zlib: &mut ZlibDecoder<Z>,
    allocator: &MemoryAllocator,
    header: &PngHeader,
    width: u32,
    height: u32,
    mut emit: impl FnMut(u32, &[u8]),
) -> Result<()> {
    let line_len = header.scanline_bytes(width);
    let bpp = header.bytes_per_pixel();
    // Previous row starts zeroed for every pass.
    let mut current = allocator.allocate(line_len + 1, AllocationOptions::None);
    let mut previous = allocator.allocate(line_len + 1, AllocationOptions::Clean);
    let mut samples = allocator.allocate(
        width as usize * header.unpacked_pixel_bytes(),
        AllocationOptions::None,
    );

    for row in 0..height {
        zlib.read_exact(&mut current).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof && zlib.is_finished() {
                Error::InvalidDecode(format!("image data ends after {row} of {height} rows"))
            } else {
                e.into()
            }
        })?;
        let filter = FilterType::try_from(current[0])?;
        unfilter_row(filter, &mut current[1..], &previous[1..], bpp);
        unpack_row(&current[1..], header.bit_depth, &mut samples);
        emit(row, &samples[..]);
        std::mem::swap(&mut current, &mut previous);
    }
    Ok(())
}

/// Decode a PNG held in memory.
pub fn decode(data: &[u8]) -> Result<DecodedPng> {
    decode_with_options(data, DecoderOptions::default())
}

/// Decode a PNG held in memory with custom options.
pub fn decode_with_options(data: &[u8], options: DecoderOptions) -> Result<DecodedPng> {
    let allocator = MemoryAllocator::new();
    let chunks = ChunkReader::new(data, allocator.clone(), options.crc_handling)
        .with_stream_len(data.len() as u64);
    PngDecoder::from_chunks(chunks, options, allocator).decode()
}
