//! # pngine
//!
//! A PNG codec with its own zlib/DEFLATE implementation.
//!
//! Everything the format needs is implemented here: chunk framing with
//! CRC-32, a streaming LZ77 + Huffman deflater and an inflater, the five
//! scanline filters with adaptive selection, Adam7 interlacing, bit depths
//! from 1 to 16 and the common ancillary chunks.
//!
//! ## Features
//!
//! - **PNG encoding and decoding** for every color type and bit depth
//! - **Streaming**: IDAT data is inflated and deflated scanline by scanline
//! - **Pooled scratch buffers** via [`memory::MemoryAllocator`]
//! - Diagnostics through the [`log`] facade; no logger is installed
//!
//! ## Example
//!
//! ```rust
//! use pngine::{decode, png, ColorType};
//!
//! let pixels: Vec<u8> = vec![255, 0, 0, 255]; // 1x1 red RGBA pixel
//! let options = png::PngOptions::builder(1, 1)
//!     .color_type(ColorType::Rgba)
//!     .build();
//! let encoded = png::encode(&pixels, &options).unwrap();
//!
//! let decoded = decode::decode(&encoded).unwrap();
//! assert_eq!(decoded.image.as_bytes(), &pixels[..]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod color;
pub mod compress;
pub mod decode;
pub mod error;
pub mod image;
pub mod memory;
pub mod png;

pub use color::{BitDepth, ColorType};
pub use decode::{DecodedPng, DecoderOptions, PngDecoder};
pub use error::{Error, Result};
pub use image::{ImageBuffer, PixelSink};
pub use png::{FilterStrategy, InterlaceMethod, PngOptions};
