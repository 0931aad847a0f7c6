//! Decoding: bit-level input, streaming inflate and the PNG decoder.

pub mod bit_reader;
pub mod inflate;
pub mod png;

pub use inflate::{inflate, inflate_zlib, inflate_zlib_with_size, Inflater, ZlibDecoder};
pub use png::{
    decode, decode_with_options, CrcHandling, DecodeState, DecodedPng, DecoderOptions, PngDecoder,
};
