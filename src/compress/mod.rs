//! Compression algorithms: checksums, Huffman block writing, LZ77 matching
//! and the streaming DEFLATE / zlib encoders built from them.

pub mod adler32;
pub mod crc32;
pub mod deflate;
pub mod huffman;
pub mod lz77;
pub mod zlib;

pub use adler32::adler32;
pub use crc32::crc32;
pub use deflate::{deflate, deflate_with_strategy, deflate_zlib, zlib_header, Deflater};
pub use lz77::DeflateStrategy;
pub use zlib::ZlibEncoder;
