//! Error types for the pngine library.

use std::fmt;
use std::io;

/// Result type alias for pngine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or compressing.
#[derive(Debug)]
pub enum Error {
    /// Invalid image dimensions (zero width or height).
    InvalidDimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
    /// Pixel data length doesn't match expected size.
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        actual: usize,
    },
    /// Image dimensions exceed maximum supported size.
    ImageTooLarge {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Maximum supported dimension.
        max: u32,
    },
    /// The pixel buffer for the declared dimensions could not be allocated.
    ImageAllocation {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
    /// The stream does not start with the PNG signature.
    InvalidSignature,
    /// A chunk other than IHDR appeared before the header.
    MissingHeader,
    /// The stream ended without any image data.
    NoImageData,
    /// A critical chunk failed its CRC check.
    CrcMismatch {
        /// Four-character chunk type.
        chunk_type: String,
    },
    /// A scanline carried an unknown filter type byte.
    InvalidFilterType(u8),
    /// The IHDR chunk is malformed.
    InvalidHeader(String),
    /// Corrupt or truncated stream data.
    InvalidDecode(String),
    /// Compression level outside 0-9.
    InvalidCompressionLevel(u8),
    /// Palette is empty, too long, or too long for the bit depth.
    InvalidPaletteLength {
        /// Number of palette entries supplied.
        len: usize,
    },
    /// Transparency table is longer than the palette.
    InvalidTransparencyLength {
        /// Number of palette entries.
        palette_len: usize,
        /// Number of alpha entries.
        alpha_len: usize,
    },
    /// A sample does not fit in the configured bit depth.
    SampleOutOfRange {
        /// Offending sample value.
        value: u8,
        /// Bit depth of the image.
        bit_depth: u8,
    },
    /// Unsupported color type for the format.
    UnsupportedColorType,
    /// Bit depth not permitted for the color type.
    InvalidBitDepth {
        /// Requested bit depth.
        bit_depth: u8,
        /// PNG color type code.
        color_type: u8,
    },
    /// Internal compression error.
    CompressionError(String),
    /// Underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDimensions { width, height } => {
                write!(f, "Invalid image dimensions: {}x{}", width, height)
            }
            Error::InvalidDataLength { expected, actual } => {
                write!(
                    f,
                    "Invalid pixel data length: expected {} bytes, got {}",
                    expected, actual
                )
            }
            Error::ImageTooLarge { width, height, max } => {
                write!(
                    f,
                    "Image {}x{} exceeds maximum dimension {}",
                    width, height, max
                )
            }
            Error::ImageAllocation { width, height } => {
                write!(f, "Cannot allocate pixel buffer for {}x{} image", width, height)
            }
            Error::InvalidSignature => write!(f, "Invalid PNG signature"),
            Error::MissingHeader => write!(f, "PNG stream does not start with an IHDR chunk"),
            Error::NoImageData => write!(f, "PNG stream contains no IDAT data"),
            Error::CrcMismatch { chunk_type } => {
                write!(f, "CRC mismatch in {} chunk", chunk_type)
            }
            Error::InvalidFilterType(filter) => write!(f, "invalid filter type: {}", filter),
            Error::InvalidHeader(msg) => write!(f, "Invalid IHDR: {}", msg),
            Error::InvalidDecode(msg) => write!(f, "Decode error: {}", msg),
            Error::InvalidCompressionLevel(level) => {
                write!(f, "Invalid compression level {}: must be 0-9", level)
            }
            Error::InvalidPaletteLength { len } => {
                write!(f, "Invalid palette length {}", len)
            }
            Error::InvalidTransparencyLength {
                palette_len,
                alpha_len,
            } => write!(
                f,
                "Transparency table has {} entries but palette has {}",
                alpha_len, palette_len
            ),
            Error::SampleOutOfRange { value, bit_depth } => {
                write!(f, "Sample {} does not fit in {} bits", value, bit_depth)
            }
            Error::UnsupportedColorType => {
                write!(f, "Unsupported color type for this format")
            }
            Error::InvalidBitDepth {
                bit_depth,
                color_type,
            } => write!(
                f,
                "Bit depth {} is not valid for color type {}",
                bit_depth, color_type
            ),
            Error::CompressionError(msg) => {
                write!(f, "Compression error: {}", msg)
            }
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    /// Unwraps errors that were tunnelled through an `io::Read` adapter.
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::InvalidDecode("lost I/O error".into()),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidDimensions {
            width: 0,
            height: 5,
        };
        assert_eq!(err.to_string(), "Invalid image dimensions: 0x5");
        assert_eq!(
            Error::InvalidFilterType(9).to_string(),
            "invalid filter type: 9"
        );
        let crc = Error::CrcMismatch {
            chunk_type: "IHDR".into(),
        };
        assert!(crc.to_string().contains("IHDR"));
    }

    #[test]
    fn test_io_roundtrip_preserves_variant() {
        let io_err: io::Error = Error::InvalidFilterType(7).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        let back: Error = io_err.into();
        assert!(matches!(back, Error::InvalidFilterType(7)));
    }

    #[test]
    fn test_plain_io_error_is_wrapped() {
        let err: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        match err {
            Error::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }
}
