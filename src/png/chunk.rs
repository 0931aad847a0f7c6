//! PNG chunk framing.
//!
//! Every chunk is `[length: u32 BE][type: 4 ASCII bytes][data][crc32: u32 BE]`
//! with the CRC computed over type and data. [`ChunkReader`] walks that
//! grammar over any [`Read`] source; IDAT payloads are not buffered but
//! streamed through [`IdatReader`] straight into the inflater.

use std::fmt;
use std::io::{self, Read, Write};

use log::{trace, warn};

use crate::compress::crc32::Crc32;
use crate::error::{Error, Result};
use crate::memory::{AllocationOptions, MemoryAllocator, PooledBuffer};

/// PNG file signature (magic bytes).
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest chunk length the format allows.
const MAX_CHUNK_LENGTH: u32 = i32::MAX as u32;

/// First read size for a chunk body when the stream length is unknown.
const BODY_READ_STEP: usize = 64 * 1024;

/// Four-byte chunk type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

impl ChunkType {
    /// Image header.
    pub const IHDR: ChunkType = ChunkType(*b"IHDR");
    /// Palette.
    pub const PLTE: ChunkType = ChunkType(*b"PLTE");
    /// Image data.
    pub const IDAT: ChunkType = ChunkType(*b"IDAT");
    /// Image trailer.
    pub const IEND: ChunkType = ChunkType(*b"IEND");
    /// Transparency.
    pub const TRNS: ChunkType = ChunkType(*b"tRNS");
    /// Image gamma.
    pub const GAMA: ChunkType = ChunkType(*b"gAMA");
    /// Physical pixel dimensions.
    pub const PHYS: ChunkType = ChunkType(*b"pHYs");
    /// Latin-1 text.
    pub const TEXT: ChunkType = ChunkType(*b"tEXt");
    /// Compressed Latin-1 text.
    pub const ZTXT: ChunkType = ChunkType(*b"zTXt");
    /// International (UTF-8) text.
    pub const ITXT: ChunkType = ChunkType(*b"iTXt");
    /// Exif profile.
    pub const EXIF: ChunkType = ChunkType(*b"eXIf");

    /// Critical chunks have bit 5 of the first byte clear (uppercase).
    #[inline]
    pub fn is_critical(self) -> bool {
        self.0[0] & 0x20 == 0
    }

    /// The raw type bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkType({self})")
    }
}

/// Which chunks have their CRC verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcHandling {
    /// Fail on critical chunks, warn and continue on ancillary ones.
    #[default]
    CriticalOnly,
    /// Fail on any mismatch.
    All,
    /// Do not compute CRCs.
    None,
}

/// Length and type of a chunk whose data has not been read yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Declared data length.
    pub length: u32,
    /// Chunk type.
    pub chunk_type: ChunkType,
}

/// A chunk read by [`ChunkReader::next_chunk`].
///
/// IDAT chunks come back without data; their payload is read through
/// [`ChunkReader::idat_reader`]. Other chunks own a pooled buffer that goes
/// back to the allocator when the chunk is dropped.
#[derive(Debug)]
pub struct Chunk {
    /// Declared data length.
    pub length: u32,
    /// Chunk type.
    pub chunk_type: ChunkType,
    /// Payload, `None` for IDAT.
    pub data: Option<PooledBuffer>,
}

impl Chunk {
    /// The payload, empty for IDAT.
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Reads the PNG chunk grammar from a byte stream.
pub struct ChunkReader<R: Read> {
    inner: R,
    position: u64,
    stream_len: Option<u64>,
    allocator: MemoryAllocator,
    crc_handling: CrcHandling,
    pending: Option<ChunkHeader>,
}

impl<R: Read> ChunkReader<R> {
    /// Read chunks from `inner`, renting payload buffers from `allocator`.
    pub fn new(inner: R, allocator: MemoryAllocator, crc_handling: CrcHandling) -> Self {
        Self {
            inner,
            position: 0,
            stream_len: None,
            allocator,
            crc_handling,
            pending: None,
        }
    }

    /// Declare the total stream length so oversized chunk lengths can be
    /// detected before reading.
    pub fn with_stream_len(mut self, len: u64) -> Self {
        self.stream_len = Some(len);
        self
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn remaining(&self) -> Option<u64> {
        self.stream_len.map(|len| len.saturating_sub(self.position))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read four bytes, or `None` if the stream ends first.
    fn try_read_u32(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += 4;
        Ok(Some(u32::from_be_bytes(buf)))
    }

    /// Check the 8-byte PNG signature.
    pub fn read_signature(&mut self) -> Result<()> {
        let mut sig = [0u8; 8];
        self.inner
            .read_exact(&mut sig)
            .map_err(|_| Error::InvalidSignature)?;
        self.position += 8;
        if sig != PNG_SIGNATURE {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// Read the next chunk header, or `None` when no more chunks remain.
    ///
    /// A length that is negative as a signed value, or larger than what is
    /// left of the stream, is skipped and the next four bytes are tried as
    /// a length instead.
    pub fn read_header(&mut self) -> Result<Option<ChunkHeader>> {
        if let Some(header) = self.pending.take() {
            return Ok(Some(header));
        }

        let Some(mut length) = self.try_read_u32()? else {
            return Ok(None);
        };
        while length > MAX_CHUNK_LENGTH
            || self
                .remaining()
                .is_some_and(|left| u64::from(length) + 8 > left)
        {
            warn!("invalid chunk length {length} at offset {}, resynchronising", self.position - 4);
            match self.try_read_u32()? {
                Some(next) => length = next,
                None => return Ok(None),
            }
        }

        let Some(type_bytes) = self.try_read_u32()? else {
            return Ok(None);
        };
        let chunk_type = ChunkType(type_bytes.to_be_bytes());
        trace!("chunk {chunk_type} length {length}");
        Ok(Some(ChunkHeader { length, chunk_type }))
    }

    /// Hand a header back so the next [`ChunkReader::read_header`] returns it.
    pub fn push_back(&mut self, header: ChunkHeader) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(header);
    }

    /// Read the next chunk. IDAT chunks are returned without their data.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        if header.chunk_type == ChunkType::IDAT {
            return Ok(Some(Chunk {
                length: header.length,
                chunk_type: header.chunk_type,
                data: None,
            }));
        }

        let data = self.read_body(header.length as usize)?;
        let crc = self.read_crc()?;
        self.verify_crc(header.chunk_type, &data, crc)?;

        Ok(Some(Chunk {
            length: header.length,
            chunk_type: header.chunk_type,
            data: Some(data),
        }))
    }

    /// Read a chunk body of `len` bytes.
    ///
    /// Without a known stream length the declared length is untrusted, so the
    /// buffer starts small and doubles only as bytes actually arrive.
    fn read_body(&mut self, len: usize) -> Result<PooledBuffer> {
        let first = match self.remaining() {
            Some(_) => len,
            None => len.min(BODY_READ_STEP),
        };
        let mut data = self.allocator.allocate(first, AllocationOptions::None);
        let mut filled = 0;
        loop {
            let end = data.len();
            self.read_exact(&mut data[filled..end])?;
            filled = end;
            if filled == len {
                return Ok(data);
            }
            data.grow(filled.saturating_mul(2).min(len));
        }
    }

    fn read_crc(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn verify_crc(&self, chunk_type: ChunkType, data: &[u8], stored: u32) -> Result<()> {
        if self.crc_handling == CrcHandling::None {
            return Ok(());
        }
        let mut crc = Crc32::new();
        crc.update(chunk_type.as_bytes());
        crc.update(data);
        self.check_crc(chunk_type, crc.finalize(), stored)
    }

    fn check_crc(&self, chunk_type: ChunkType, computed: u32, stored: u32) -> Result<()> {
        if computed == stored {
            return Ok(());
        }
        match self.crc_handling {
            CrcHandling::None => Ok(()),
            CrcHandling::CriticalOnly if !chunk_type.is_critical() => {
                warn!("CRC mismatch in ancillary chunk {chunk_type}, ignoring");
                Ok(())
            }
            _ => Err(Error::CrcMismatch {
                chunk_type: chunk_type.to_string(),
            }),
        }
    }

    /// Stream the payload of the IDAT run starting with a chunk of
    /// `first_length` bytes whose header was just read.
    pub fn idat_reader(&mut self, first_length: u32) -> IdatReader<'_, R> {
        let mut crc = Crc32::new();
        crc.update(ChunkType::IDAT.as_bytes());
        IdatReader {
            chunks: self,
            remaining: first_length,
            crc,
            done: false,
        }
    }
}

/// Presents the payloads of consecutive IDAT chunks as one byte stream.
///
/// At each chunk boundary the CRC of the finished chunk is verified and the
/// next header is read. A non-IDAT header ends the stream and is handed back
/// to the [`ChunkReader`] for the dispatcher.
pub struct IdatReader<'a, R: Read> {
    chunks: &'a mut ChunkReader<R>,
    remaining: u32,
    crc: Crc32,
    done: bool,
}

impl<R: Read> IdatReader<'_, R> {
    /// Close the current chunk and move to the next IDAT, if any.
    fn advance(&mut self) -> Result<()> {
        let stored = self.chunks.read_crc()?;
        let computed = std::mem::replace(&mut self.crc, Crc32::new()).finalize();
        self.chunks.check_crc(ChunkType::IDAT, computed, stored)?;

        match self.chunks.read_header()? {
            Some(header) if header.chunk_type == ChunkType::IDAT => {
                self.remaining = header.length;
                self.crc.update(ChunkType::IDAT.as_bytes());
            }
            Some(header) => {
                self.chunks.push_back(header);
                self.done = true;
            }
            None => self.done = true,
        }
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.remaining == 0 && !self.done {
            self.advance()?;
        }
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(self.remaining as usize);
        let n = self.chunks.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside IDAT chunk",
            )));
        }
        self.chunks.position += n as u64;
        self.remaining -= n as u32;
        if self.chunks.crc_handling != CrcHandling::None {
            self.crc.update(&buf[..n]);
        }
        Ok(n)
    }

    /// Skip whatever is left of the IDAT run, still checking CRCs.
    pub fn finish(mut self) -> Result<()> {
        let mut scratch = [0u8; 1024];
        let mut skipped = 0u64;
        while self.read_data(&mut scratch)? > 0 {
            skipped += 1;
        }
        if skipped > 0 {
            trace!("skipped unused image data after the last scanline");
        }
        Ok(())
    }
}

impl<R: Read> Read for IdatReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_data(buf)?)
    }
}

/// Write a PNG chunk (length, type, data, CRC32).
pub fn write_chunk<W: Write>(output: &mut W, chunk_type: ChunkType, data: &[u8]) -> io::Result<()> {
    let mut crc = Crc32::new();
    crc.update(chunk_type.as_bytes());
    crc.update(data);

    output.write_all(&(data.len() as u32).to_be_bytes())?;
    output.write_all(chunk_type.as_bytes())?;
    output.write_all(data)?;
    output.write_all(&crc.finalize().to_be_bytes())
}

/// Splits a byte stream into IDAT chunks of at most `chunk_size` bytes.
pub struct IdatWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl<W: Write> IdatWriter<W> {
    /// Write IDAT chunks of `chunk_size` bytes (clamped to 1..=65535).
    pub fn new(inner: W, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(1, 65535);
        Self {
            inner,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        write_chunk(&mut self.inner, ChunkType::IDAT, &self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Write the final partial chunk and return the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.buf.is_empty() {
            self.emit()?;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for IdatWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() == self.chunk_size {
            self.emit()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
