//! zlib stream framing (RFC 1950) around the raw deflater.

use std::io::{self, Write};

use super::adler32::Adler32;
use super::deflate::{zlib_header, Deflater};
use super::lz77::DeflateStrategy;
use crate::error::Result;

const OUTPUT_CHUNK: usize = 16 * 1024;

/// A writer that compresses everything written to it into a zlib stream.
///
/// The header is written on the first write, the Adler-32 trailer on
/// [`ZlibEncoder::finish`]. Dropping the encoder without calling `finish`
/// leaves a truncated stream.
#[derive(Debug)]
pub struct ZlibEncoder<W: Write> {
    inner: W,
    deflater: Deflater,
    adler: Adler32,
    header_written: bool,
    buf: Vec<u8>,
}

impl<W: Write> ZlibEncoder<W> {
    /// Wrap `inner`, compressing at `level` (0–9).
    pub fn new(inner: W, level: u8) -> Result<Self> {
        Self::with_strategy(inner, level, DeflateStrategy::Default)
    }

    /// Wrap `inner` with an explicit match strategy.
    pub fn with_strategy(inner: W, level: u8, strategy: DeflateStrategy) -> Result<Self> {
        Ok(Self {
            inner,
            deflater: Deflater::with_strategy(level, strategy)?,
            adler: Adler32::new(),
            header_written: false,
            buf: vec![0u8; OUTPUT_CHUNK],
        })
    }

    /// The wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.deflater.total_in()
    }

    fn write_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            self.inner.write_all(&zlib_header(self.deflater.level()))?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Drain compressed output until the deflater stops producing a full buffer.
    fn drain(&mut self) -> io::Result<()> {
        loop {
            let n = self.deflater.deflate(&mut self.buf);
            if n > 0 {
                self.inner.write_all(&self.buf[..n])?;
            }
            if n < self.buf.len() {
                return Ok(());
            }
        }
    }

    /// Write the final block and the Adler-32 trailer, returning the writer.
    pub fn finish(mut self) -> Result<W> {
        self.write_header()?;
        self.deflater.finish()?;
        while !self.deflater.is_finished() {
            let n = self.deflater.deflate(&mut self.buf);
            self.inner.write_all(&self.buf[..n])?;
        }
        self.inner.write_all(&self.adler.finalize().to_be_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ZlibEncoder<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_header()?;
        self.deflater.set_input(data)?;
        self.adler.update(data);
        while !self.deflater.needs_input() {
            self.drain()?;
        }
        Ok(data.len())
    }

    /// Emit a sync flush so everything written so far is decodable.
    fn flush(&mut self) -> io::Result<()> {
        self.write_header()?;
        self.deflater.flush();
        self.drain()?;
        self.inner.flush()
    }
}
