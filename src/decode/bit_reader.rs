//! Bit-level reader for DEFLATE decoding.
//!
//! Provides efficient bit reading with peek/consume semantics for Huffman
//! decoding over any [`Read`] source.

use std::io::Read;

use crate::error::{Error, Result};

const INPUT_BUFFER: usize = 8 * 1024;

/// Bit reader for LSB-first bit streams (DEFLATE).
///
/// Bytes are pulled from the source in blocks and shifted into a 64-bit
/// bit buffer on demand. The source is only read when the buffer runs dry,
/// so the reader never blocks on data it does not need.
pub struct BitReader<R: Read> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    bit_buf: u64,
    bits_in_buf: u8,
    eof: bool,
}

impl<R: Read> BitReader<R> {
    /// Create a new bit reader over `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; INPUT_BUFFER].into_boxed_slice(),
            pos: 0,
            len: 0,
            bit_buf: 0,
            bits_in_buf: 0,
            eof: false,
        }
    }

    /// Pull the next block of input; returns `false` at end of input.
    fn fill_buf(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let n = loop {
            match self.inner.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        self.pos = 0;
        self.len = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    /// Top up the bit buffer to at least `n` bits if input allows.
    #[inline]
    fn refill(&mut self, n: u8) -> Result<()> {
        while self.bits_in_buf < n {
            if self.pos == self.len && !self.fill_buf()? {
                return Ok(());
            }
            self.bit_buf |= (self.buf[self.pos] as u64) << self.bits_in_buf;
            self.pos += 1;
            self.bits_in_buf += 8;
        }
        Ok(())
    }

    /// Peek at up to `n` bits, returning the value and how many bits are
    /// actually available (fewer than `n` only at end of input).
    #[inline]
    pub fn try_peek_bits(&mut self, n: u8) -> Result<(u32, u8)> {
        debug_assert!(n <= 32);
        self.refill(n)?;
        let available = self.bits_in_buf.min(n);
        Ok(((self.bit_buf & ((1u64 << n) - 1)) as u32, available))
    }

    /// Peek at the next `n` bits without consuming them (LSB-first).
    #[inline]
    pub fn peek_bits(&mut self, n: u8) -> Result<u32> {
        let (value, available) = self.try_peek_bits(n)?;
        if available < n {
            return Err(Error::InvalidDecode("unexpected end of stream".into()));
        }
        Ok(value)
    }

    /// Consume `n` bits from the buffer.
    #[inline]
    pub fn consume(&mut self, n: u8) {
        debug_assert!(n <= self.bits_in_buf);
        self.bit_buf >>= n;
        self.bits_in_buf -= n;
    }

    /// Read `n` bits LSB-first.
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        let val = self.peek_bits(n)?;
        self.consume(n);
        Ok(val)
    }

    /// Align to byte boundary (discard remaining bits in current byte).
    pub fn align_to_byte(&mut self) {
        let discard = self.bits_in_buf % 8;
        if discard > 0 {
            self.consume(discard);
        }
    }

    /// Read up to `out.len()` bytes after aligning; returns the count,
    /// which is zero only at end of input.
    pub fn read_aligned(&mut self, out: &mut [u8]) -> Result<usize> {
        debug_assert_eq!(self.bits_in_buf % 8, 0);
        if out.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        while self.bits_in_buf >= 8 && written < out.len() {
            out[written] = self.bit_buf as u8;
            self.consume(8);
            written += 1;
        }
        if written == out.len() {
            return Ok(written);
        }

        if self.pos == self.len && !self.fill_buf()? {
            return Ok(written);
        }
        let count = (self.len - self.pos).min(out.len() - written);
        out[written..written + count].copy_from_slice(&self.buf[self.pos..self.pos + count]);
        self.pos += count;
        Ok(written + count)
    }

    /// Fill `out` completely from the byte-aligned stream.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read_aligned(&mut out[filled..])?;
            if n == 0 {
                return Err(Error::InvalidDecode("unexpected end of stream".into()));
            }
            filled += n;
        }
        Ok(())
    }

    /// Consume the reader, returning the source.
    ///
    /// Bytes already buffered are dropped.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
